use color_eyre::eyre::Context;
use dotenvy::dotenv;
use newsletter_server::{
    config::{Config, LogFormat},
    startup::HttpServer,
    utils::state::setup,
};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenv().ok();
    color_eyre::install()?;

    let config = Config::load().wrap_err("Failed to load configuration")?;
    config_tracing(config.server.log_format);

    tracing::info!(
        environment = %config.server.environment,
        provider = %config.email.provider,
        "starting newsletter server"
    );

    let state = setup(&config)
        .await
        .wrap_err("Failed to initialize application state")?;

    let server = HttpServer::new(&config, state).await?;
    server.run().await
}

fn config_tracing(format: LogFormat) {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "1")
    }

    use tracing::Level;
    use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

    let tracing_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
    };
    let filter = filter::Targets::new()
        .with_target("hyper::proto", Level::INFO)
        .with_target("tower_http::trace", Level::DEBUG)
        .with_default(Level::DEBUG);

    tracing_subscriber::registry()
        .with(tracing_layer)
        .with(filter)
        .init();
}
