use std::time::Duration;

use config::{Config as ConfigLib, ConfigError, Environment};
use redis::{
    aio::{ConnectionManager, ConnectionManagerConfig},
    Client as RedisClient, RedisResult,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::email::ProviderKind;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cms: CmsConfig,
    pub email: EmailConfig,
    pub newsletter: NewsletterConfig,
    pub admin: AdminConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    /// Public website origin used to build links inside emails.
    pub site_url: String,
    pub log_format: LogFormat,
    /// Take the client address from forwarding headers set by a reverse proxy.
    /// When off, only the socket peer address is used.
    pub trust_proxy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CmsBackend {
    Strapi,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CmsConfig {
    pub backend: CmsBackend,
    pub url: Option<String>,
    pub token: Option<SecretString>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub provider: ProviderKind,
    pub resend_api_key: Option<SecretString>,
    pub sendgrid_api_key: Option<SecretString>,
    pub resend_base_url: String,
    pub sendgrid_base_url: String,
    pub from: String,
    pub reply_to: Option<String>,
    pub demo_request_to: Option<String>,
    pub demo_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsletterConfig {
    pub unsubscribe_secret: Option<SecretString>,
    pub hash_salt: String,
    pub default_limit: u32,
    pub max_limit: u32,
    pub page_size: u32,
    pub dry_run_default: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub api_key: Option<SecretString>,
    /// Let loopback peers through the admin gate without a key outside production.
    pub allow_localhost: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub backend: RateLimitBackend,
    pub redis_uri: SecretString,
    pub window_secs: u64,
    pub subscribe_ip: u32,
    pub subscribe_email: u32,
    pub unsubscribe_ip: u32,
    pub demo_ip: u32,
}

impl ServerConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

impl CmsConfig {
    /// Base URL and token, only when both are present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &SecretString)> {
        let url = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        let token = self
            .token
            .as_ref()
            .filter(|t| !t.expose_secret().trim().is_empty())?;
        Some((url, token))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl EmailConfig {
    pub fn demo_timeout(&self) -> Duration {
        Duration::from_millis(self.demo_timeout_ms)
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Connects to the Redis instance backing the shared rate limiter.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established.
    pub async fn connect(&self) -> RedisResult<ConnectionManager> {
        tracing::info!("Connecting to Redis for rate limiting");
        let client = RedisClient::open(self.redis_uri.expose_secret())?;
        let config = ConnectionManagerConfig::new().set_connection_timeout(Duration::from_secs(10));
        client.get_connection_manager_with_config(config).await
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLib::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("server.environment", "development")?
            .set_default("server.site_url", "http://localhost:3000")?
            .set_default("server.log_format", "text")?
            .set_default("server.trust_proxy", false)?
            .set_default("cms.backend", "strapi")?
            .set_default("cms.timeout_ms", 8000)?
            .set_default("email.provider", "console")?
            .set_default("email.resend_base_url", "https://api.resend.com")?
            .set_default("email.sendgrid_base_url", "https://api.sendgrid.com")?
            .set_default("email.from", "Newsletter <newsletter@localhost>")?
            .set_default("email.demo_timeout_ms", 8000)?
            .set_default("newsletter.hash_salt", "newsletter")?
            .set_default("newsletter.default_limit", 25)?
            .set_default("newsletter.max_limit", 300)?
            .set_default("newsletter.page_size", 100)?
            .set_default("newsletter.dry_run_default", false)?
            .set_default("admin.allow_localhost", false)?
            .set_default("rate_limit.backend", "memory")?
            .set_default("rate_limit.redis_uri", "redis://localhost:6379")?
            .set_default("rate_limit.window_secs", 10 * 60)?
            .set_default("rate_limit.subscribe_ip", 12)?
            .set_default("rate_limit.subscribe_email", 6)?
            .set_default("rate_limit.unsubscribe_ip", 20)?
            .set_default("rate_limit.demo_ip", 6)?
            // Override config values via environment variables
            // The environment variables should be prefixed with 'APP_' and use '__' as a separator
            // Example: APP_EMAIL__PROVIDER=resend
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        config.try_deserialize()
    }
}
