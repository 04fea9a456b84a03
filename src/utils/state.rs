use std::sync::Arc;

use crate::{
    cms::{InMemoryStore, StrapiStore, SubscriberStore},
    config::{CmsBackend, Config, RateLimitBackend},
    email::{self, EmailProvider},
    newsletter::{NewsletterError, TokenCodec},
    utils::{
        errors::Error,
        rate_limit::{InMemoryRateLimiter, RateLimiter, RedisRateLimiter},
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// `None` when the CMS is not configured; subscription routes answer 503.
    pub subscribers: Option<Arc<dyn SubscriberStore>>,
    pub email: Arc<dyn EmailProvider>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub tokens: TokenCodec,
}

impl AppState {
    pub fn store(&self) -> Result<&dyn SubscriberStore, NewsletterError> {
        self.subscribers
            .as_deref()
            .ok_or(NewsletterError::NotConfigured)
    }
}

pub async fn setup(config: &Config) -> Result<AppState, Error> {
    let subscribers: Option<Arc<dyn SubscriberStore>> = match config.cms.backend {
        CmsBackend::Memory => {
            tracing::warn!("Using the in-memory subscriber store; records are lost on restart");
            Some(Arc::new(InMemoryStore::new()))
        }
        CmsBackend::Strapi => match config.cms.credentials() {
            Some((url, token)) => {
                let client = reqwest::Client::builder()
                    .build()
                    .map_err(|e| Error::HttpClient("CMS", e))?;
                Some(Arc::new(StrapiStore::new(
                    client,
                    url,
                    token.clone(),
                    config.cms.timeout(),
                )))
            }
            None => {
                tracing::warn!("CMS url or token missing; subscription endpoints are disabled");
                None
            }
        },
    };

    let email = email::from_config(&config.email)?;

    let window = config.rate_limit.window();
    let rate_limiter: Arc<dyn RateLimiter> = match config.rate_limit.backend {
        RateLimitBackend::Memory => Arc::new(InMemoryRateLimiter::new(window)),
        RateLimitBackend::Redis => {
            let conn = config.rate_limit.connect().await?;
            Arc::new(RedisRateLimiter::new(conn, window))
        }
    };

    let tokens = TokenCodec::new(config.newsletter.unsubscribe_secret.clone());
    if !tokens.is_enabled() {
        tracing::warn!(
            "No unsubscribe secret configured; unsubscribe links fall back to plain email addresses"
        );
    }

    Ok(AppState {
        config: Arc::new(config.clone()),
        subscribers,
        email,
        rate_limiter,
        tokens,
    })
}
