//! Newsletter subscription lifecycle and delivery.

pub mod campaign;
pub mod demo;
pub mod subscription;
pub mod template;
pub mod token;

use thiserror::Error;

pub use token::TokenCodec;

use crate::{
    cms::CmsError,
    email::DeliveryResult,
    models::DeliverySummary,
    utils::rate_limit::{bucket_key, RateLimiter, Scope},
};

#[derive(Debug, Error)]
pub enum NewsletterError {
    #[error("{0}")]
    Validation(String),
    #[error("Too many requests. Please try again in a few minutes.")]
    RateLimited,
    #[error("Newsletter service is not configured")]
    NotConfigured,
    #[error("Email provider failed: {0}")]
    ProviderFailure(String),
    #[error("CMS error: {0}")]
    Cms(#[from] CmsError),
}

impl NewsletterError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Records a hit for `identity_hash` and rejects once `limit` is exceeded.
///
/// A failing limiter backend admits the request.
pub(crate) async fn enforce_limit(
    limiter: &dyn RateLimiter,
    scope: Scope,
    identity_hash: &str,
    limit: u32,
) -> Result<(), NewsletterError> {
    let key = bucket_key(scope, identity_hash);
    match limiter.check(&key, limit).await {
        Ok(decision) if decision.is_limited() => {
            tracing::info!(%scope, identity_hash, "rate limit exceeded");
            Err(NewsletterError::RateLimited)
        }
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::warn!(%scope, "rate limiter unavailable, admitting request: {e}");
            Ok(())
        }
    }
}

impl From<&DeliveryResult> for DeliverySummary {
    fn from(result: &DeliveryResult) -> Self {
        Self {
            attempted: true,
            sent: result.ok,
            provider: Some(result.provider),
        }
    }
}

/// Hidden form fields are filled in by bots only.
pub(crate) fn is_honeypot_tripped(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}
