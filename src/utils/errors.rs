use thiserror::Error;

use crate::email::EmailError;

/// Failures while wiring the application together at startup.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to build the {0} HTTP client: {1}")]
    HttpClient(&'static str, #[source] reqwest::Error),
    #[error("Email provider error: {0}")]
    Email(#[from] EmailError),
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
