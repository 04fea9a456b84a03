use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CmsError {
    #[error("CMS request timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("CMS responded with {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Unexpected CMS payload: {0}")]
    Decode(String),
    #[error("Subscriber has no id")]
    MissingId,
}
