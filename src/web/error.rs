use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::newsletter::NewsletterError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Too many requests. Please try again in a few minutes.")]
    RateLimited,
    #[error("This service is not configured yet. Please try again later.")]
    NotConfigured,
    #[error("The email provider rejected the test send. Please try again later.")]
    ProviderFailure,
    #[error("Something went wrong. Please try again later.")]
    Internal,
}

impl From<NewsletterError> for ApiError {
    fn from(error: NewsletterError) -> Self {
        match error {
            NewsletterError::Validation(message) => ApiError::Validation(message),
            NewsletterError::RateLimited => ApiError::RateLimited,
            NewsletterError::NotConfigured => ApiError::NotConfigured,
            NewsletterError::ProviderFailure(detail) => {
                tracing::error!("email provider failure: {detail}");
                ApiError::ProviderFailure
            }
            NewsletterError::Cms(e) => {
                tracing::error!("CMS failure: {e:?}");
                ApiError::Internal
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(format!("Malformed body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(format!("Malformed query: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use ApiError::*;
        let status = match self {
            Validation(_) => StatusCode::BAD_REQUEST,
            Unauthorized => StatusCode::UNAUTHORIZED,
            RateLimited => StatusCode::TOO_MANY_REQUESTS,
            NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ProviderFailure => StatusCode::BAD_GATEWAY,
            Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = json!({
            "ok": false,
            "message": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}
