//! Outbound email delivery.
//!
//! Exactly one [`EmailProvider`] is active per process, chosen from
//! configuration at startup. Providers never fail loudly: every outcome,
//! including a missing or placeholder credential, comes back as a
//! [`DeliveryResult`].

mod console;
mod resend;
pub mod retry;
mod sendgrid;

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use console::ConsoleProvider;
pub use resend::ResendProvider;
pub use retry::RetryPolicy;
pub use sendgrid::SendgridProvider;

use crate::config::EmailConfig;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} responded with {status}: {body}")]
    Status {
        provider: ProviderKind,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("{0} credential is missing or a placeholder")]
    Unusable(ProviderKind),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Resend,
    Sendgrid,
    Console,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Resend => f.write_str("resend"),
            ProviderKind::Sendgrid => f.write_str("sendgrid"),
            ProviderKind::Console => f.write_str("console"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub reply_to: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeliveryResult {
    pub ok: bool,
    pub provider: ProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn sent(provider: ProviderKind, id: Option<String>) -> Self {
        Self {
            ok: true,
            provider,
            id,
            error: None,
        }
    }

    pub fn failed(provider: ProviderKind, error: impl ToString) -> Self {
        Self {
            ok: false,
            provider,
            id: None,
            error: Some(error.to_string()),
        }
    }
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn send(&self, email: &OutgoingEmail) -> DeliveryResult;
}

const PLACEHOLDER_MARKERS: &[&str] = &[
    "changeme",
    "change-me",
    "change_me",
    "placeholder",
    "your_api_key",
    "your-api-key",
    "example",
    "dummy",
    "xxxx",
];

const PLACEHOLDER_KEYS: &[&str] = &["re_123456789", "sg.xxx", "test"];

/// True when a provider credential is absent, blank or obviously a placeholder.
pub fn is_unusable_credential(key: Option<&SecretString>) -> bool {
    let Some(key) = key else {
        return true;
    };
    let key = key.expose_secret().trim().to_ascii_lowercase();
    if key.is_empty() || PLACEHOLDER_KEYS.contains(&key.as_str()) {
        return true;
    }
    PLACEHOLDER_MARKERS.iter().any(|marker| key.contains(marker))
}

/// Splits `"Name <addr@host>"` into its display name and address.
pub(crate) fn parse_mailbox(mailbox: &str) -> (Option<&str>, &str) {
    let mailbox = mailbox.trim();
    match (mailbox.rfind('<'), mailbox.rfind('>')) {
        (Some(start), Some(end)) if start < end => {
            let name = mailbox[..start].trim().trim_matches('"').trim();
            let address = mailbox[start + 1..end].trim();
            ((!name.is_empty()).then_some(name), address)
        }
        _ => (None, mailbox),
    }
}

/// Builds the provider selected by `config.provider`.
pub fn from_config(config: &EmailConfig) -> Result<Arc<dyn EmailProvider>, EmailError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()?;

    let provider: Arc<dyn EmailProvider> = match config.provider {
        ProviderKind::Resend => Arc::new(ResendProvider::new(
            client,
            &config.resend_base_url,
            config.resend_api_key.clone(),
            &config.from,
        )),
        ProviderKind::Sendgrid => Arc::new(SendgridProvider::new(
            client,
            &config.sendgrid_base_url,
            config.sendgrid_api_key.clone(),
            &config.from,
        )),
        ProviderKind::Console => Arc::new(ConsoleProvider),
    };

    if provider.kind() != ProviderKind::Console {
        let key = match provider.kind() {
            ProviderKind::Resend => config.resend_api_key.as_ref(),
            _ => config.sendgrid_api_key.as_ref(),
        };
        if is_unusable_credential(key) {
            tracing::warn!(
                provider = %provider.kind(),
                "email provider credential is missing or a placeholder; sends will fail"
            );
        }
    }

    Ok(provider)
}
