use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{
    is_unusable_credential,
    retry::{send_with_retry, RetryPolicy},
    DeliveryResult, EmailError, EmailProvider, OutgoingEmail, ProviderKind,
};

#[derive(Serialize)]
struct ResendEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

#[derive(Deserialize)]
struct ResendResponse {
    id: Option<String>,
}

/// Resend transactional email API.
pub struct ResendProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    from: String,
    retry: RetryPolicy,
}

impl ResendProvider {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: Option<SecretString>,
        from: &str,
    ) -> Self {
        Self {
            client,
            endpoint: format!("{}/emails", base_url.trim_end_matches('/')),
            api_key,
            from: from.to_owned(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(self, retry: RetryPolicy) -> Self {
        Self { retry, ..self }
    }

    async fn deliver(&self, email: &OutgoingEmail) -> Result<Option<String>, EmailError> {
        let api_key = match &self.api_key {
            Some(key) if !is_unusable_credential(Some(key)) => key,
            _ => return Err(EmailError::Unusable(ProviderKind::Resend)),
        };

        let body = ResendEmail {
            from: &self.from,
            to: [&email.to],
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
            reply_to: email.reply_to.as_deref(),
        };

        let response = send_with_retry(self.retry, || {
            self.client
                .post(&self.endpoint)
                .bearer_auth(api_key.expose_secret())
                .json(&body)
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Status {
                provider: ProviderKind::Resend,
                status,
                body,
            });
        }

        // The email is already accepted at this point; an odd body only loses the id.
        let parsed = response.json::<ResendResponse>().await.ok();
        Ok(parsed.and_then(|p| p.id))
    }
}

#[async_trait]
impl EmailProvider for ResendProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Resend
    }

    async fn send(&self, email: &OutgoingEmail) -> DeliveryResult {
        match self.deliver(email).await {
            Ok(id) => DeliveryResult::sent(ProviderKind::Resend, id),
            Err(e) => {
                tracing::warn!(provider = "resend", error = %e, "email delivery failed");
                DeliveryResult::failed(ProviderKind::Resend, e)
            }
        }
    }
}
