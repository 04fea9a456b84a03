use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use super::{
    is_unusable_credential, parse_mailbox,
    retry::{send_with_retry, RetryPolicy},
    DeliveryResult, EmailError, EmailProvider, OutgoingEmail, ProviderKind,
};

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: [Address<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

#[derive(Serialize)]
struct MailSend<'a> {
    personalizations: [Personalization<'a>; 1],
    from: Address<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<Address<'a>>,
    subject: &'a str,
    content: [Content<'a>; 2],
}

/// SendGrid v3 mail send API.
pub struct SendgridProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    from: String,
    retry: RetryPolicy,
}

impl SendgridProvider {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: Option<SecretString>,
        from: &str,
    ) -> Self {
        Self {
            client,
            endpoint: format!("{}/v3/mail/send", base_url.trim_end_matches('/')),
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
            _ => return Err(EmailError::Unusable(ProviderKind::Sendgrid)),
        };

        let (from_name, from_email) = parse_mailbox(&self.from);
        let body = MailSend {
            personalizations: [Personalization {
                to: [Address {
                    email: &email.to,
                    name: None,
                }],
            }],
            from: Address {
                email: from_email,
                name: from_name,
            },
            reply_to: email.reply_to.as_deref().map(|reply_to| {
                let (name, email) = parse_mailbox(reply_to);
                Address { email, name }
            }),
            subject: &email.subject,
            // SendGrid requires text/plain before text/html
            content: [
                Content {
                    kind: "text/plain",
                    value: &email.text,
                },
                Content {
                    kind: "text/html",
                    value: &email.html,
                },
            ],
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
                provider: ProviderKind::Sendgrid,
                status,
                body,
            });
        }

        Ok(response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned))
    }
}

#[async_trait]
impl EmailProvider for SendgridProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Sendgrid
    }

    async fn send(&self, email: &OutgoingEmail) -> DeliveryResult {
        match self.deliver(email).await {
            Ok(id) => DeliveryResult::sent(ProviderKind::Sendgrid, id),
            Err(e) => {
                tracing::warn!(provider = "sendgrid", error = %e, "email delivery failed");
                DeliveryResult::failed(ProviderKind::Sendgrid, e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to: "reader@acme.com".to_string(),
            subject: "Hello".to_string(),
            html: "<p>Hi</p>".to_string(),
            text: "Hi".to_string(),
            reply_to: None,
        }
    }

    fn provider(server: &MockServer, key: Option<&str>) -> SendgridProvider {
        SendgridProvider::new(
            reqwest::Client::new(),
            &server.uri(),
            key.map(|k| SecretString::from(k.to_string())),
            "Acme AI <news@acme.com>",
        )
        .with_retry(RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
        })
    }

    #[tokio::test]
    async fn test_sends_email_and_reads_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .and(header("authorization", "Bearer SG.live.k3y"))
            .and(body_partial_json(serde_json::json!({
                "from": {"email": "news@acme.com", "name": "Acme AI"},
                "personalizations": [{"to": [{"email": "reader@acme.com"}]}],
                "content": [{"type": "text/plain", "value": "Hi"}, {"type": "text/html", "value": "<p>Hi</p>"}]
            })))
            .respond_with(ResponseTemplate::new(202).insert_header("x-message-id", "sg-1"))
            .expect(1)
            .mount(&server)
            .await;

        let result = provider(&server, Some("SG.live.k3y")).send(&email()).await;

        assert_eq!(result, DeliveryResult::sent(ProviderKind::Sendgrid, Some("sg-1".into())));
    }

    #[tokio::test]
    async fn test_missing_key_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .expect(0)
            .mount(&server)
            .await;

        let result = provider(&server, None).send(&email()).await;

        assert!(!result.ok);
        assert_eq!(result.provider, ProviderKind::Sendgrid);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let result = provider(&server, Some("SG.live.k3y")).send(&email()).await;

        assert!(!result.ok);
        assert!(result.error.unwrap().contains("500"));
    }
}
