use async_trait::async_trait;

use super::{DeliveryResult, EmailProvider, OutgoingEmail, ProviderKind};

/// Logs emails instead of sending them. Always succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleProvider;

#[async_trait]
impl EmailProvider for ConsoleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Console
    }

    async fn send(&self, email: &OutgoingEmail) -> DeliveryResult {
        let id = format!("console-{}", uuid::Uuid::new_v4());
        tracing::info!(
            provider = "console",
            id = %id,
            subject = %email.subject,
            text_len = email.text.len(),
            html_len = email.html.len(),
            "email not sent (console provider)"
        );
        DeliveryResult::sent(ProviderKind::Console, Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_console_always_succeeds() {
        let email = OutgoingEmail {
            to: "a@b.co".to_string(),
            subject: "s".to_string(),
            html: String::new(),
            text: String::new(),
            reply_to: None,
        };
        let result = ConsoleProvider.send(&email).await;
        assert!(result.ok);
        assert_eq!(result.provider, ProviderKind::Console);
        assert!(result.id.unwrap().starts_with("console-"));
    }
}
