use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use secrecy::SecretString;

use crate::{
    cms::InMemoryStore,
    config::{
        AdminConfig, CmsBackend, CmsConfig, Config, EmailConfig, LogFormat, NewsletterConfig,
        RateLimitBackend, RateLimitConfig, ServerConfig,
    },
    email::{DeliveryResult, EmailProvider, OutgoingEmail, ProviderKind},
    newsletter::TokenCodec,
    utils::{rate_limit::InMemoryRateLimiter, state::AppState},
};

pub const TEST_ADMIN_KEY: &str = "admin-key";
pub const TEST_SECRET: &str = "test-secret";

fn secret(value: &str) -> Option<SecretString> {
    Some(SecretString::from(value.to_string()))
}

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
            site_url: "https://site.test".to_string(),
            log_format: LogFormat::Text,
            trust_proxy: false,
        },
        cms: CmsConfig {
            backend: CmsBackend::Memory,
            url: None,
            token: None,
            timeout_ms: 8000,
        },
        email: EmailConfig {
            provider: ProviderKind::Console,
            resend_api_key: None,
            sendgrid_api_key: None,
            resend_base_url: "https://api.resend.com".to_string(),
            sendgrid_base_url: "https://api.sendgrid.com".to_string(),
            from: "Newsletter <news@site.test>".to_string(),
            reply_to: Some("hello@site.test".to_string()),
            demo_request_to: Some("sales@site.test".to_string()),
            demo_timeout_ms: 1000,
        },
        newsletter: NewsletterConfig {
            unsubscribe_secret: secret(TEST_SECRET),
            hash_salt: "test-salt".to_string(),
            default_limit: 25,
            max_limit: 300,
            page_size: 2,
            dry_run_default: false,
        },
        admin: AdminConfig {
            api_key: secret(TEST_ADMIN_KEY),
            allow_localhost: false,
        },
        rate_limit: RateLimitConfig {
            backend: RateLimitBackend::Memory,
            redis_uri: SecretString::from("redis://localhost:6379".to_string()),
            window_secs: 600,
            subscribe_ip: 12,
            subscribe_email: 6,
            unsubscribe_ip: 20,
            demo_ip: 6,
        },
    }
}

/// Email provider that records every message instead of sending it.
#[derive(Default)]
pub struct RecordingEmailProvider {
    sent: Mutex<Vec<OutgoingEmail>>,
    failing: AtomicBool,
}

impl RecordingEmailProvider {
    /// Makes every subsequent send fail (the attempt is still recorded).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl EmailProvider for RecordingEmailProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Console
    }

    async fn send(&self, email: &OutgoingEmail) -> DeliveryResult {
        let mut sent = self.sent.lock().unwrap();
        sent.push(email.clone());
        if self.failing.load(Ordering::SeqCst) {
            DeliveryResult::failed(ProviderKind::Console, "simulated provider outage")
        } else {
            DeliveryResult::sent(ProviderKind::Console, Some(format!("test-{}", sent.len())))
        }
    }
}

/// An [`AppState`] wired to in-memory collaborators the test can inspect.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub email: Arc<RecordingEmailProvider>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let email = Arc::new(RecordingEmailProvider::default());
        let state = AppState {
            tokens: TokenCodec::new(config.newsletter.unsubscribe_secret.clone()),
            rate_limiter: Arc::new(InMemoryRateLimiter::new(config.rate_limit.window())),
            subscribers: Some(store.clone()),
            email: email.clone(),
            config: Arc::new(config),
        };
        Self {
            state,
            store,
            email,
        }
    }

    /// Same wiring, but as if the CMS were not configured.
    pub fn without_store() -> Self {
        let mut app = Self::new();
        app.state.subscribers = None;
        app
    }
}
