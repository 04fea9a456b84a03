//! Campaign dispatch: a single test send or a bounded fan-out over every
//! subscribed record.
//!
//! Recipients are processed one at a time and independently. A failed send
//! is recorded and the loop moves on.

use serde::{Deserialize, Serialize};

use super::{
    template::{build_template, NewsletterItem, RenderedNewsletter, TemplateInput},
    NewsletterError,
};
use crate::{
    cms::SubscriberStore,
    email::OutgoingEmail,
    utils::{
        state::AppState,
        validation::{is_valid_email, normalize_email},
    },
};

/// Phrase a campaign request must carry in `confirm`.
pub const CONFIRM_PHRASE: &str = "SEND";
/// Entries kept in [`CampaignReport::failures`].
pub const MAX_REPORTED_FAILURES: usize = 25;

pub const PREVIEW_EMAIL: &str = "preview@example.com";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SendMode {
    Test,
    Campaign,
}

impl SendMode {
    fn parse(mode: Option<&str>) -> Result<Self, NewsletterError> {
        match mode.map(|m| m.trim().to_ascii_lowercase()).as_deref() {
            Some("test") => Ok(Self::Test),
            Some("campaign") => Ok(Self::Campaign),
            _ => Err(NewsletterError::validation(
                "mode must be either \"test\" or \"campaign\".",
            )),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub recipient_email: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub confirm: Option<String>,
    #[serde(default)]
    pub dry_run: Option<bool>,
    #[serde(flatten)]
    pub content: CampaignContent,
}

/// Editorial content of an issue. Blank fields fall back to defaults.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignContent {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub intro: Option<String>,
    #[serde(default)]
    pub cta_label: Option<String>,
    #[serde(default)]
    pub cta_href: Option<String>,
    #[serde(default)]
    pub items: Vec<NewsletterItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SendFailure {
    pub email: String,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignReport {
    pub ok: bool,
    pub mode: SendMode,
    pub dry_run: bool,
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub failures: Vec<SendFailure>,
}

impl CampaignReport {
    fn new(mode: SendMode, dry_run: bool) -> Self {
        Self {
            ok: true,
            mode,
            dry_run,
            total: 0,
            sent: 0,
            failed: 0,
            failures: Vec::new(),
        }
    }

    fn record_failure(&mut self, email: &str, error: String) {
        self.failed += 1;
        if self.failures.len() < MAX_REPORTED_FAILURES {
            self.failures.push(SendFailure {
                email: email.to_string(),
                error,
            });
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Renders the issue for one recipient.
pub fn render_for(state: &AppState, content: &CampaignContent, recipient: &str) -> RenderedNewsletter {
    let site_url = state.config.server.site_url.trim_end_matches('/');
    let input = TemplateInput {
        recipient_email: recipient.to_string(),
        subject: content.subject.clone(),
        heading: non_blank(&content.heading)
            .unwrap_or("This week in AI agents")
            .to_string(),
        intro: non_blank(&content.intro)
            .unwrap_or(
                "Here is a round-up of the newest agents, MCP servers and use cases added \
                 to the catalog.",
            )
            .to_string(),
        cta_label: non_blank(&content.cta_label)
            .unwrap_or("Browse the catalog")
            .to_string(),
        cta_href: non_blank(&content.cta_href)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{site_url}/agents")),
        items: content.items.clone(),
        site_url: site_url.to_string(),
    };
    build_template(&input, &state.tokens)
}

/// Renders the default issue for the template preview endpoint.
pub fn preview(state: &AppState, email: Option<&str>) -> RenderedNewsletter {
    let email = email
        .map(normalize_email)
        .filter(|e| is_valid_email(e))
        .unwrap_or_else(|| PREVIEW_EMAIL.to_string());
    render_for(state, &CampaignContent::default(), &email)
}

pub async fn dispatch(
    state: &AppState,
    request: SendRequest,
) -> Result<CampaignReport, NewsletterError> {
    let mode = SendMode::parse(request.mode.as_deref())?;
    let dry_run = request
        .dry_run
        .unwrap_or(state.config.newsletter.dry_run_default);

    match mode {
        SendMode::Test => send_test(state, &request, dry_run).await,
        SendMode::Campaign => send_campaign(state, &request, dry_run).await,
    }
}

async fn send_test(
    state: &AppState,
    request: &SendRequest,
    dry_run: bool,
) -> Result<CampaignReport, NewsletterError> {
    let recipient = request
        .recipient_email
        .as_deref()
        .map(normalize_email)
        .filter(|e| is_valid_email(e))
        .ok_or_else(|| {
            NewsletterError::validation("A valid recipientEmail is required in test mode.")
        })?;

    let mut report = CampaignReport::new(SendMode::Test, dry_run);
    report.total = 1;
    let rendered = render_for(state, &request.content, &recipient);
    if dry_run {
        report.sent = 1;
        return Ok(report);
    }

    let result = state.email.send(&outgoing(state, &recipient, rendered)).await;
    if !result.ok {
        let error = result.error.unwrap_or_else(|| "unknown error".to_string());
        tracing::warn!(provider = %result.provider, "test send failed: {error}");
        return Err(NewsletterError::ProviderFailure(error));
    }

    tracing::info!(provider = %result.provider, "test newsletter sent");
    report.sent = 1;
    Ok(report)
}

async fn send_campaign(
    state: &AppState,
    request: &SendRequest,
    dry_run: bool,
) -> Result<CampaignReport, NewsletterError> {
    if request.confirm.as_deref().map(str::trim) != Some(CONFIRM_PHRASE) {
        return Err(NewsletterError::validation(format!(
            "Campaign sends require confirm: \"{CONFIRM_PHRASE}\"."
        )));
    }
    let store = state.store()?;

    let settings = &state.config.newsletter;
    let limit = clamp_limit(request.limit, settings.default_limit, settings.max_limit);
    let recipients = collect_recipients(store, limit, settings.page_size).await?;

    let mut report = CampaignReport::new(SendMode::Campaign, dry_run);
    report.total = recipients.len();

    for recipient in &recipients {
        let rendered = render_for(state, &request.content, recipient);
        if dry_run {
            report.sent += 1;
            continue;
        }

        let result = state.email.send(&outgoing(state, recipient, rendered)).await;
        if result.ok {
            report.sent += 1;
        } else {
            let error = result.error.unwrap_or_else(|| "unknown error".to_string());
            tracing::warn!(provider = %result.provider, "campaign send failed: {error}");
            report.record_failure(recipient, error);
        }
    }

    tracing::info!(
        total = report.total,
        sent = report.sent,
        failed = report.failed,
        dry_run,
        "campaign dispatched"
    );
    Ok(report)
}

/// `limit` defaults to `default_limit` and is clamped to `[1, max_limit]`.
pub fn clamp_limit(limit: Option<i64>, default_limit: u32, max_limit: u32) -> usize {
    let max_limit = i64::from(max_limit.max(1));
    let limit = limit.unwrap_or(i64::from(default_limit)).clamp(1, max_limit);
    usize::try_from(limit).unwrap_or(1)
}

/// Pages through subscribed records until `limit` addresses are collected.
async fn collect_recipients(
    store: &dyn SubscriberStore,
    limit: usize,
    page_size: u32,
) -> Result<Vec<String>, NewsletterError> {
    let page_size = page_size.max(1);
    let mut recipients = Vec::with_capacity(limit);
    let mut page = 1;

    loop {
        let batch = store.list_subscribed(page, page_size).await?;
        let exhausted = batch.subscribers.is_empty() || page >= batch.page_count;
        for subscriber in batch.subscribers {
            if recipients.len() == limit {
                return Ok(recipients);
            }
            let email = normalize_email(&subscriber.email);
            if is_valid_email(&email) {
                recipients.push(email);
            }
        }
        if exhausted || recipients.len() == limit {
            return Ok(recipients);
        }
        page += 1;
    }
}

fn outgoing(state: &AppState, recipient: &str, rendered: RenderedNewsletter) -> OutgoingEmail {
    OutgoingEmail {
        to: recipient.to_string(),
        subject: rendered.subject,
        html: rendered.html,
        text: rendered.text,
        reply_to: state.config.email.reply_to.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Subscriber, SubscriberStatus},
        test_utils::TestApp,
    };

    fn seed(app: &TestApp, count: usize) {
        for i in 0..count {
            app.store.insert(Subscriber {
                status: SubscriberStatus::Subscribed,
                ..Subscriber::new(format!("reader{i:02}@acme.com"))
            });
        }
    }

    fn campaign(limit: Option<i64>, dry_run: bool) -> SendRequest {
        SendRequest {
            mode: Some("campaign".to_string()),
            confirm: Some("SEND".to_string()),
            limit,
            dry_run: Some(dry_run),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_sending() {
        let app = TestApp::new();
        seed(&app, 3);

        let report = dispatch(&app.state, campaign(Some(10), true)).await.unwrap();

        assert!(report.ok);
        assert_eq!((report.total, report.sent, report.failed), (3, 3, 0));
        assert_eq!(app.email.count(), 0);
    }

    #[tokio::test]
    async fn test_campaign_requires_confirm() {
        let app = TestApp::new();
        seed(&app, 1);
        for confirm in [None, Some("send"), Some("yes")] {
            let mut request = campaign(None, false);
            request.confirm = confirm.map(str::to_string);
            let result = dispatch(&app.state, request).await;
            assert!(matches!(result, Err(NewsletterError::Validation(_))));
        }
        assert_eq!(app.email.count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_mode_is_rejected() {
        let app = TestApp::new();
        for mode in [None, Some("blast")] {
            let request = SendRequest {
                mode: mode.map(str::to_string),
                ..Default::default()
            };
            let result = dispatch(&app.state, request).await;
            assert!(matches!(result, Err(NewsletterError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn test_campaign_pages_and_respects_limit() {
        let app = TestApp::new();
        seed(&app, 7);
        let mut gone = Subscriber::new("gone@acme.com");
        gone.status = SubscriberStatus::Unsubscribed;
        app.store.insert(gone);

        let report = dispatch(&app.state, campaign(Some(5), false)).await.unwrap();

        assert_eq!((report.total, report.sent), (5, 5));
        let sent = app.email.sent();
        assert_eq!(sent.len(), 5);
        assert!(sent.iter().all(|e| e.to != "gone@acme.com"));

        let report = dispatch(&app.state, campaign(Some(100), false)).await.unwrap();
        assert_eq!(report.total, 7);
    }

    #[tokio::test]
    async fn test_each_recipient_gets_own_unsubscribe_link() {
        let app = TestApp::new();
        seed(&app, 2);

        dispatch(&app.state, campaign(None, false)).await.unwrap();

        let sent = app.email.sent();
        for email in &sent {
            let token = app.state.tokens.encode(&email.to).unwrap();
            assert!(email.text.contains(&token), "{} missing own token", email.to);
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated_and_capped() {
        let app = TestApp::new();
        seed(&app, 30);
        app.email.set_failing(true);

        let report = dispatch(&app.state, campaign(Some(30), false)).await.unwrap();

        assert!(report.ok);
        assert_eq!(report.total, 30);
        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, 30);
        assert_eq!(report.failures.len(), MAX_REPORTED_FAILURES);
        assert_eq!(app.email.count(), 30);
    }

    #[tokio::test]
    async fn test_campaign_without_store_is_not_configured() {
        let app = TestApp::without_store();
        let result = dispatch(&app.state, campaign(None, true)).await;
        assert!(matches!(result, Err(NewsletterError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_test_mode_sends_single_email() {
        let app = TestApp::new();
        let request = SendRequest {
            mode: Some("test".to_string()),
            recipient_email: Some("Editor@Acme.com".to_string()),
            content: CampaignContent {
                subject: Some("Issue #1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let report = dispatch(&app.state, request).await.unwrap();

        assert_eq!((report.total, report.sent), (1, 1));
        let sent = app.email.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "editor@acme.com");
        assert_eq!(sent[0].subject, "Issue #1");
        assert_eq!(sent[0].reply_to.as_deref(), Some("hello@site.test"));
    }

    #[tokio::test]
    async fn test_test_mode_requires_recipient() {
        let app = TestApp::new();
        let request = SendRequest {
            mode: Some("test".to_string()),
            ..Default::default()
        };
        let result = dispatch(&app.state, request).await;
        assert!(matches!(result, Err(NewsletterError::Validation(_))));
    }

    #[tokio::test]
    async fn test_test_mode_provider_failure_surfaces() {
        let app = TestApp::new();
        app.email.set_failing(true);
        let request = SendRequest {
            mode: Some("test".to_string()),
            recipient_email: Some("editor@acme.com".to_string()),
            ..Default::default()
        };
        let result = dispatch(&app.state, request).await;
        assert!(matches!(result, Err(NewsletterError::ProviderFailure(_))));
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None, 25, 300), 25);
        assert_eq!(clamp_limit(Some(0), 25, 300), 1);
        assert_eq!(clamp_limit(Some(-4), 25, 300), 1);
        assert_eq!(clamp_limit(Some(10_000), 25, 300), 300);
    }

    #[test]
    fn test_preview_defaults_recipient() {
        let app = TestApp::new();
        let rendered = preview(&app.state, None);
        let token = app.state.tokens.encode(PREVIEW_EMAIL).unwrap();
        assert!(rendered.unsubscribe_url.ends_with(&token));

        let rendered = preview(&app.state, Some("not an email"));
        assert!(rendered.unsubscribe_url.ends_with(&token));
    }
}
