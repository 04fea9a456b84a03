//! Subscribe and unsubscribe state transitions.
//!
//! A subscribe request is two steps composed by one caller:
//! [`write_subscription_state`] performs the CMS transition and
//! [`attempt_notify`] sends the welcome email. The notification outcome is
//! merged into the response and never undoes or blocks the state change.

use chrono::Utc;

use super::{
    enforce_limit, is_honeypot_tripped,
    template::{build_template, unsubscribe_url, TemplateInput},
    NewsletterError, TokenCodec,
};
use crate::{
    cms::SubscriberStore,
    email::OutgoingEmail,
    models::{
        DeliverySummary, RequestContext, SubscribeRequest, SubscribeResponse, Subscriber,
        SubscriberMetadata, SubscriberStatus, UnsubscribeRequest, UnsubscribeResponse,
    },
    utils::{
        identity::hash_identity,
        rate_limit::Scope,
        state::AppState,
        validation::{clamp_optional, is_valid_email, normalize_email},
    },
};

const SOURCE_MAX: usize = 200;
const REFERRER_MAX: usize = 500;
const USER_AGENT_MAX: usize = 300;

const UNSUBSCRIBED_MESSAGE: &str = "You have been unsubscribed. You will no longer receive the newsletter.";

/// What [`write_subscription_state`] did to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionOutcome {
    Created,
    Reactivated,
    AlreadySubscribed,
}

impl SubscriptionOutcome {
    fn message(self, delivery: &DeliverySummary) -> &'static str {
        match (self, delivery.sent) {
            (Self::Created, true) => {
                "Subscription confirmed. Check your inbox for a welcome email."
            }
            (Self::Created, false) => {
                "Subscription confirmed. We could not send the welcome email right now, but you are on the list."
            }
            (Self::Reactivated, true) => {
                "Welcome back! Your subscription has been reactivated."
            }
            (Self::Reactivated, false) => {
                "Your subscription has been reactivated. We could not send the welcome email right now."
            }
            (Self::AlreadySubscribed, _) => "You are already subscribed.",
        }
    }
}

pub async fn subscribe(
    state: &AppState,
    ctx: &RequestContext,
    request: SubscribeRequest,
) -> Result<SubscribeResponse, NewsletterError> {
    if request.consent != Some(true) {
        return Err(NewsletterError::validation(
            "Please confirm that you want to receive the newsletter.",
        ));
    }
    let email = normalize_email(&request.email);
    if !is_valid_email(&email) {
        return Err(NewsletterError::validation("Please enter a valid email address."));
    }

    if is_honeypot_tripped(request.website.as_deref()) {
        tracing::info!(request_id = %ctx.request_id, "honeypot tripped on subscribe, dropping");
        return Ok(SubscribeResponse {
            ok: true,
            message: "Subscription confirmed.".to_string(),
            already_subscribed: false,
            unsubscribe_url: None,
            delivery: DeliverySummary::skipped(),
        });
    }

    let store = state.store()?;
    let salt = &state.config.newsletter.hash_salt;
    let limits = &state.config.rate_limit;
    let ip_hash = hash_identity(salt, &ctx.client_ip);
    let email_hash = hash_identity(salt, &email);
    enforce_limit(&*state.rate_limiter, Scope::Ip, &ip_hash, limits.subscribe_ip).await?;
    enforce_limit(&*state.rate_limiter, Scope::Email, &email_hash, limits.subscribe_email).await?;

    let metadata = SubscriberMetadata {
        request_id: Some(ctx.request_id.clone()).filter(|id| !id.is_empty()),
        ip_hash: Some(ip_hash),
        email_hash: Some(email_hash.clone()),
        referrer: clamp_optional(ctx.referrer.as_deref(), REFERRER_MAX),
        user_agent: clamp_optional(ctx.user_agent.as_deref(), USER_AGENT_MAX),
    };
    let outcome = write_subscription_state(store, &email, &request, metadata)
        .await
        .inspect_err(|e| {
            tracing::error!(request_id = %ctx.request_id, %email_hash, "subscription write failed: {e}")
        })?;

    let site_url = &state.config.server.site_url;
    let unsubscribe_url = unsubscribe_url(site_url, &email, &state.tokens);
    let delivery = match outcome {
        SubscriptionOutcome::AlreadySubscribed => DeliverySummary::skipped(),
        SubscriptionOutcome::Created | SubscriptionOutcome::Reactivated => {
            attempt_notify(state, &email).await
        }
    };

    tracing::info!(
        request_id = %ctx.request_id,
        %email_hash,
        ?outcome,
        sent = delivery.sent,
        "subscribe handled"
    );

    Ok(SubscribeResponse {
        ok: true,
        message: outcome.message(&delivery).to_string(),
        already_subscribed: outcome == SubscriptionOutcome::AlreadySubscribed,
        unsubscribe_url: Some(unsubscribe_url),
        delivery,
    })
}

/// Moves the record for `email` to `subscribed`. An already subscribed
/// record is left untouched.
pub async fn write_subscription_state(
    store: &dyn SubscriberStore,
    email: &str,
    request: &SubscribeRequest,
    metadata: SubscriberMetadata,
) -> Result<SubscriptionOutcome, NewsletterError> {
    let source_page = clamp_optional(request.source_page.as_deref(), SOURCE_MAX);
    let source_path = clamp_optional(request.source_path.as_deref(), SOURCE_MAX);

    match store.find_by_email(email).await? {
        Some(existing) if existing.is_subscribed() => Ok(SubscriptionOutcome::AlreadySubscribed),
        Some(mut existing) => {
            existing.status = SubscriberStatus::Subscribed;
            existing.subscribed_at = Some(Utc::now());
            existing.source_page = source_page.or(existing.source_page);
            existing.source_path = source_path.or(existing.source_path);
            existing.metadata = metadata;
            store.update(&existing).await?;
            Ok(SubscriptionOutcome::Reactivated)
        }
        None => {
            let subscriber = Subscriber {
                status: SubscriberStatus::Subscribed,
                subscribed_at: Some(Utc::now()),
                source_page,
                source_path,
                metadata,
                ..Subscriber::new(email)
            };
            store.create(&subscriber).await?;
            Ok(SubscriptionOutcome::Created)
        }
    }
}

/// Best-effort welcome email. Failures are reported, never raised.
pub async fn attempt_notify(state: &AppState, email: &str) -> DeliverySummary {
    let site_url = state.config.server.site_url.trim_end_matches('/');
    let input = TemplateInput {
        recipient_email: email.to_string(),
        subject: Some("Welcome to the AI Agents newsletter".to_string()),
        heading: "You're subscribed".to_string(),
        intro: "Thanks for signing up. Every issue brings new AI agents, MCP servers and \
                practical use cases straight to your inbox."
            .to_string(),
        cta_label: "Explore the catalog".to_string(),
        cta_href: format!("{site_url}/agents"),
        items: Vec::new(),
        site_url: site_url.to_string(),
    };
    let rendered = build_template(&input, &state.tokens);

    let result = state
        .email
        .send(&OutgoingEmail {
            to: email.to_string(),
            subject: rendered.subject,
            html: rendered.html,
            text: rendered.text,
            reply_to: state.config.email.reply_to.clone(),
        })
        .await;

    if !result.ok {
        tracing::warn!(
            provider = %result.provider,
            error = result.error.as_deref().unwrap_or_default(),
            "welcome email failed"
        );
    }
    DeliverySummary::from(&result)
}

pub async fn unsubscribe(
    state: &AppState,
    ctx: &RequestContext,
    request: UnsubscribeRequest,
) -> Result<UnsubscribeResponse, NewsletterError> {
    let email = resolve_identity(&state.tokens, &request)?;
    let store = state.store()?;

    let salt = &state.config.newsletter.hash_salt;
    let ip_hash = hash_identity(salt, &ctx.client_ip);
    enforce_limit(
        &*state.rate_limiter,
        Scope::Ip,
        &ip_hash,
        state.config.rate_limit.unsubscribe_ip,
    )
    .await?;

    let email_hash = hash_identity(salt, &email);
    match store.find_by_email(&email).await? {
        Some(mut subscriber) if subscriber.status != SubscriberStatus::Unsubscribed => {
            subscriber.status = SubscriberStatus::Unsubscribed;
            subscriber.unsubscribed_at = Some(Utc::now());
            store.update(&subscriber).await.inspect_err(|e| {
                tracing::error!(request_id = %ctx.request_id, %email_hash, "unsubscribe write failed: {e}")
            })?;
            tracing::info!(request_id = %ctx.request_id, %email_hash, "subscriber unsubscribed");
        }
        Some(_) => {
            tracing::debug!(request_id = %ctx.request_id, %email_hash, "already unsubscribed");
        }
        None => {
            tracing::debug!(request_id = %ctx.request_id, %email_hash, "unsubscribe for unknown address");
        }
    }

    Ok(UnsubscribeResponse {
        ok: true,
        message: UNSUBSCRIBED_MESSAGE.to_string(),
    })
}

/// Signed token first, then the bare email address.
fn resolve_identity(
    tokens: &TokenCodec,
    request: &UnsubscribeRequest,
) -> Result<String, NewsletterError> {
    let token = request.token.as_deref().map(str::trim).filter(|t| !t.is_empty());
    if let Some(email) = token.and_then(|t| tokens.decode(t)) {
        return Ok(email);
    }

    let email = request
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|e| !e.is_empty());
    match (email, token) {
        (Some(email), _) if is_valid_email(&email) => Ok(email),
        (Some(_), _) => Err(NewsletterError::validation("Please enter a valid email address.")),
        (None, Some(_)) => Err(NewsletterError::validation("This unsubscribe link is invalid.")),
        (None, None) => Err(NewsletterError::validation(
            "An unsubscribe token or email address is required.",
        )),
    }
}
