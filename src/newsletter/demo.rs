//! Demo requests from the marketing site, forwarded to the sales inbox.

use std::fmt::Write as _;

use super::{enforce_limit, is_honeypot_tripped, template::escape_html, NewsletterError};
use crate::{
    email::{parse_mailbox, DeliveryResult, OutgoingEmail},
    models::{DeliverySummary, DemoRequest, DemoResponse, RequestContext},
    utils::{
        identity::hash_identity,
        rate_limit::Scope,
        state::AppState,
        validation::{clamp_optional, is_valid_email, normalize_email},
    },
};

const THANKS_MESSAGE: &str = "Thanks! Our team will reach out shortly to schedule your demo.";

const NAME_MAX: usize = 120;
const COMPANY_MAX: usize = 160;
const ROLE_MAX: usize = 120;
const TEAM_SIZE_MAX: usize = 40;
const TIMELINE_MAX: usize = 80;
const MESSAGE_MAX: usize = 2000;
const SOURCE_MAX: usize = 200;

/// Clamped, non-blank fields of a demo request, in display order.
fn fields(request: &DemoRequest, email: &str) -> Vec<(&'static str, String)> {
    let optional = [
        ("Name", request.name.as_deref(), NAME_MAX),
        ("Company", request.company.as_deref(), COMPANY_MAX),
        ("Role", request.role.as_deref(), ROLE_MAX),
        ("Team size", request.team_size.as_deref(), TEAM_SIZE_MAX),
        ("Timeline", request.timeline.as_deref(), TIMELINE_MAX),
        ("Source page", request.source_page.as_deref(), SOURCE_MAX),
        ("Source path", request.source_path.as_deref(), SOURCE_MAX),
        ("Message", request.message.as_deref(), MESSAGE_MAX),
    ];

    let mut fields = vec![("Email", email.to_string())];
    fields.extend(
        optional
            .into_iter()
            .filter_map(|(label, value, max)| clamp_optional(value, max).map(|v| (label, v))),
    );
    fields
}

fn notification(request: &DemoRequest, email: &str, ctx: &RequestContext) -> (String, String, String) {
    let fields = fields(request, email);
    let who = fields
        .iter()
        .find(|(label, _)| *label == "Company")
        .or_else(|| fields.iter().find(|(label, _)| *label == "Name"))
        .map_or(email, |(_, value)| value.as_str());
    let subject = format!("Demo request: {who}");

    let mut text = String::new();
    let mut html = String::from("<h2>New demo request</h2><table cellpadding=\"4\">");
    for (label, value) in &fields {
        let _ = writeln!(text, "{label}: {value}");
        let _ = write!(
            html,
            "<tr><td><strong>{label}</strong></td><td style=\"white-space:pre-wrap;\">{}</td></tr>",
            escape_html(value)
        );
    }
    html.push_str("</table>");
    let _ = write!(text, "\nRequest ID: {}\n", ctx.request_id);
    let _ = write!(html, "<p style=\"color:#6b7280;\">Request ID: {}</p>", escape_html(&ctx.request_id));

    (subject, html, text)
}

pub async fn request_demo(
    state: &AppState,
    ctx: &RequestContext,
    request: DemoRequest,
) -> Result<DemoResponse, NewsletterError> {
    if is_honeypot_tripped(request.website.as_deref()) {
        tracing::info!(request_id = %ctx.request_id, "honeypot tripped on demo request, dropping");
        return Ok(DemoResponse {
            ok: true,
            message: THANKS_MESSAGE.to_string(),
            delivery: None,
        });
    }

    let email = normalize_email(&request.email);
    if !is_valid_email(&email) {
        return Err(NewsletterError::validation("Please enter a valid work email address."));
    }

    let ip_hash = hash_identity(&state.config.newsletter.hash_salt, &ctx.client_ip);
    enforce_limit(
        &*state.rate_limiter,
        Scope::Ip,
        &ip_hash,
        state.config.rate_limit.demo_ip,
    )
    .await?;

    let settings = &state.config.email;
    let to = settings
        .demo_request_to
        .as_deref()
        .map(str::trim)
        .filter(|to| !to.is_empty())
        .unwrap_or_else(|| parse_mailbox(&settings.from).1)
        .to_string();
    let (subject, html, text) = notification(&request, &email, ctx);
    let message = OutgoingEmail {
        to,
        subject,
        html,
        text,
        reply_to: Some(email),
    };

    let timeout = settings.demo_timeout();
    let result = tokio::time::timeout(timeout, state.email.send(&message))
        .await
        .unwrap_or_else(|_| {
            DeliveryResult::failed(state.email.kind(), format!("timed out after {timeout:?}"))
        });

    if result.ok {
        tracing::info!(request_id = %ctx.request_id, provider = %result.provider, "demo request forwarded");
    } else {
        tracing::warn!(
            request_id = %ctx.request_id,
            provider = %result.provider,
            error = result.error.as_deref().unwrap_or_default(),
            "demo request notification failed"
        );
    }

    Ok(DemoResponse {
        ok: true,
        message: THANKS_MESSAGE.to_string(),
        delivery: Some(DeliverySummary::from(&result)),
    })
}
