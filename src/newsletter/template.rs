//! Newsletter email rendering.
//!
//! [`build_template`] is a pure projection of its input: every caller-supplied
//! string is clamped to a field limit, and escaped before it reaches HTML.
//! The text rendering carries the same items as the HTML rendering.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use super::token::TokenCodec;
use crate::utils::validation::{clamp, clamp_optional, normalize_email};

pub const MAX_ITEMS: usize = 12;
pub const TITLE_MAX: usize = 180;
pub const DESCRIPTION_MAX: usize = 320;
pub const HREF_MAX: usize = 500;
pub const LABEL_MAX: usize = 40;
pub const SUBJECT_MAX: usize = 160;
pub const HEADING_MAX: usize = 160;
pub const INTRO_MAX: usize = 1200;

/// Site path of the unsubscribe page.
const UNSUBSCRIBE_PATH: &str = "/newsletter/unsubscribe";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterItem {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub href: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct TemplateInput {
    pub recipient_email: String,
    pub subject: Option<String>,
    pub heading: String,
    pub intro: String,
    pub cta_label: String,
    pub cta_href: String,
    pub items: Vec<NewsletterItem>,
    pub site_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedNewsletter {
    pub subject: String,
    pub html: String,
    pub text: String,
    pub unsubscribe_url: String,
}

/// Subject used when the caller leaves it blank.
pub fn default_subject(now: DateTime<Utc>) -> String {
    format!("AI Agents Newsletter: {}", now.format("%B %-d, %Y"))
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn encode_query(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Signed-token link when a secret is configured, plain email link otherwise.
///
/// The plain-email fallback carries no integrity protection.
pub fn unsubscribe_url(site_url: &str, email: &str, codec: &TokenCodec) -> String {
    let base = site_url.trim().trim_end_matches('/');
    match codec.encode(email) {
        Some(token) => format!("{base}{UNSUBSCRIBE_PATH}?token={}", encode_query(&token)),
        None => {
            let email = normalize_email(email);
            format!("{base}{UNSUBSCRIBE_PATH}?email={}", encode_query(&email))
        }
    }
}

/// An item after clamping; blank titles or hrefs drop the item.
struct Item {
    title: String,
    description: Option<String>,
    href: String,
    label: String,
}

fn prepare_items(items: &[NewsletterItem]) -> Vec<Item> {
    items
        .iter()
        .filter_map(|item| {
            let title = clamp(&item.title, TITLE_MAX);
            let href = clamp(&item.href, HREF_MAX);
            if title.is_empty() || href.is_empty() {
                return None;
            }
            Some(Item {
                title,
                description: clamp_optional(item.description.as_deref(), DESCRIPTION_MAX),
                href,
                label: clamp_optional(item.label.as_deref(), LABEL_MAX)
                    .unwrap_or_else(|| "Read more".to_string()),
            })
        })
        .take(MAX_ITEMS)
        .collect()
}

pub fn build_template(input: &TemplateInput, codec: &TokenCodec) -> RenderedNewsletter {
    let subject = clamp_optional(input.subject.as_deref(), SUBJECT_MAX)
        .unwrap_or_else(|| default_subject(Utc::now()));
    let heading = clamp(&input.heading, HEADING_MAX);
    let intro = clamp(&input.intro, INTRO_MAX);
    let cta_label = clamp(&input.cta_label, LABEL_MAX);
    let cta_href = clamp(&input.cta_href, HREF_MAX);
    let items = prepare_items(&input.items);
    let unsubscribe_url = unsubscribe_url(&input.site_url, &input.recipient_email, codec);

    let html = render_html(
        &subject,
        &heading,
        &intro,
        &cta_label,
        &cta_href,
        &items,
        &unsubscribe_url,
    );
    let text = render_text(&heading, &intro, &cta_label, &cta_href, &items, &unsubscribe_url);

    RenderedNewsletter {
        subject,
        html,
        text,
        unsubscribe_url,
    }
}

fn render_html(
    subject: &str,
    heading: &str,
    intro: &str,
    cta_label: &str,
    cta_href: &str,
    items: &[Item],
    unsubscribe_url: &str,
) -> String {
    let mut html = String::with_capacity(4096);
    let _ = write!(
        html,
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{}</title></head>\
         <body style=\"margin:0;padding:0;background:#f5f7fb;font-family:Arial,Helvetica,sans-serif;color:#1f2937;\">\
         <table role=\"presentation\" width=\"100%\" cellpadding=\"0\" cellspacing=\"0\"><tr><td align=\"center\" style=\"padding:24px;\">\
         <table role=\"presentation\" width=\"600\" cellpadding=\"0\" cellspacing=\"0\" style=\"background:#ffffff;border-radius:8px;padding:32px;\">",
        escape_html(subject)
    );

    if !heading.is_empty() {
        let _ = write!(
            html,
            "<tr><td><h1 style=\"font-size:24px;margin:0 0 16px;\">{}</h1></td></tr>",
            escape_html(heading)
        );
    }
    if !intro.is_empty() {
        let _ = write!(
            html,
            "<tr><td><p style=\"font-size:16px;line-height:24px;margin:0 0 24px;\">{}</p></td></tr>",
            escape_html(intro)
        );
    }

    for item in items {
        let _ = write!(
            html,
            "<tr><td style=\"padding:0 0 20px;\"><h2 style=\"font-size:18px;margin:0 0 6px;\">{}</h2>",
            escape_html(&item.title)
        );
        if let Some(description) = &item.description {
            let _ = write!(
                html,
                "<p style=\"font-size:14px;line-height:20px;margin:0 0 6px;\">{}</p>",
                escape_html(description)
            );
        }
        let _ = write!(
            html,
            "<a href=\"{}\" style=\"color:#2563eb;font-size:14px;\">{}</a></td></tr>",
            escape_html(&item.href),
            escape_html(&item.label)
        );
    }

    if !cta_label.is_empty() && !cta_href.is_empty() {
        let _ = write!(
            html,
            "<tr><td style=\"padding:8px 0 24px;\"><a href=\"{}\" style=\"display:inline-block;background:#2563eb;color:#ffffff;\
             padding:12px 20px;border-radius:6px;text-decoration:none;\">{}</a></td></tr>",
            escape_html(cta_href),
            escape_html(cta_label)
        );
    }

    let _ = write!(
        html,
        "<tr><td style=\"border-top:1px solid #e5e7eb;padding-top:16px;font-size:12px;color:#6b7280;\">\
         You are receiving this because you subscribed to our newsletter. \
         <a href=\"{}\" style=\"color:#6b7280;\">Unsubscribe</a></td></tr>\
         </table></td></tr></table></body></html>",
        escape_html(unsubscribe_url)
    );
    html
}

fn render_text(
    heading: &str,
    intro: &str,
    cta_label: &str,
    cta_href: &str,
    items: &[Item],
    unsubscribe_url: &str,
) -> String {
    let mut text = String::with_capacity(1024);
    if !heading.is_empty() {
        let _ = writeln!(text, "{heading}\n");
    }
    if !intro.is_empty() {
        let _ = writeln!(text, "{intro}\n");
    }
    for (i, item) in items.iter().enumerate() {
        let _ = writeln!(text, "{}. {}", i + 1, item.title);
        if let Some(description) = &item.description {
            let _ = writeln!(text, "   {description}");
        }
        let _ = writeln!(text, "   {}: {}\n", item.label, item.href);
    }
    if !cta_label.is_empty() && !cta_href.is_empty() {
        let _ = writeln!(text, "{cta_label}: {cta_href}\n");
    }
    let _ = write!(
        text,
        "--\nYou are receiving this because you subscribed to our newsletter.\nUnsubscribe: {unsubscribe_url}\n"
    );
    text
}
