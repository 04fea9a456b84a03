use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::email::ProviderKind;

/// Lifecycle state of a newsletter subscriber as stored in the CMS.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
    Subscribed,
    Unsubscribed,
    Bounced,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Audit trail recorded alongside an opt-in. Only hashed identities are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    /// Store-assigned identifier, never sent back on writes.
    #[serde(skip)]
    pub id: Option<String>,
    pub email: String,
    #[serde(default)]
    pub status: SubscriberStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_page: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsubscribed_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "metadata_or_default")]
    pub metadata: SubscriberMetadata,
}

// CMS records created by hand may carry `metadata: null`.
fn metadata_or_default<'de, D>(deserializer: D) -> Result<SubscriberMetadata, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<SubscriberMetadata>::deserialize(deserializer)?.unwrap_or_default())
}

impl Subscriber {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: None,
            email: email.into(),
            status: SubscriberStatus::Unknown,
            source_page: None,
            source_path: None,
            subscribed_at: None,
            unsubscribed_at: None,
            metadata: SubscriberMetadata::default(),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.status == SubscriberStatus::Subscribed
    }
}

/// Per-request facts about the caller, gathered by the HTTP layer.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub request_id: String,
    pub client_ip: String,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
}

/// Describes what happened to the email that accompanies a state change.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySummary {
    pub attempted: bool,
    pub sent: bool,
    pub provider: Option<ProviderKind>,
}

impl DeliverySummary {
    pub fn skipped() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    #[serde(default)]
    pub email: String,
    /// Honeypot field, hidden from humans.
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub consent: Option<bool>,
    #[serde(default)]
    pub source_path: Option<String>,
    #[serde(default)]
    pub source_page: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResponse {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_subscribed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsubscribe_url: Option<String>,
    pub delivery: DeliverySummary,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeRequest {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UnsubscribeResponse {
    pub ok: bool,
    pub message: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub team_size: Option<String>,
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub source_page: Option<String>,
    #[serde(default)]
    pub source_path: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DemoResponse {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliverySummary>,
}
