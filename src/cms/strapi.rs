use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{CmsError, SubscriberPage, SubscriberStore};
use crate::models::Subscriber;

const COLLECTION_PATH: &str = "/api/newsletter-subscribers";

/// Entry as returned by Strapi. v5 returns flat fields plus `documentId`,
/// v4 nests them under `attributes`.
#[derive(Deserialize)]
struct Entry {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default, rename = "documentId")]
    document_id: Option<String>,
    #[serde(default)]
    attributes: Option<Value>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Entry {
    fn into_subscriber(self) -> Result<Subscriber, CmsError> {
        let fields = self.attributes.unwrap_or(Value::Object(self.fields));
        let mut subscriber: Subscriber =
            serde_json::from_value(fields).map_err(|e| CmsError::Decode(e.to_string()))?;

        subscriber.id = self.document_id.or_else(|| match self.id {
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) => Some(s),
            _ => None,
        });
        Ok(subscriber)
    }
}

#[derive(Deserialize)]
struct ListEnvelope {
    #[serde(default)]
    data: Vec<Entry>,
    #[serde(default)]
    meta: Option<Meta>,
}

#[derive(Deserialize)]
struct SingleEnvelope {
    data: Entry,
}

#[derive(Deserialize)]
struct Meta {
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    page_count: u32,
}

/// Strapi REST client for the `newsletter-subscribers` collection.
pub struct StrapiStore {
    client: Client,
    base_url: String,
    token: SecretString,
    timeout: Duration,
}

impl StrapiStore {
    pub fn new(client: Client, base_url: &str, token: SecretString, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token,
            timeout,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}{}", self.base_url, COLLECTION_PATH)
    }

    /// Every CMS call goes through here: auth, timeout, status check, JSON decode.
    async fn fetch<T>(&self, request: RequestBuilder) -> Result<T, CmsError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let request = request
            .bearer_auth(self.token.expose_secret())
            .header(reqwest::header::ACCEPT, "application/json");

        let call = async {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(CmsError::Status { status, body });
            }
            let body = response.bytes().await?;
            serde_json::from_slice::<T>(&body).map_err(|e| CmsError::Decode(e.to_string()))
        };

        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| CmsError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl SubscriberStore for StrapiStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Subscriber>, CmsError> {
        let request = self.client.get(self.collection_url()).query(&[
            ("filters[email][$eq]", email),
            ("pagination[pageSize]", "1"),
        ]);

        let envelope: ListEnvelope = self.fetch(request).await?;
        envelope
            .data
            .into_iter()
            .next()
            .map(Entry::into_subscriber)
            .transpose()
    }

    async fn create(&self, subscriber: &Subscriber) -> Result<Subscriber, CmsError> {
        let request = self
            .client
            .post(self.collection_url())
            .json(&json!({ "data": subscriber }));

        let envelope: SingleEnvelope = self.fetch(request).await?;
        envelope.data.into_subscriber()
    }

    async fn update(&self, subscriber: &Subscriber) -> Result<Subscriber, CmsError> {
        let id = subscriber.id.as_deref().ok_or(CmsError::MissingId)?;
        let request = self
            .client
            .put(format!("{}/{}", self.collection_url(), id))
            .json(&json!({ "data": subscriber }));

        let envelope: SingleEnvelope = self.fetch(request).await?;
        envelope.data.into_subscriber()
    }

    async fn list_subscribed(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<SubscriberPage, CmsError> {
        let page = page.to_string();
        let page_size = page_size.to_string();
        let request = self.client.get(self.collection_url()).query(&[
            ("filters[status][$eq]", "subscribed"),
            ("pagination[page]", page.as_str()),
            ("pagination[pageSize]", page_size.as_str()),
            ("sort[0]", "id:asc"),
        ]);

        let envelope: ListEnvelope = self.fetch(request).await?;
        let page_count = envelope
            .meta
            .and_then(|m| m.pagination)
            .map(|p| p.page_count)
            .unwrap_or(1);
        let subscribers = envelope
            .data
            .into_iter()
            .map(Entry::into_subscriber)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SubscriberPage {
            subscribers,
            page_count,
        })
    }
}
