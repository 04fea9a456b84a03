//! Subscriber records kept in the headless CMS.

pub(crate) mod error;
mod memory;
mod strapi;

use async_trait::async_trait;

pub use error::CmsError;
pub use memory::InMemoryStore;
pub use strapi::StrapiStore;

use crate::models::Subscriber;

/// One page of subscribed records.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscriberPage {
    pub subscribers: Vec<Subscriber>,
    pub page_count: u32,
}

/// Abstract interface over the subscriber collection.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Look a subscriber up by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Subscriber>, CmsError>;
    /// Create a record and return it with its store-assigned id.
    async fn create(&self, subscriber: &Subscriber) -> Result<Subscriber, CmsError>;
    /// Overwrite an existing record identified by `subscriber.id`.
    async fn update(&self, subscriber: &Subscriber) -> Result<Subscriber, CmsError>;
    /// Page through records whose status is `subscribed`. Pages start at 1.
    async fn list_subscribed(&self, page: u32, page_size: u32)
        -> Result<SubscriberPage, CmsError>;
}
