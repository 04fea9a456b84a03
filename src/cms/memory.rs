use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        RwLock,
    },
};

use async_trait::async_trait;

use super::{CmsError, SubscriberPage, SubscriberStore};
use crate::models::Subscriber;

/// Subscriber collection held in process memory, keyed by email.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<BTreeMap<String, Subscriber>>,
    next_id: AtomicU64,
    writes: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing the write counter.
    pub fn insert(&self, mut subscriber: Subscriber) -> Subscriber {
        if subscriber.id.is_none() {
            subscriber.id = Some(self.allocate_id());
        }
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(subscriber.email.clone(), subscriber.clone());
        subscriber
    }

    pub fn get(&self, email: &str) -> Option<Subscriber> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(email)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of create/update calls served.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn allocate_id(&self) -> String {
        (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

#[async_trait]
impl SubscriberStore for InMemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Subscriber>, CmsError> {
        Ok(self.get(email))
    }

    async fn create(&self, subscriber: &Subscriber) -> Result<Subscriber, CmsError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut created = subscriber.clone();
        created.id = Some(self.allocate_id());
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(created.email.clone(), created.clone());
        Ok(created)
    }

    async fn update(&self, subscriber: &Subscriber) -> Result<Subscriber, CmsError> {
        let id = subscriber.id.as_deref().ok_or(CmsError::MissingId)?;
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let existing = records
            .values()
            .find(|s| s.id.as_deref() == Some(id))
            .map(|s| s.email.clone())
            .ok_or_else(|| CmsError::Decode(format!("no subscriber with id {id}")))?;

        self.writes.fetch_add(1, Ordering::SeqCst);
        records.remove(&existing);
        records.insert(subscriber.email.clone(), subscriber.clone());
        Ok(subscriber.clone())
    }

    async fn list_subscribed(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<SubscriberPage, CmsError> {
        let page_size = page_size.max(1) as usize;
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let subscribed: Vec<&Subscriber> = records.values().filter(|s| s.is_subscribed()).collect();

        let page_count = subscribed.len().div_ceil(page_size).max(1) as u32;
        let skip = (page.max(1) as usize - 1) * page_size;
        let subscribers = subscribed
            .into_iter()
            .skip(skip)
            .take(page_size)
            .cloned()
            .collect();

        Ok(SubscriberPage {
            subscribers,
            page_count,
        })
    }
}
