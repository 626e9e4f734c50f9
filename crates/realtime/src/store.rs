use crate::channel::{ChangeCallback, ChannelBuilder, DatabaseChanges, Subscription};
use crate::error::RealtimeError;
use crate::filters::DatabaseFilter;
use crate::message::Document;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Keyed document collections with a realtime change feed.
///
/// Every write is last-write-wins on the fields it touches; the only
/// conditional primitive is [`DocumentStore::update_where`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, RealtimeError>;

    /// All records of a collection in insertion order.
    async fn list(&self, collection: &str) -> Result<Vec<Document>, RealtimeError>;

    /// Insert or replace a whole record.
    async fn set(
        &self,
        collection: &str,
        key: &str,
        data: Value,
    ) -> Result<Document, RealtimeError>;

    /// Shallow merge of top-level fields into an existing record.
    async fn update(
        &self,
        collection: &str,
        key: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, RealtimeError>;

    /// Like [`DocumentStore::update`], applied only when the stored record
    /// satisfies `precondition` at write time.
    async fn update_where(
        &self,
        collection: &str,
        key: &str,
        precondition: &DatabaseFilter,
        fields: Map<String, Value>,
    ) -> Result<Document, RealtimeError>;

    /// Atomically append `item` to the array `field`. When `sequence_field`
    /// is set, the store writes the item's 1-based position into it.
    async fn array_append(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        item: Value,
        sequence_field: Option<&str>,
    ) -> Result<Document, RealtimeError>;

    async fn delete(&self, collection: &str, key: &str) -> Result<(), RealtimeError>;

    fn subscribe(
        &self,
        changes: DatabaseChanges,
        callback: ChangeCallback,
    ) -> Result<Subscription, RealtimeError>;

    /// Number of live subscriptions.
    fn subscriber_count(&self) -> usize;
}

impl<'s> dyn DocumentStore + 's {
    pub fn channel(&self, topic: &str) -> ChannelBuilder<'_> {
        ChannelBuilder::new(self, topic)
    }
}
