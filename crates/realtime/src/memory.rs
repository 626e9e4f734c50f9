//! In-process [`DocumentStore`] used for local runs and tests.

use crate::channel::{
    ChangeCallback, ChannelBuilder, DatabaseChanges, SubscriberRegistry, Subscription,
};
use crate::error::RealtimeError;
use crate::filters::DatabaseFilter;
use crate::message::{ChannelEvent, Document, Payload};
use crate::store::DocumentStore;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

#[derive(Default)]
struct Collection {
    documents: HashMap<String, Document>,
    next_position: u64,
}

#[derive(Default)]
struct State {
    collections: BTreeMap<String, Collection>,
    commit_sequence: u64,
}

/// Memory-backed store. Cheap to clone; clones share data and subscribers.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    subscribers: Arc<SubscriberRegistry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, topic: &str) -> ChannelBuilder<'_> {
        ChannelBuilder::new(self, topic)
    }

    /// Run `mutate` against the current record under the store lock, then
    /// publish the resulting change once the lock is released.
    fn commit<F>(
        &self,
        collection: &str,
        key: &str,
        mutate: F,
    ) -> Result<Option<Document>, RealtimeError>
    where
        F: FnOnce(Option<&Document>) -> Result<Option<Value>, RealtimeError>,
    {
        let (payload, stored) = {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let coll = state.collections.entry(collection.to_string()).or_default();
            let previous = coll.documents.get(key).cloned();
            let next = mutate(previous.as_ref())?;

            let (event, stored) = match (&previous, next) {
                (None, None) => return Err(RealtimeError::not_found(collection, key)),
                (Some(_), None) => {
                    coll.documents.remove(key);
                    (ChannelEvent::Delete, None)
                }
                (prev, Some(data)) => {
                    let (position, version, event) = match prev {
                        Some(doc) => (doc.position, doc.version + 1, ChannelEvent::Update),
                        None => {
                            let position = coll.next_position;
                            coll.next_position += 1;
                            (position, 1, ChannelEvent::Insert)
                        }
                    };
                    let doc = Document {
                        key: key.to_string(),
                        data,
                        position,
                        version,
                    };
                    coll.documents.insert(key.to_string(), doc.clone());
                    (event, Some(doc))
                }
            };

            state.commit_sequence += 1;
            let payload = Payload {
                collection: collection.to_string(),
                key: key.to_string(),
                event_type: event,
                record: stored.as_ref().map(|d| d.data.clone()),
                old_record: previous.map(|d| d.data),
                commit_sequence: state.commit_sequence,
                commit_timestamp: Utc::now().to_rfc3339(),
            };
            (payload, stored)
        };

        debug!(
            collection = %payload.collection,
            key = %payload.key,
            event = %payload.event_type,
            sequence = payload.commit_sequence,
            "committed"
        );
        self.subscribers.dispatch(&payload);
        Ok(stored)
    }

    fn read(&self, collection: &str, key: &str) -> Option<Document> {
        let state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state
            .collections
            .get(collection)
            .and_then(|c| c.documents.get(key))
            .cloned()
    }
}

fn merge(
    collection: &str,
    key: &str,
    current: Option<&Document>,
    fields: Map<String, Value>,
) -> Result<Option<Value>, RealtimeError> {
    let doc = current.ok_or_else(|| RealtimeError::not_found(collection, key))?;
    let mut data = doc.data.clone();
    let object = data
        .as_object_mut()
        .ok_or_else(|| RealtimeError::invalid_field(key, "record is not an object"))?;
    for (field, value) in fields {
        object.insert(field, value);
    }
    Ok(Some(data))
}

fn written(
    result: Option<Document>,
    collection: &str,
    key: &str,
) -> Result<Document, RealtimeError> {
    result.ok_or_else(|| RealtimeError::not_found(collection, key))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, RealtimeError> {
        Ok(self.read(collection, key))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, RealtimeError> {
        let state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut documents: Vec<Document> = state
            .collections
            .get(collection)
            .map(|c| c.documents.values().cloned().collect())
            .unwrap_or_default();
        documents.sort_by_key(|d| d.position);
        Ok(documents)
    }

    async fn set(
        &self,
        collection: &str,
        key: &str,
        data: Value,
    ) -> Result<Document, RealtimeError> {
        let result = self.commit(collection, key, |_| Ok(Some(data)))?;
        written(result, collection, key)
    }

    async fn update(
        &self,
        collection: &str,
        key: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, RealtimeError> {
        let result = self.commit(collection, key, |current| {
            merge(collection, key, current, fields)
        })?;
        written(result, collection, key)
    }

    async fn update_where(
        &self,
        collection: &str,
        key: &str,
        precondition: &DatabaseFilter,
        fields: Map<String, Value>,
    ) -> Result<Document, RealtimeError> {
        let result = self.commit(collection, key, |current| {
            let doc = current.ok_or_else(|| RealtimeError::not_found(collection, key))?;
            if !precondition.matches(&doc.data) {
                warn!(%collection, %key, %precondition, "guarded update rejected");
                return Err(RealtimeError::PreconditionFailed {
                    collection: collection.to_string(),
                    key: key.to_string(),
                    reason: format!("expected {}", precondition),
                });
            }
            merge(collection, key, current, fields)
        })?;
        written(result, collection, key)
    }

    async fn array_append(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        item: Value,
        sequence_field: Option<&str>,
    ) -> Result<Document, RealtimeError> {
        let result = self.commit(collection, key, |current| {
            let doc = current.ok_or_else(|| RealtimeError::not_found(collection, key))?;
            let mut data = doc.data.clone();
            let object = data
                .as_object_mut()
                .ok_or_else(|| RealtimeError::invalid_field(key, "record is not an object"))?;
            let slot = object.entry(field.to_string()).or_insert(Value::Null);
            if slot.is_null() {
                *slot = Value::Array(Vec::new());
            }
            let array = slot
                .as_array_mut()
                .ok_or_else(|| RealtimeError::invalid_field(field, "not an array"))?;

            let mut item = item;
            if let Some(seq_field) = sequence_field {
                let highest = array
                    .iter()
                    .filter_map(|v| v.get(seq_field).and_then(Value::as_u64))
                    .max()
                    .unwrap_or(0);
                let next = highest.max(array.len() as u64) + 1;
                item.as_object_mut()
                    .ok_or_else(|| {
                        RealtimeError::invalid_field(field, "sequenced items must be objects")
                    })?
                    .insert(seq_field.to_string(), Value::from(next));
            }
            array.push(item);
            Ok(Some(data))
        })?;
        written(result, collection, key)
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), RealtimeError> {
        self.commit(collection, key, |current| match current {
            Some(_) => Ok(None),
            None => Err(RealtimeError::not_found(collection, key)),
        })?;
        Ok(())
    }

    fn subscribe(
        &self,
        changes: DatabaseChanges,
        callback: ChangeCallback,
    ) -> Result<Subscription, RealtimeError> {
        Ok(self.subscribers.register(changes, callback))
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
