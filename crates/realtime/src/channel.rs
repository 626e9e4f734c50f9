use crate::error::RealtimeError;
use crate::filters::{DatabaseFilter, FilterOperator};
use crate::message::{ChannelEvent, Payload};
use crate::store::DocumentStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use tracing::{debug, trace};

/// Callback invoked for every matching change.
pub type ChangeCallback = Arc<dyn Fn(Payload) + Send + Sync>;

/// Which changes of a collection a subscription wants to see.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseChanges {
    collection: String,
    events: Vec<ChannelEvent>,
    filter: Vec<DatabaseFilter>,
}

impl DatabaseChanges {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            events: Vec::new(),
            filter: Vec::new(),
        }
    }

    /// Restrict to an event kind. Without any event every change is delivered.
    pub fn event(mut self, event: ChannelEvent) -> Self {
        if !self.events.contains(&event) {
            self.events.push(event);
        }
        self
    }

    pub fn filter(mut self, filter: DatabaseFilter) -> Self {
        self.filter.push(filter);
        self
    }

    pub fn eq<T: Into<serde_json::Value>>(self, column: &str, value: T) -> Self {
        self.filter(DatabaseFilter::new(column, FilterOperator::Eq, value))
    }

    pub fn neq<T: Into<serde_json::Value>>(self, column: &str, value: T) -> Self {
        self.filter(DatabaseFilter::new(column, FilterOperator::Neq, value))
    }

    pub fn in_values<T: Into<serde_json::Value>>(self, column: &str, values: Vec<T>) -> Self {
        let values = values
            .into_iter()
            .map(|v| v.into())
            .collect::<Vec<serde_json::Value>>();
        self.filter(DatabaseFilter::new(column, FilterOperator::In, values))
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// A change matches when either side of it satisfies every filter, so a
    /// record moving out of the filtered set is still reported once.
    pub fn matches(&self, payload: &Payload) -> bool {
        if payload.collection != self.collection {
            return false;
        }
        if !self.events.is_empty()
            && !self.events.iter().any(|e| e.accepts(payload.event_type))
        {
            return false;
        }
        if self.filter.is_empty() {
            return true;
        }
        let satisfies = |record: &serde_json::Value| self.filter.iter().all(|f| f.matches(record));
        payload.record.as_ref().is_some_and(|r| satisfies(r))
            || payload.old_record.as_ref().is_some_and(|r| satisfies(r))
    }
}

struct Registration {
    changes: DatabaseChanges,
    callback: ChangeCallback,
}

/// Live callbacks of a store, keyed by subscription id.
#[derive(Default)]
pub struct SubscriberRegistry {
    entries: RwLock<HashMap<String, Registration>>,
}

impl SubscriberRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a callback and hand back the guard that keeps it alive.
    pub fn register(
        self: &Arc<Self>,
        changes: DatabaseChanges,
        callback: ChangeCallback,
    ) -> Subscription {
        let id = uuid::Uuid::new_v4().to_string();
        debug!(subscription = %id, collection = %changes.collection, "registering subscription");
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id.clone(), Registration { changes, callback });
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a committed change. Callbacks run outside the registry lock so
    /// they may write back into the store.
    pub fn dispatch(&self, payload: &Payload) {
        let targets: Vec<ChangeCallback> = {
            let entries = self
                .entries
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            entries
                .values()
                .filter(|r| r.changes.matches(payload))
                .map(|r| r.callback.clone())
                .collect()
        };
        trace!(
            collection = %payload.collection,
            key = %payload.key,
            event = %payload.event_type,
            listeners = targets.len(),
            "dispatching change"
        );
        for callback in targets {
            (callback)(payload.clone());
        }
    }
}

/// Active subscription. Dropping it stops delivery.
pub struct Subscription {
    id: String,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Explicitly stop delivery; same as dropping.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(&self.id) {
                debug!(subscription = %self.id, "subscription released");
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Groups several listeners under one topic name.
pub struct ChannelBuilder<'a> {
    store: &'a dyn DocumentStore,
    topic: String,
    listeners: Vec<(DatabaseChanges, ChangeCallback)>,
}

impl<'a> ChannelBuilder<'a> {
    pub fn new(store: &'a dyn DocumentStore, topic: &str) -> Self {
        Self {
            store,
            topic: topic.to_string(),
            listeners: Vec::new(),
        }
    }

    pub fn on<F>(mut self, changes: DatabaseChanges, callback: F) -> Self
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        self.listeners.push((changes, Arc::new(callback)));
        self
    }

    pub fn subscribe(self) -> Result<Vec<Subscription>, RealtimeError> {
        if self.listeners.is_empty() {
            return Err(RealtimeError::SubscriptionError(format!(
                "channel '{}' has no listeners",
                self.topic
            )));
        }
        debug!(topic = %self.topic, listeners = self.listeners.len(), "joining channel");
        self.listeners
            .into_iter()
            .map(|(changes, callback)| self.store.subscribe(changes, callback))
            .collect()
    }
}
