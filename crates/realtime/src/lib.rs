//! Realtime document collections for the pedimento review workflow.
//!
//! Collections hold JSON records keyed by id. Every committed write is
//! published to matching subscribers together with a store-wide commit
//! sequence, so replicas can discard stale payloads.

mod channel;
mod error;
mod filters;
mod memory;
mod message;
mod store;

pub use channel::{
    ChangeCallback, ChannelBuilder, DatabaseChanges, SubscriberRegistry, Subscription,
};
pub use error::RealtimeError;
pub use filters::{DatabaseFilter, FilterOperator};
pub use memory::MemoryStore;
pub use message::{ChannelEvent, Document, Payload};
pub use store::DocumentStore;
