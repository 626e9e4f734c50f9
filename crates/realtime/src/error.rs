use thiserror::Error;

/// Errors raised by a [`crate::DocumentStore`].
#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("Document not found: {collection}/{key}")]
    NotFound { collection: String, key: String },

    #[error("Precondition failed on {collection}/{key}: {reason}")]
    PreconditionFailed {
        collection: String,
        key: String,
        reason: String,
    },

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Subscription error: {0}")]
    SubscriptionError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl RealtimeError {
    pub fn not_found(collection: &str, key: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }

    pub fn invalid_field(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
