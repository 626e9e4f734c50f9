//! Error handling for the review workflow

use crate::models::NotificationStatus;
use aduana_review_functions::FunctionsError;
use aduana_review_realtime::RealtimeError;
use std::fmt;
use thiserror::Error;

/// Unified error type of the workflow
#[derive(Error, Debug)]
pub enum Error {
    /// Collection store failures other than guarded-update conflicts
    #[error("Store error: {0}")]
    Store(#[from] RealtimeError),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Missing or invalid user input; never retried
    #[error("{0}")]
    ValidationInput(String),

    /// The AI service failed or timed out
    #[error("Service communication error: {0}")]
    ServiceCommunication(String),

    /// The AI service answered with content that does not fit the schema
    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String, body: String },

    #[error("Invalid transition of {id}: {from} -> {to}")]
    InvalidStateTransition {
        id: String,
        from: NotificationStatus,
        to: NotificationStatus,
    },

    /// The request is not in the status the operation needs
    #[error("Request {id} is {status}")]
    StateConflict { id: String, status: NotificationStatus },

    #[error("{email} already has an active support session")]
    ActiveSessionExists { email: String },

    #[error("{email} has no active support session")]
    NoActiveSupportSession { email: String },

    #[error("Request {0} carries no audit data")]
    MissingAuditData(String),

    #[error("Notification not found: {0}")]
    NotificationNotFound(String),

    #[error("Finding {index} out of range ({len} findings)")]
    FindingOutOfRange { index: usize, len: usize },

    #[error("No report matches {0}")]
    ReportNotFound(String),

    #[error("{matches} reports match {target}")]
    AmbiguousReport { target: String, matches: usize },

    #[error("Credenciales incorrectas")]
    InvalidCredentials,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Protected account: {0}")]
    ProtectedAccount(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn validation<T: fmt::Display>(msg: T) -> Self {
        Error::ValidationInput(msg.to_string())
    }

    pub fn permission<T: fmt::Display>(msg: T) -> Self {
        Error::PermissionDenied(msg.to_string())
    }

    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Whether the error comes from acting on a request in the wrong status.
    pub fn is_state_conflict(&self) -> bool {
        matches!(
            self,
            Error::InvalidStateTransition { .. }
                | Error::StateConflict { .. }
                | Error::ActiveSessionExists { .. }
                | Error::NoActiveSupportSession { .. }
        )
    }
}

impl From<FunctionsError> for Error {
    fn from(err: FunctionsError) -> Self {
        match err {
            FunctionsError::MissingDocument(msg) | FunctionsError::InvalidInput(msg) => {
                Error::ValidationInput(msg)
            }
            FunctionsError::MalformedResponse { reason, body } => {
                Error::MalformedResponse { reason, body }
            }
            other => Error::ServiceCommunication(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
