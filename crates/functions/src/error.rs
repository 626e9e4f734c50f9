use std::time::Duration;
use thiserror::Error;

/// Errors raised while calling the hosted functions.
#[derive(Debug, Error)]
pub enum FunctionsError {
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Function error ({status}): {message}")]
    FunctionError { status: u16, message: String },

    #[error("Function call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Service unavailable after {attempts} attempt(s): {last_error}")]
    ServiceUnavailable { attempts: u32, last_error: String },

    #[error("Missing document: {0}")]
    MissingDocument(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String, body: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl FunctionsError {
    pub fn malformed(reason: impl Into<String>, body: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
            body: body.into(),
        }
    }

    /// Transient failures worth another attempt: timeouts, connection
    /// problems, 5xx and 429 answers.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::RequestError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::FunctionError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FunctionsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        let server = FunctionsError::FunctionError {
            status: 503,
            message: "down".into(),
        };
        let throttled = FunctionsError::FunctionError {
            status: 429,
            message: "slow down".into(),
        };
        let rejected = FunctionsError::FunctionError {
            status: 400,
            message: "bad".into(),
        };
        assert!(server.is_retryable());
        assert!(throttled.is_retryable());
        assert!(!rejected.is_retryable());
        assert!(FunctionsError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!FunctionsError::malformed("not json", "<html>").is_retryable());
        assert!(!FunctionsError::MissingDocument("pedimento".into()).is_retryable());
    }
}
