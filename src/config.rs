//! Configuration of the review workflow

use crate::error::{Error, Result};
use aduana_review_functions::FunctionOptions;
use std::time::Duration;
use url::Url;

pub const FUNCTIONS_URL_VAR: &str = "ADUANA_FUNCTIONS_URL";
pub const API_KEY_VAR: &str = "ADUANA_API_KEY";

/// Where the hosted functions live.
#[derive(Debug, Clone)]
pub struct ReviewConfig {
    pub functions_url: Url,
    pub api_key: String,
}

impl ReviewConfig {
    pub fn new(functions_url: &str, api_key: &str) -> Result<Self> {
        Ok(Self {
            functions_url: Url::parse(functions_url)?,
            api_key: api_key.to_string(),
        })
    }

    /// Read `ADUANA_FUNCTIONS_URL` and `ADUANA_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var(FUNCTIONS_URL_VAR)
            .map_err(|_| Error::config(format!("{} is not set", FUNCTIONS_URL_VAR)))?;
        let key = std::env::var(API_KEY_VAR)
            .map_err(|_| Error::config(format!("{} is not set", API_KEY_VAR)))?;
        Self::new(&url, &key)
    }
}

/// The administrator account created on first start. It can be neither
/// deleted nor demoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedAdmin {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Default for SeedAdmin {
    fn default() -> Self {
        Self {
            name: "Marco de Avila".to_string(),
            email: "marco.deavila@spaceaduanas.com".to_string(),
            password: "3569".to_string(),
        }
    }
}

/// Tunables of the workflow
#[derive(Debug, Clone)]
pub struct ReviewOptions {
    /// Limit for one call to the AI service
    pub request_timeout: Duration,

    /// Retries after a transient AI failure
    pub max_retries: u32,

    /// First retry delay, doubled on each further retry
    pub retry_backoff: Duration,

    /// Lifetime of the session cookie
    pub session_max_age: Duration,

    /// Only addresses ending with this suffix can be registered
    pub email_domain: String,

    pub seed_admin: SeedAdmin,
}

impl Default for ReviewOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            session_max_age: Duration::from_secs(24 * 60 * 60),
            email_domain: "@spaceaduanas.com".to_string(),
            seed_admin: SeedAdmin::default(),
        }
    }
}

impl ReviewOptions {
    pub fn with_request_timeout(mut self, value: Duration) -> Self {
        self.request_timeout = value;
        self
    }

    pub fn with_max_retries(mut self, value: u32) -> Self {
        self.max_retries = value;
        self
    }

    pub fn with_retry_backoff(mut self, value: Duration) -> Self {
        self.retry_backoff = value;
        self
    }

    pub fn with_session_max_age(mut self, value: Duration) -> Self {
        self.session_max_age = value;
        self
    }

    pub fn with_email_domain(mut self, value: &str) -> Self {
        self.email_domain = value.to_string();
        self
    }

    pub fn with_seed_admin(mut self, value: SeedAdmin) -> Self {
        self.seed_admin = value;
        self
    }

    /// Call options for the functions client.
    pub fn function_options(&self) -> FunctionOptions {
        FunctionOptions::default()
            .with_timeout(self.request_timeout)
            .with_max_retries(self.max_retries)
            .with_retry_backoff(self.retry_backoff)
    }
}
