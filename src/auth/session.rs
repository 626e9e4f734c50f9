//! Session cookie handling

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// Name of the cookie holding the signed-in email.
pub const SESSION_COOKIE_NAME: &str = "space_session_user";

/// Cookie that lets a browser restore a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    /// The signed-in user's email
    pub email: String,

    /// Lifetime of the cookie
    pub max_age: Duration,

    /// When the cookie was issued
    pub issued_at: DateTime<Utc>,
}

impl SessionCookie {
    pub fn new(email: &str, max_age: Duration) -> Self {
        Self {
            email: email.to_string(),
            max_age,
            issued_at: Utc::now(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        let lifetime =
            ChronoDuration::from_std(self.max_age).unwrap_or_else(|_| ChronoDuration::days(1));
        self.issued_at + lifetime
    }

    /// Check if the cookie has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at()
    }

    /// `Set-Cookie` value issuing the cookie.
    pub fn header_value(&self) -> String {
        format!(
            "{}={}; Max-Age={}; Path=/; SameSite=Strict",
            SESSION_COOKIE_NAME,
            self.email,
            self.max_age.as_secs()
        )
    }

    /// `Set-Cookie` value removing the cookie.
    pub fn clear() -> String {
        format!("{}=; Max-Age=0; Path=/; SameSite=Strict", SESSION_COOKIE_NAME)
    }

    /// Extract the session email from a `Cookie` request header.
    pub fn parse(cookie_header: &str) -> Option<String> {
        cookie_header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| name.trim() == SESSION_COOKIE_NAME)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}
