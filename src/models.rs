//! Records kept in the persisted collections.
//!
//! Field names follow the camelCase layout of the stored documents.

use aduana_review_functions::AnalysisResult;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub use aduana_review_functions::{Finding, FindingStatus};

/// A field-level finding as stored in reports and snapshots.
pub type PedimentoError = Finding;

pub const USERS: &str = "users";
pub const REPORTS: &str = "reports";
pub const NOTIFICATIONS: &str = "notifications";

/// A registered reviewer. Keyed by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: String,
    pub email: String,
    pub password: String,
    pub is_super_user: bool,
}

impl User {
    /// First word of the display name, used in greetings.
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

/// One completed audit in the global history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionReport {
    pub id: String,
    pub pedimento_number: String,
    pub user_name: String,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub date: DateTime<Utc>,
    pub errors: Vec<PedimentoError>,
    pub is_conforme: bool,
    /// Verdict forced to CONFORME by an administrator.
    #[serde(default)]
    pub client_override: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_savings: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_risk: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Position in the request's history, assigned by the store.
    #[serde(default)]
    pub sequence: u64,
}

impl ChatMessage {
    pub fn new(role: ChatRole, text: &str) -> Self {
        Self {
            role,
            text: text.to_string(),
            timestamp: Utc::now(),
            sequence: 0,
        }
    }
}

/// Lifecycle of a support request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    InProgress,
    Resolved,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
        }
    }

    /// The only status this one may advance to.
    pub fn next(&self) -> Option<NotificationStatus> {
        match self {
            Self::Pending => Some(Self::InProgress),
            Self::InProgress => Some(Self::Resolved),
            Self::Resolved => None,
        }
    }

    pub fn can_transition_to(&self, to: NotificationStatus) -> bool {
        self.next() == Some(to)
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit result attached to a support request so an administrator can
/// review and correct it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSnapshot {
    pub pedimento_number: String,
    #[serde(default)]
    pub validations: Vec<PedimentoError>,
    pub is_conforme: bool,
    #[serde(default)]
    pub client_override: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_savings: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_risk: Option<String>,
    /// History entry produced by the run this snapshot comes from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
}

impl AuditSnapshot {
    pub fn from_analysis(result: AnalysisResult, report_id: Option<String>) -> Self {
        Self {
            pedimento_number: result.pedimento_number,
            validations: result.validations,
            is_conforme: result.is_conforme,
            client_override: false,
            recommendations: result.recommendations,
            total_savings: result.total_savings,
            total_risk: result.total_risk,
            report_id,
        }
    }
}

/// A support request and its conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppNotification {
    pub id: String,
    pub user_email: String,
    pub user_name: String,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub status: NotificationStatus,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_data: Option<AuditSnapshot>,
}

// The web app stores dates as ISO strings, epoch milliseconds or
// `{seconds, nanoseconds}` timestamp objects.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .ok(),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64);
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0);
            seconds.and_then(|s| Utc.timestamp_opt(s, nanos).single())
        }
        _ => None,
    };
    parsed.ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp {}", value)))
}

/// Top-level fields of a JSON object, for partial updates.
pub(crate) fn fields(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}
