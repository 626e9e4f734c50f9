//! Result schema of the audit function.
//!
//! The hosted prompt has shipped two schemas over time: an English one
//! (`pedimentoNumber`, `validations[].field`, ...) and a Spanish one
//! (`numero_pedimento`, `statusGeneral`, `validations[].campo`, ...).
//! Deserialization accepts both; serialization always writes the English
//! camelCase form.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Pedimento number used when the analysis could not extract one.
pub const UNKNOWN_PEDIMENTO: &str = "AUDITORIA_EXTERNAL";

/// Verdict of a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FindingStatus {
    Error,
    Correct,
}

impl FindingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Correct => "correct",
        }
    }

    /// The opposite verdict.
    pub fn flipped(self) -> Self {
        match self {
            Self::Error => Self::Correct,
            Self::Correct => Self::Error,
        }
    }
}

impl std::fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FindingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "correct" => Ok(Self::Correct),
            other => Err(format!("unknown finding status '{}'", other)),
        }
    }
}

impl Serialize for FindingStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FindingStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A field-level finding of an audit (a "PedimentoError" record).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    #[serde(default, alias = "campo", deserialize_with = "text")]
    pub field: String,
    #[serde(
        default,
        deserialize_with = "optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub partida: Option<String>,
    /// Observation shown to the user.
    #[serde(default, alias = "observacion", deserialize_with = "text")]
    pub error: String,
    #[serde(
        default,
        alias = "valorCorrecto",
        alias = "value",
        deserialize_with = "text"
    )]
    pub correct_value: String,
    pub status: FindingStatus,
    #[serde(
        default,
        alias = "riesgo",
        deserialize_with = "optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub potential_fine: Option<String>,
    #[serde(
        default,
        alias = "ahorro",
        deserialize_with = "optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub savings: Option<String>,
    #[serde(default)]
    pub is_manually_corrected: bool,
}

impl Finding {
    pub fn new(field: &str, status: FindingStatus) -> Self {
        Self {
            field: field.to_string(),
            partida: None,
            error: String::new(),
            correct_value: String::new(),
            status,
            potential_fine: None,
            savings: None,
            is_manually_corrected: false,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == FindingStatus::Error
    }
}

/// Structured answer of the audit function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawAnalysis")]
pub struct AnalysisResult {
    pub pedimento_number: String,
    pub validations: Vec<Finding>,
    pub is_conforme: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_savings: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_risk: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    #[serde(default, alias = "numero_pedimento", deserialize_with = "optional_text")]
    pedimento_number: Option<String>,
    #[serde(default)]
    validations: Option<Vec<Finding>>,
    #[serde(default)]
    is_conforme: Option<bool>,
    #[serde(default)]
    status_general: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    recommendations: Option<String>,
    #[serde(default, alias = "ahorroPotencial", deserialize_with = "optional_text")]
    total_savings: Option<String>,
    #[serde(default, alias = "riesgoTotal", deserialize_with = "optional_text")]
    total_risk: Option<String>,
}

impl From<RawAnalysis> for AnalysisResult {
    fn from(raw: RawAnalysis) -> Self {
        let validations = raw.validations.unwrap_or_default();
        // An explicit boolean wins over the textual verdict; with neither,
        // the findings decide.
        let is_conforme = match (raw.is_conforme, raw.status_general) {
            (Some(flag), _) => flag,
            (None, Some(status)) => status.trim().eq_ignore_ascii_case("CONFORME"),
            (None, None) => validations.iter().all(|v| !v.is_error()),
        };
        let pedimento_number = raw
            .pedimento_number
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_PEDIMENTO.to_string());

        Self {
            pedimento_number,
            validations,
            is_conforme,
            recommendations: raw.recommendations,
            total_savings: raw.total_savings,
            total_risk: raw.total_risk,
        }
    }
}

/// Speaker of a turn sent to the expert chat function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpertRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

/// One turn of conversation history in the hosted chat format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertTurn {
    pub role: ExpertRole,
    pub parts: Vec<TextPart>,
}

impl ExpertTurn {
    pub fn new(role: ExpertRole, text: &str) -> Self {
        Self {
            role,
            parts: vec![TextPart {
                text: text.to_string(),
            }],
        }
    }

    pub fn user(text: &str) -> Self {
        Self::new(ExpertRole::User, text)
    }

    pub fn model(text: &str) -> Self {
        Self::new(ExpertRole::Model, text)
    }
}

// The model is loose about scalar types: amounts and partidas arrive as
// strings or numbers.
fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    optional_text(deserializer).map(Option::unwrap_or_default)
}
