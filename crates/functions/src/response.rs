use crate::error::{FunctionsError, Result};
use crate::types::AnalysisResult;
use serde_json::Value;

const AUDIT_KEYS: [&str; 5] = [
    "validations",
    "pedimentoNumber",
    "numero_pedimento",
    "isConforme",
    "statusGeneral",
];

/// Extract the JSON object from model output that may carry prose or
/// markdown fences around it.
pub fn clean_json_response(text: &str) -> String {
    let mut cleaned = text.trim();
    if let (Some(first), Some(last)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if first < last {
            cleaned = &cleaned[first..=last];
        }
    }
    let cleaned = cleaned.trim();
    let cleaned = match cleaned.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("```json") => &cleaned[7..],
        _ => cleaned,
    };
    cleaned.strip_suffix("```").unwrap_or(cleaned).trim().to_string()
}

/// Turn the `result` of the audit function into an [`AnalysisResult`].
///
/// Accepts the object itself, the object wrapped in `{"response": ...}`, or
/// a string holding the JSON.
pub fn parse_analysis(result: Value) -> Result<AnalysisResult> {
    parse_level(result, true)
}

fn parse_level(result: Value, unwrap: bool) -> Result<AnalysisResult> {
    match result {
        Value::String(text) => {
            let cleaned = clean_json_response(&text);
            let value: Value = serde_json::from_str(&cleaned)
                .map_err(|e| FunctionsError::malformed(format!("not JSON: {}", e), text.clone()))?;
            match value {
                Value::Object(_) => parse_level(value, unwrap),
                _ => Err(FunctionsError::malformed("expected a JSON object", text)),
            }
        }
        Value::Object(mut map) => {
            if !AUDIT_KEYS.iter().any(|k| map.contains_key(*k)) {
                if unwrap {
                    if let Some(inner) = map.remove("response") {
                        return parse_level(inner, false);
                    }
                }
                return Err(FunctionsError::malformed(
                    "no audit fields in response",
                    Value::Object(map).to_string(),
                ));
            }
            let value = Value::Object(map);
            let body = value.to_string();
            serde_json::from_value(value)
                .map_err(|e| FunctionsError::malformed(e.to_string(), body))
        }
        other => Err(FunctionsError::malformed(
            "unexpected result type",
            other.to_string(),
        )),
    }
}
