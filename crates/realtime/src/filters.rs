use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

/// Column condition applied to change feeds and guarded updates.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseFilter {
    /// Top-level field of the record
    pub column: String,
    pub operator: FilterOperator,
    pub value: Value,
}

/// Comparison operator of a [`DatabaseFilter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Field equals one of the values of an array
    In,
}

impl std::fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::In => "in",
        };
        write!(f, "{}", s)
    }
}

impl std::fmt::Display for DatabaseFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}.{}", self.column, self.operator, self.value)
    }
}

impl DatabaseFilter {
    pub fn new<T: Into<Value>>(column: &str, operator: FilterOperator, value: T) -> Self {
        Self {
            column: column.to_string(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq<T: Into<Value>>(column: &str, value: T) -> Self {
        Self::new(column, FilterOperator::Eq, value)
    }

    /// Evaluate the filter against a record. Missing fields compare as `null`.
    pub fn matches(&self, record: &Value) -> bool {
        let field = record.get(&self.column).unwrap_or(&Value::Null);
        match self.operator {
            FilterOperator::Eq => field == &self.value,
            FilterOperator::Neq => field != &self.value,
            FilterOperator::Gt => compare(field, &self.value) == Some(Ordering::Greater),
            FilterOperator::Gte => matches!(
                compare(field, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOperator::Lt => compare(field, &self.value) == Some(Ordering::Less),
            FilterOperator::Lte => matches!(
                compare(field, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOperator::In => self
                .value
                .as_array()
                .map(|values| values.iter().any(|v| v == field))
                .unwrap_or(false),
        }
    }
}

// Numbers compare numerically, strings lexically; anything else is unordered.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eq_and_neq() {
        let record = json!({ "status": "pending", "userEmail": "ana@x.com" });
        assert!(DatabaseFilter::eq("status", "pending").matches(&record));
        assert!(!DatabaseFilter::eq("status", "resolved").matches(&record));
        assert!(DatabaseFilter::new("status", FilterOperator::Neq, "resolved").matches(&record));
    }

    #[test]
    fn missing_field_is_null() {
        let record = json!({ "status": "pending" });
        assert!(DatabaseFilter::eq("auditData", Value::Null).matches(&record));
        assert!(!DatabaseFilter::eq("auditData", "x").matches(&record));
    }

    #[test]
    fn ordering_operators() {
        let record = json!({ "count": 3, "date": "2026-10-01" });
        assert!(DatabaseFilter::new("count", FilterOperator::Gt, 2).matches(&record));
        assert!(DatabaseFilter::new("count", FilterOperator::Gte, 3).matches(&record));
        assert!(!DatabaseFilter::new("count", FilterOperator::Lt, 3).matches(&record));
        assert!(DatabaseFilter::new("date", FilterOperator::Lte, "2026-10-31").matches(&record));
        // mixed types never order
        assert!(!DatabaseFilter::new("count", FilterOperator::Gt, "1").matches(&record));
    }

    #[test]
    fn in_values() {
        let record = json!({ "status": "in_progress" });
        let filter = DatabaseFilter::new(
            "status",
            FilterOperator::In,
            json!(["pending", "in_progress"]),
        );
        assert!(filter.matches(&record));
        assert_eq!(filter.to_string(), r#"status=in.["pending","in_progress"]"#);
    }
}
