use serde_json::Value;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Numeric,
    Text,
}

/// A named field of a DiveCloud JSON payload and the type the API gives it.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

pub const TEST_ID: Field = Field {
    name: "test_id",
    kind: FieldKind::Numeric,
};

pub const STATUS: Field = Field {
    name: "status",
    kind: FieldKind::Text,
};

pub const OUTCOME: Field = Field {
    name: "outcome",
    kind: FieldKind::Text,
};

/// Extract `field` from a JSON object as a string.
///
/// Numeric fields come back in decimal form. A string holding a plain integer
/// is accepted for numeric fields too.
pub fn extract_field(json: &str, field: Field) -> Result<String> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| AppError::MalformedPayload(format!("invalid JSON: {e}")))?;

    let object = value
        .as_object()
        .ok_or_else(|| AppError::MalformedPayload("expected a JSON object".to_string()))?;

    let raw = object
        .get(field.name)
        .ok_or_else(|| AppError::MalformedPayload(format!("missing field '{}'", field.name)))?;

    match (field.kind, raw) {
        (FieldKind::Numeric, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        (FieldKind::Numeric, Value::String(s)) if s.trim().parse::<i64>().is_ok() => {
            Ok(s.trim().to_string())
        }
        (FieldKind::Text, Value::String(s)) => Ok(s.clone()),
        (kind, other) => Err(AppError::MalformedPayload(format!(
            "field '{}' is not {}: {other}",
            field.name,
            match kind {
                FieldKind::Numeric => "an integer",
                FieldKind::Text => "a string",
            }
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_numeric_field_in_decimal_form() {
        assert_eq!(extract_field(r#"{"test_id": 42}"#, TEST_ID).unwrap(), "42");
    }

    #[test]
    fn test_numeric_field_accepts_integer_string() {
        assert_eq!(extract_field(r#"{"test_id": "7"}"#, TEST_ID).unwrap(), "7");
    }

    #[test]
    fn test_text_field_returns_raw_value() {
        let json = r#"{"status": "Emailed", "outcome": "Pass"}"#;
        assert_eq!(extract_field(json, STATUS).unwrap(), "Emailed");
        assert_eq!(extract_field(json, OUTCOME).unwrap(), "Pass");
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = extract_field("not json", OUTCOME).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedPayload);
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let err = extract_field(r#"{"status": "Running"}"#, OUTCOME).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedPayload);
        assert!(err.to_string().contains("outcome"));
    }

    #[test]
    fn test_wrong_type_is_malformed() {
        assert!(extract_field(r#"{"test_id": 4.5}"#, TEST_ID).is_err());
        assert!(extract_field(r#"{"test_id": "abc"}"#, TEST_ID).is_err());
        assert!(extract_field(r#"{"outcome": true}"#, OUTCOME).is_err());
        assert!(extract_field(r#"["outcome"]"#, OUTCOME).is_err());
    }
}
