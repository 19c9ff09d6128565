//! Structural validation of tool I/O against a JSON-schema-like subset.
//!
//! Supported vocabulary: `type` (object, array, string, number, integer,
//! boolean), `required`, `properties`, `items`. Anything else in a schema
//! document is ignored. This is deliberately not a JSON Schema engine —
//! the subset covers every contract the kernel needs to enforce.

use serde_json::Value;

/// Result of validating a value against a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    /// Whether the value satisfied the schema.
    pub valid: bool,
    /// Human-readable violations, empty when valid.
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn ok() -> Self {
        Self {
            valid: true,
            errors: vec![],
        }
    }

    fn fail(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validate a value against a structural schema.
pub fn validate(value: &Value, schema: &Value) -> ValidationReport {
    let mut errors = Vec::new();
    validate_inner(value, schema, &mut errors);
    if errors.is_empty() {
        ValidationReport::ok()
    } else {
        ValidationReport::fail(errors)
    }
}

fn validate_inner(value: &Value, schema: &Value, errors: &mut Vec<String>) {
    let schema_type = schema.get("type").and_then(Value::as_str);
    match schema_type {
        Some("object") => {
            let Some(map) = value.as_object() else {
                errors.push(format!("Expected object, got {}", type_name(value)));
                return;
            };
            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for field in required.iter().filter_map(Value::as_str) {
                    if !map.contains_key(field) {
                        errors.push(format!("Missing required field: '{field}'"));
                    }
                }
            }
            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                for (prop_name, prop_schema) in properties {
                    if let Some(prop_value) = map.get(prop_name) {
                        let before = errors.len();
                        validate_inner(prop_value, prop_schema, errors);
                        for err in errors.iter_mut().skip(before) {
                            *err = format!("{prop_name}: {err}");
                        }
                    }
                }
            }
        }
        Some("array") => {
            let Some(items) = value.as_array() else {
                errors.push(format!("Expected array, got {}", type_name(value)));
                return;
            };
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    let before = errors.len();
                    validate_inner(item, item_schema, errors);
                    for err in errors.iter_mut().skip(before) {
                        *err = format!("[{i}]: {err}");
                    }
                }
            }
        }
        Some("string") => {
            if !value.is_string() {
                errors.push(format!("Expected string, got {}", type_name(value)));
            }
        }
        Some("number") => {
            if !value.is_number() {
                errors.push(format!("Expected number, got {}", type_name(value)));
            }
        }
        Some("integer") => {
            let is_integer = value
                .as_number()
                .map(|n| n.is_i64() || n.is_u64())
                .unwrap_or(false);
            if !is_integer {
                errors.push(format!("Expected integer, got {}", type_name(value)));
            }
        }
        Some("boolean") => {
            if !value.is_boolean() {
                errors.push(format!("Expected boolean, got {}", type_name(value)));
            }
        }
        // No or unknown type constraint: accept.
        _ => {}
    }
}

/// Validate raw agent output text against a schema.
///
/// Output that parses as JSON is validated structurally. Output that is
/// not JSON passes only against a `{"type": "string"}` schema.
pub fn validate_text(output: &str, schema: &Value) -> ValidationReport {
    match serde_json::from_str::<Value>(output) {
        Ok(value) => validate(&value, schema),
        Err(_) => {
            if schema.get("type").and_then(Value::as_str) == Some("string") {
                ValidationReport::ok()
            } else {
                ValidationReport::fail(vec!["Output is not valid JSON".into()])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_with_required_fields() {
        let schema = json!({
            "type": "object",
            "required": ["name", "value"],
            "properties": {
                "name": {"type": "string"},
                "value": {"type": "number"}
            }
        });
        assert!(validate(&json!({"name": "x", "value": 1.5}), &schema).valid);

        let report = validate(&json!({"name": "x"}), &schema);
        assert!(!report.valid);
        assert_eq!(report.errors, vec!["Missing required field: 'value'"]);
    }

    #[test]
    fn property_type_mismatch_is_prefixed() {
        let schema = json!({
            "type": "object",
            "properties": {"count": {"type": "integer"}}
        });
        let report = validate(&json!({"count": "three"}), &schema);
        assert_eq!(report.errors, vec!["count: Expected integer, got string"]);
    }

    #[test]
    fn nested_objects_validate_recursively() {
        let schema = json!({
            "type": "object",
            "properties": {
                "inner": {
                    "type": "object",
                    "required": ["flag"],
                    "properties": {"flag": {"type": "boolean"}}
                }
            }
        });
        assert!(validate(&json!({"inner": {"flag": true}}), &schema).valid);
        let report = validate(&json!({"inner": {}}), &schema);
        assert_eq!(report.errors, vec!["inner: Missing required field: 'flag'"]);
    }

    #[test]
    fn array_items_report_index() {
        let schema = json!({"type": "array", "items": {"type": "integer"}});
        assert!(validate(&json!([1, 2, 3]), &schema).valid);
        let report = validate(&json!([1, "x", 3]), &schema);
        assert_eq!(report.errors, vec!["[1]: Expected integer, got string"]);
    }

    #[test]
    fn integer_rejects_float_accepts_int() {
        let schema = json!({"type": "integer"});
        assert!(validate(&json!(3), &schema).valid);
        assert!(!validate(&json!(3.5), &schema).valid);
        assert!(!validate(&json!(true), &schema).valid);
    }

    #[test]
    fn number_accepts_int_and_float() {
        let schema = json!({"type": "number"});
        assert!(validate(&json!(3), &schema).valid);
        assert!(validate(&json!(3.5), &schema).valid);
        assert!(!validate(&json!("3"), &schema).valid);
    }

    #[test]
    fn missing_type_accepts_anything() {
        assert!(validate(&json!({"free": "form"}), &json!({})).valid);
    }

    #[test]
    fn text_validation_parses_json() {
        let schema = json!({"type": "object", "required": ["ok"]});
        assert!(validate_text(r#"{"ok": true}"#, &schema).valid);
        assert!(!validate_text(r#"{"other": 1}"#, &schema).valid);
    }

    #[test]
    fn plain_text_only_passes_string_schema() {
        assert!(validate_text("just words", &json!({"type": "string"})).valid);
        let report = validate_text("just words", &json!({"type": "object"}));
        assert_eq!(report.errors, vec!["Output is not valid JSON"]);
    }
}
