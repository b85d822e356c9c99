//! Response body schema validation

use jsonschema::JSONSchema;
use serde_json::Value;

/// Outcome of validating a body against a schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validation {
    pub success: bool,
    pub errors: Vec<String>,
}

impl Validation {
    pub fn ok() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            errors,
        }
    }
}

/// Validates data against a schema; the engine never interprets schemas.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, data: &Value, schema: &Value) -> Validation;
}

/// JSON Schema validator
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaValidator;

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, data: &Value, schema: &Value) -> Validation {
        let compiled = match JSONSchema::compile(schema) {
            Ok(compiled) => compiled,
            Err(err) => return Validation::failed(vec![format!("invalid schema: {err}")]),
        };
        let result = match compiled.validate(data) {
            Ok(()) => Validation::ok(),
            Err(errors) => Validation::failed(errors.map(|e| e.to_string()).collect()),
        };
        result
    }
}

/// Rejects every schema; used when no validator is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSchemaValidator;

impl SchemaValidator for NoSchemaValidator {
    fn validate(&self, _data: &Value, _schema: &Value) -> Validation {
        Validation::failed(vec!["no schema validator configured".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_schema_accepts_valid_body() {
        let schema = json!({
            "type": "object",
            "required": ["id"],
            "properties": {"id": {"type": "integer"}}
        });
        let result = JsonSchemaValidator.validate(&json!({"id": 7}), &schema);
        assert!(result.success);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_json_schema_reports_errors() {
        let schema = json!({"type": "object", "required": ["id"]});
        let result = JsonSchemaValidator.validate(&json!({"title": "x"}), &schema);
        assert!(!result.success);
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn test_no_validator_rejects() {
        let result = NoSchemaValidator.validate(&json!({}), &json!({}));
        assert!(!result.success);
    }
}
