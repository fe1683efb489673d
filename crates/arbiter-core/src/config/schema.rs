//! JSON Schema validation for configuration documents.
//!
//! Every document is checked against `schema/config.schema.json` before it is
//! deserialized, so structural mistakes are reported with their JSON path.

use std::sync::OnceLock;
use thiserror::Error;

/// Embedded config schema (loaded at compile time).
const CONFIG_SCHEMA_JSON: &str = include_str!("../../../../schema/config.schema.json");

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from schema loading.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

fn get_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = match serde_json::from_str(CONFIG_SCHEMA_JSON) {
            Ok(v) => v,
            Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
        };

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    match result {
        Ok(v) => Ok(v),
        Err(e) => Err(SchemaError::LoadError(e.clone())),
    }
}

/// Validate a config JSON value against the schema.
///
/// Returns every violation as `"<message> at <path>"`.
pub fn validate_config_schema(config_json: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(config_json)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_passes_schema() {
        assert!(validate_config_schema(&serde_json::json!({})).is_ok());
    }

    #[test]
    fn test_backend_requires_name_kind_model() {
        let value = serde_json::json!({
            "router": { "backends": [ { "name": "x" } ] }
        });
        let errors = validate_config_schema(&value).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_unknown_backend_kind_fails() {
        let value = serde_json::json!({
            "router": { "backends": [ { "name": "x", "kind": "carrier-pigeon", "model": "m" } ] }
        });
        assert!(validate_config_schema(&value).is_err());
    }

    #[test]
    fn test_out_of_range_threshold_fails() {
        let value = serde_json::json!({
            "admission": { "admission_threshold": 1.5 }
        });
        let errors = validate_config_schema(&value).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("admission_threshold")));
    }
}
