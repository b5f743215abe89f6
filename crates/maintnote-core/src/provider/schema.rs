//! JSON Schema validation for provider profiles.
//!
//! Profiles are checked against `schema/profiles.schema.json` before they are
//! deserialized, so structural mistakes are reported with their location.

use std::sync::OnceLock;

/// Embedded profiles schema (loaded at compile time).
const PROFILES_SCHEMA_JSON: &str = include_str!("../../schema/profiles.schema.json");

/// Compiled validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, String> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(PROFILES_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result.as_ref().map_err(Clone::clone)
}

/// Validate a profiles document.
///
/// Returns every violation as `"<message> at <instance path>"`.
pub fn validate_profiles_schema(profiles: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e])?;

    let errors: Vec<String> = validator
        .iter_errors(profiles)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
