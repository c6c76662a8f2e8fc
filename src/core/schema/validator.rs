//! The validation engine: pure, stateless checks of values and payloads
//! against [`Schema`] declarations.
//!
//! [`validate`] accumulates every error instead of stopping at the first,
//! [`validate_and_process`] injects defaults first, and [`sanitize`] is
//! the degrading boundary used when a payload's origin is not trusted.

use super::{Constraint, FieldSpec, FieldType, Schema, ValidationReport};
use crate::core::SignalValue;
use serde_json::Map;

/// Short type name of a value, for error messages.
fn value_kind(value: &SignalValue) -> &'static str {
    match value {
        SignalValue::Null => "null",
        SignalValue::Bool(_) => "boolean",
        SignalValue::Number(_) => "number",
        SignalValue::String(_) => "string",
        SignalValue::Array(_) => "array",
        SignalValue::Object(_) => "mapping",
    }
}

/// Validates a single value against its spec.
///
/// Check order: required/absent, type, constraint, custom validator.
/// `null` counts as absent. `payload` is the whole mapping, handed to
/// custom validators for cross-field rules.
pub fn validate_field(
    value: Option<&SignalValue>,
    spec: &FieldSpec,
    field_name: &str,
    payload: &Map<String, SignalValue>,
) -> Result<(), String> {
    let value = match value.filter(|v| !v.is_null()) {
        Some(v) => v,
        None => {
            if spec.required {
                return Err(format!("field '{field_name}' is required but missing"));
            }
            return Ok(());
        }
    };

    if !spec.field_type.matches(value) {
        return Err(format!(
            "field '{field_name}' expected {} but got {}",
            spec.field_type,
            value_kind(value)
        ));
    }

    match &spec.constraint {
        Constraint::None => {}
        Constraint::OneOf(allowed) => {
            // Type check above guarantees a string here.
            let s = value.as_str().unwrap_or_default();
            if !allowed.iter().any(|a| a == s) {
                return Err(format!(
                    "field '{field_name}' value '{s}' is not one of [{}]",
                    allowed.join(", ")
                ));
            }
        }
        Constraint::Range { min, max } => {
            let n = value.as_f64().unwrap_or_default();
            if n < *min || n > *max {
                return Err(format!(
                    "field '{field_name}' value {n} is outside [{min}, {max}]"
                ));
            }
        }
    }

    if let Some(validator) = &spec.validator {
        if !validator(value, spec, payload) {
            return Err(format!("field '{field_name}' rejected by custom validator"));
        }
    }

    Ok(())
}

/// Validates a whole payload against a schema, accumulating every error.
///
/// Non-mapping payloads are rejected outright. Undeclared fields are
/// ignored here; [`sanitize`] is the function that strips them.
pub fn validate(payload: &SignalValue, schema: &Schema) -> ValidationReport {
    let mut report = ValidationReport::new();
    let Some(map) = payload.as_object() else {
        report.add_error(format!(
            "payload must be a mapping, got {}",
            value_kind(payload)
        ));
        return report;
    };
    for (name, spec) in schema {
        if let Err(message) = validate_field(map.get(name), spec, name, map) {
            report.add_error(message);
        }
    }
    report
}

/// Injects defaults for absent fields (never overwriting provided
/// values), then validates the result. Returns the report together with
/// the processed payload.
pub fn validate_and_process(payload: &SignalValue, schema: &Schema) -> (ValidationReport, SignalValue) {
    let Some(map) = payload.as_object() else {
        return (validate(payload, schema), payload.clone());
    };
    let mut processed = map.clone();
    for (name, spec) in schema {
        if let Some(default) = &spec.default {
            let absent = processed.get(name).is_none_or(SignalValue::is_null);
            if absent {
                processed.insert(name.clone(), default.clone());
            }
        }
    }
    let processed = SignalValue::Object(processed);
    (validate(&processed, schema), processed)
}

/// Returns a new mapping holding only schema-declared keys, with defaults
/// injected for whatever is absent.
///
/// Tolerates a non-mapping payload by degrading to a default-filled
/// result instead of failing; this is the boundary for untrusted input.
pub fn sanitize(payload: &SignalValue, schema: &Schema) -> SignalValue {
    let source = payload.as_object();
    let mut clean = Map::new();
    for (name, spec) in schema {
        let provided = source
            .and_then(|m| m.get(name))
            .filter(|v| !v.is_null())
            .cloned();
        match provided {
            Some(value) => {
                clean.insert(name.clone(), value);
            }
            None => {
                if let Some(default) = &spec.default {
                    clean.insert(name.clone(), default.clone());
                }
            }
        }
    }
    SignalValue::Object(clean)
}

/// Self-check run once when a class declares an `Out` schema.
///
/// The type tag and validator callability are guaranteed by construction
/// in this crate; what remains checkable is constraint placement
/// (`OneOf` on strings, `Range` on numbers, min <= max) and default/type
/// agreement.
pub fn validate_schema(schema: &Schema) -> ValidationReport {
    let mut report = ValidationReport::new();
    for (name, spec) in schema {
        match (&spec.constraint, spec.field_type) {
            (Constraint::None, _) => {}
            (Constraint::OneOf(values), FieldType::String) => {
                if values.is_empty() {
                    report.add_error(format!("field '{name}': enum constraint lists no values"));
                }
            }
            (Constraint::OneOf(_), other) => {
                report.add_error(format!(
                    "field '{name}': enum constraint is only legal on string fields, not {other}"
                ));
            }
            (Constraint::Range { min, max }, FieldType::Number) => {
                if min > max {
                    report.add_error(format!(
                        "field '{name}': range [{min}, {max}] has min above max"
                    ));
                }
            }
            (Constraint::Range { .. }, other) => {
                report.add_error(format!(
                    "field '{name}': range constraint is only legal on number fields, not {other}"
                ));
            }
        }
        if let Some(default) = &spec.default {
            if !default.is_null() && !spec.field_type.matches(default) {
                report.add_error(format!(
                    "field '{name}': default does not match declared type {}",
                    spec.field_type
                ));
            }
        }
    }
    report
}

/// Guard against spoofed identity in payloads that cross a trust
/// boundary.
///
/// Passes trivially when `field_name` is absent (identity not required
/// by that signal); otherwise the payload's claim must equal
/// `actual_sender`.
pub fn validate_sender(payload: &SignalValue, field_name: &str, actual_sender: &str) -> bool {
    match payload.get(field_name) {
        None | Some(SignalValue::Null) => true,
        Some(claimed) => claimed.as_str() == Some(actual_sender),
    }
}

/// Overlays `extension` onto `base`; extension entries replace same-named
/// base entries wholesale.
pub fn merge_schemas(base: &Schema, extension: &Schema) -> Schema {
    let mut merged = base.clone();
    for (name, spec) in extension {
        merged.insert(name.clone(), spec.clone());
    }
    merged
}
