//! Schema declarations for signal payloads.
//!
//! A [`Schema`] maps field names to [`FieldSpec`]s; a spec carries the
//! expected [`FieldType`], whether the field is required, an optional
//! default, a [`Constraint`], and an optional custom validator. The
//! checking machinery lives in [`validator`].

pub mod validator;

use crate::core::SignalValue;
use crate::core::host::ResourceHandle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// The declared contract for one signal's payload.
///
/// `BTreeMap` keeps field iteration (and therefore error accumulation)
/// deterministic.
pub type Schema = BTreeMap<String, FieldSpec>;

/// The fixed set of payload field types.
///
/// `Any` accepts every value, including absence. `Resource` matches the
/// opaque handle encoding of [`ResourceHandle`]; the runtime never looks
/// inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Mapping,
    Any,
    Resource,
}

impl FieldType {
    /// Whether `value` satisfies this type tag.
    pub fn matches(&self, value: &SignalValue) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Mapping => value.is_object(),
            FieldType::Any => true,
            FieldType::Resource => ResourceHandle::from_value(value).is_some(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Mapping => "mapping",
            FieldType::Any => "any",
            FieldType::Resource => "resource",
        };
        f.write_str(tag)
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(FieldType::String),
            "number" => Ok(FieldType::Number),
            "boolean" => Ok(FieldType::Boolean),
            "mapping" => Ok(FieldType::Mapping),
            "any" => Ok(FieldType::Any),
            "resource" => Ok(FieldType::Resource),
            other => Err(format!("unrecognized field type '{other}'")),
        }
    }
}

/// Value constraint attached to a field, one variant per constraint kind.
///
/// `OneOf` is only legal on string fields and `Range` only on number
/// fields; [`validator::validate_schema`] enforces that when the schema
/// is declared.
#[derive(Debug, Clone, Default)]
pub enum Constraint {
    #[default]
    None,
    /// Allowed string values.
    OneOf(Vec<String>),
    /// Inclusive numeric bounds.
    Range { min: f64, max: f64 },
}

/// Author-supplied predicate run after the built-in checks.
///
/// Receives the value, its spec, and the whole payload so cross-field
/// rules are expressible.
pub type CustomValidator =
    Rc<dyn Fn(&SignalValue, &FieldSpec, &serde_json::Map<String, SignalValue>) -> bool>;

/// The declared contract for one payload field.
#[derive(Clone)]
pub struct FieldSpec {
    pub field_type: FieldType,
    pub required: bool,
    pub default: Option<SignalValue>,
    pub constraint: Constraint,
    pub validator: Option<CustomValidator>,
}

impl FieldSpec {
    pub fn of(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            default: None,
            constraint: Constraint::None,
            validator: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<SignalValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraint = Constraint::OneOf(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.constraint = Constraint::Range { min, max };
        self
    }

    pub fn check_with(
        mut self,
        validator: impl Fn(&SignalValue, &FieldSpec, &serde_json::Map<String, SignalValue>) -> bool
        + 'static,
    ) -> Self {
        self.validator = Some(Rc::new(validator));
        self
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("field_type", &self.field_type)
            .field("required", &self.required)
            .field("default", &self.default)
            .field("constraint", &self.constraint)
            .field("validator", &self.validator.as_ref().map(|_| "<custom>"))
            .finish()
    }
}

/// Accumulated validation errors for one payload or schema.
///
/// Validation never short-circuits: one pass reports the complete defect
/// list.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
    }

    /// Human-readable summary; "No errors" when the report is clean.
    pub fn format(&self) -> String {
        if self.errors.is_empty() {
            "No errors".to_string()
        } else {
            self.errors.join("; ")
        }
    }
}
