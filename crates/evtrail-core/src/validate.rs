//! Field validation and normalization
//!
//! The schema is advisory: problems are classified and returned alongside
//! the normalized fields, never raised.

use crate::schema::{EventSchema, FieldType};
use crate::value::{FieldMap, FieldValue, Fields};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

/// Validation options
#[derive(Debug, Clone, Copy)]
pub struct ValidationOptions {
    /// Strip escape sequences and flatten newlines in string values
    pub sanitize_strings: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            sanitize_strings: true,
        }
    }
}

/// A field whose value does not match its declared type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMismatch {
    pub field: String,
    pub expected: FieldType,
    pub actual: String,
}

/// Result of validating fields against a schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldValidation {
    pub missing_fields: Vec<String>,
    pub type_errors: Vec<TypeMismatch>,
    pub unknown_fields: Vec<String>,
    pub normalized_fields: FieldMap,
}

impl FieldValidation {
    pub fn is_clean(&self) -> bool {
        self.missing_fields.is_empty()
            && self.type_errors.is_empty()
            && self.unknown_fields.is_empty()
    }
}

/// ANSI CSI/OSC sequences and lone escapes
static ESCAPE_SEQUENCES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b.?")
        .unwrap_or_else(|_| unreachable!("escape pattern is valid"))
});

/// Neutralize log-injection vectors in a string.
///
/// Escape sequences and control characters other than tab are removed and
/// line breaks become a literal `\n`.
pub fn sanitize(input: &str) -> String {
    let stripped = ESCAPE_SEQUENCES.replace_all(input, "");
    let mut out = String::with_capacity(stripped.len());
    let mut chars = stripped.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\\n");
            }
            '\n' | '\u{2028}' | '\u{2029}' => out.push_str("\\n"),
            '\t' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// Validate `provided` against `schema`.
///
/// Declared fields that are missing are listed when required and skipped
/// otherwise. Mismatched fields are listed and left out of the output.
/// Undeclared fields are kept and listed in `unknown_fields`.
pub fn validate(schema: &EventSchema, provided: Fields, opts: ValidationOptions) -> FieldValidation {
    let mut result = FieldValidation::default();
    let mut provided = provided;

    for (name, declared) in &schema.fields {
        let Some(value) = provided.remove(name) else {
            if declared.required {
                result.missing_fields.push(name.clone());
            }
            continue;
        };

        match normalize_declared(declared.field_type, value, opts) {
            Ok(normalized) => {
                result.normalized_fields.insert(name.clone(), normalized);
            }
            Err(actual) => result.type_errors.push(TypeMismatch {
                field: name.clone(),
                expected: declared.field_type,
                actual,
            }),
        }
    }

    for (name, value) in provided {
        result.normalized_fields.insert(name.clone(), normalize(value, opts));
        result.unknown_fields.push(name);
    }

    result
}

/// Normalize fields without a schema (ad-hoc logging)
pub fn normalize_all(fields: Fields, opts: ValidationOptions) -> FieldMap {
    fields
        .into_iter()
        .map(|(name, value)| (name, normalize(value, opts)))
        .collect()
}

fn normalize_declared(
    expected: FieldType,
    value: FieldValue,
    opts: ValidationOptions,
) -> Result<Value, String> {
    match (expected, value) {
        (FieldType::String, FieldValue::String(s)) => Ok(string_value(s, opts)),
        (FieldType::Number, FieldValue::Number(n)) => number_value(n),
        (FieldType::Number, FieldValue::Json(Value::Number(n))) => Ok(Value::Number(n)),
        (FieldType::Boolean, FieldValue::Bool(b)) => Ok(Value::Bool(b)),
        (FieldType::Error, FieldValue::Error(e)) => Ok(string_value(e.render(), opts)),
        // Already-rendered errors, e.g. a normalized payload fed back in
        (FieldType::Error, FieldValue::String(s)) => Ok(string_value(s, opts)),
        (_, other) => Err(other.kind().to_string()),
    }
}

fn normalize(value: FieldValue, opts: ValidationOptions) -> Value {
    match value {
        FieldValue::String(s) => string_value(s, opts),
        FieldValue::Number(n) => number_value(n).unwrap_or(Value::Null),
        FieldValue::Bool(b) => Value::Bool(b),
        FieldValue::Error(e) => string_value(e.render(), opts),
        FieldValue::Json(v) => v,
    }
}

fn string_value(s: String, opts: ValidationOptions) -> Value {
    if opts.sanitize_strings {
        Value::String(sanitize(&s))
    } else {
        Value::String(s)
    }
}

fn number_value(n: f64) -> Result<Value, String> {
    // Integral values render without a trailing ".0"
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return Ok(Value::from(n as i64));
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| "non-finite number".to_string())
}

/// Fill `{field}` placeholders in a message template.
///
/// Placeholders without a matching field are left verbatim.
pub fn render_message(template: &str, fields: &FieldMap) -> String {
    static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\{([A-Za-z0-9_.]+)\}")
            .unwrap_or_else(|_| unreachable!("placeholder pattern is valid"))
    });

    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| match fields.get(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
