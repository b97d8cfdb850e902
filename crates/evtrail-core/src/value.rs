//! Values supplied by application code

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Event fields as supplied by the caller
pub type Fields = BTreeMap<String, FieldValue>;

/// Normalized, serializable event fields
pub type FieldMap = BTreeMap<String, Value>;

/// A single caller-supplied field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Number(f64),
    Bool(bool),
    Error(ErrorValue),
    /// Anything else (objects, arrays, null)
    Json(Value),
}

impl FieldValue {
    /// Capture an error and its source chain
    pub fn error(err: &(dyn std::error::Error + 'static)) -> Self {
        FieldValue::Error(ErrorValue::from_error(err))
    }

    /// Short type name used in type-mismatch diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "string",
            FieldValue::Number(_) => "number",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Error(_) => "error",
            FieldValue::Json(Value::Null) => "null",
            FieldValue::Json(Value::Array(_)) => "array",
            FieldValue::Json(Value::Object(_)) => "object",
            FieldValue::Json(Value::String(_)) => "string",
            FieldValue::Json(Value::Number(_)) => "number",
            FieldValue::Json(Value::Bool(_)) => "boolean",
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

/// Largest integer magnitude an `f64` holds exactly
const MAX_EXACT_INT: u64 = 1 << 53;

macro_rules! impl_from_small {
    ($($t:ty),*) => {
        $(
            impl From<$t> for FieldValue {
                fn from(v: $t) -> Self {
                    FieldValue::Number(f64::from(v))
                }
            }
        )*
    };
}

impl_from_small!(i32, u32, f32);

// 64-bit integers beyond 2^53 keep their exact JSON form
impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        if v.unsigned_abs() <= MAX_EXACT_INT {
            FieldValue::Number(v as f64)
        } else {
            FieldValue::Json(Value::from(v))
        }
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        if v <= MAX_EXACT_INT {
            FieldValue::Number(v as f64)
        } else {
            FieldValue::Json(Value::from(v))
        }
    }
}

impl From<usize> for FieldValue {
    fn from(v: usize) -> Self {
        FieldValue::from(v as u64)
    }
}

impl From<ErrorValue> for FieldValue {
    fn from(v: ErrorValue) -> Self {
        FieldValue::Error(v)
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        match v {
            Value::String(s) => FieldValue::String(s),
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::from(i)
                } else if let Some(u) = n.as_u64() {
                    FieldValue::from(u)
                } else {
                    match n.as_f64() {
                        Some(f) => FieldValue::Number(f),
                        None => FieldValue::Json(Value::Number(n)),
                    }
                }
            }
            other => FieldValue::Json(other),
        }
    }
}

/// A printable snapshot of an error
///
/// Raw error objects never reach a sink; they are flattened into their
/// display text plus the text of each `source()` in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorValue {
    pub message: String,
    pub causes: Vec<String>,
}

impl ErrorValue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            causes: Vec::new(),
        }
    }

    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            causes,
        }
    }

    /// Render as `"message: cause: root cause"`
    pub fn render(&self) -> String {
        let mut out = self.message.clone();
        for cause in &self.causes {
            out.push_str(": ");
            out.push_str(cause);
        }
        out
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for ErrorValue {
    fn from(v: &str) -> Self {
        ErrorValue::new(v)
    }
}

impl From<String> for ErrorValue {
    fn from(v: String) -> Self {
        ErrorValue::new(v)
    }
}

impl From<std::io::Error> for ErrorValue {
    fn from(err: std::io::Error) -> Self {
        ErrorValue::from_error(&err)
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for ErrorValue {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        ErrorValue::from_error(err.as_ref())
    }
}

/// Build a [`Fields`] map
///
/// ```
/// let fields = evtrail_core::fields! { "host" => "db1", "port" => 5432 };
/// assert_eq!(fields.len(), 2);
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::value::Fields::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::value::Fields::new();
        $(
            map.insert(::std::string::String::from($key), $crate::value::FieldValue::from($value));
        )+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Debug)]
    struct Wrapped(io::Error);

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "query failed")
        }
    }

    impl std::error::Error for Wrapped {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_error_chain_rendering() {
        let err = Wrapped(io::Error::new(io::ErrorKind::TimedOut, "socket timed out"));
        let value = ErrorValue::from_error(&err);
        assert_eq!(value.message, "query failed");
        assert_eq!(value.render(), "query failed: socket timed out");
    }

    #[test]
    fn test_json_conversion() {
        assert_eq!(
            FieldValue::from(serde_json::json!(3)),
            FieldValue::Number(3.0)
        );
        assert_eq!(FieldValue::from(serde_json::json!(null)).kind(), "null");
        assert_eq!(FieldValue::from(serde_json::json!({"a": 1})).kind(), "object");
    }

    #[test]
    fn test_large_integers_stay_exact() {
        let id: u64 = 9_007_199_254_740_993;
        assert_eq!(FieldValue::from(id), FieldValue::Json(serde_json::json!(id)));
        assert_eq!(FieldValue::from(-(id as i64)).kind(), "number");
        assert_eq!(FieldValue::from(42u64), FieldValue::Number(42.0));
        assert_eq!(
            FieldValue::from(serde_json::json!(u64::MAX)),
            FieldValue::Json(serde_json::json!(u64::MAX))
        );
    }

    #[test]
    fn test_fields_macro() {
        let fields = crate::fields! { "a" => 1, "b" => "two", "c" => true };
        assert_eq!(fields["a"], FieldValue::Number(1.0));
        assert_eq!(fields["b"], FieldValue::String("two".to_string()));
        assert_eq!(fields["c"], FieldValue::Bool(true));
        assert!(crate::fields! {}.is_empty());
    }
}
