//! Names that may never enter a context store
//!
//! Covers every top-level field of a serialized [`LogPayload`], the inline
//! diagnostic blocks, and object-prototype names some downstream JSON
//! consumers treat specially.
//!
//! [`LogPayload`]: crate::payload::LogPayload

/// Top-level payload field names
pub const PAYLOAD_KEYS: &[&str] = &[
    "event_key",
    "fields",
    "correlation_id",
    "fork_id",
    "metadata",
    "timestamp",
];

/// Inline diagnostic block names
pub const DIAGNOSTIC_KEYS: &[&str] = &["_validation", "_perf"];

/// Prototype-pollution vectors
pub const PROTOTYPE_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

/// Check whether a metadata key is reserved
pub fn is_reserved(key: &str) -> bool {
    PAYLOAD_KEYS.contains(&key) || DIAGNOSTIC_KEYS.contains(&key) || PROTOTYPE_KEYS.contains(&key)
}

/// All reserved names
pub fn reserved_keys() -> impl Iterator<Item = &'static str> {
    PAYLOAD_KEYS
        .iter()
        .chain(DIAGNOSTIC_KEYS)
        .chain(PROTOTYPE_KEYS)
        .copied()
}
