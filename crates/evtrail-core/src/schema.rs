//! Event and group schemas
//!
//! Schemas are host-authored, immutable data. Groups namespace their events
//! by key prefix; correlation groups additionally carry the five lifecycle
//! auto-events used by [`Correlation`](crate::correlation::Correlation).

use crate::level::Level;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Declared type of an event field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Error,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Error => "error",
        }
    }
}

/// Declaration of one event field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl FieldSchema {
    /// Optional field of the given type
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            doc: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn error() -> Self {
        Self::new(FieldType::Error)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }
}

/// A typed event definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSchema {
    /// Dotted event key (e.g. "db.query.slow")
    pub key: String,

    /// Severity the event is delivered at
    pub level: Level,

    /// Message template; `{field}` placeholders are filled from fields
    pub message: String,

    /// Declared fields
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSchema>,
}

impl EventSchema {
    pub fn new(key: impl Into<String>, level: Level, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            level,
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Declare a field
    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.insert(name.into(), schema);
        self
    }

    /// Names of required fields
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, f)| f.required)
            .map(|(name, _)| name.as_str())
    }
}

/// Prefix `key` with `group` unless it already is
pub fn qualify(group: &str, key: &str) -> String {
    if group.is_empty() || key == group || key.starts_with(&format!("{}.", group)) {
        key.to_string()
    } else {
        format!("{}.{}", group, key)
    }
}

/// A key-prefixed namespace of events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventGroup {
    pub key: String,

    #[serde(default)]
    pub events: BTreeMap<String, EventSchema>,
}

impl EventGroup {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            events: BTreeMap::new(),
        }
    }

    /// Add an event; its key is qualified with the group key.
    pub fn event(mut self, mut schema: EventSchema) -> Self {
        schema.key = qualify(&self.key, &schema.key);
        self.events.insert(schema.key.clone(), schema);
        self
    }

    /// Nest another group. Child event keys already carry the child's
    /// key, so they only gain this group's prefix.
    pub fn group(mut self, child: EventGroup) -> Self {
        for (_, mut schema) in child.events {
            schema.key = qualify(&self.key, &schema.key);
            self.events.insert(schema.key.clone(), schema);
        }
        self
    }

    /// Look up by full key or by key relative to the group
    pub fn get(&self, key: &str) -> Option<&EventSchema> {
        self.events
            .get(key)
            .or_else(|| self.events.get(&qualify(&self.key, key)))
    }
}

/// Lifecycle auto-events of a correlation group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationEvents {
    pub start: EventSchema,
    pub complete: EventSchema,
    pub fail: EventSchema,
    pub timeout: EventSchema,
    pub metadata_warning: EventSchema,
}

impl CorrelationEvents {
    /// Synthesize the auto-events for the group `key`
    pub fn synthesize(key: &str) -> Self {
        let duration = || FieldSchema::number().required().doc("milliseconds since start");
        let marker =
            || FieldSchema::boolean().doc("set when the correlation had already terminated");

        Self {
            start: EventSchema::new(qualify(key, "start"), Level::Info, format!("{} started", key)),
            complete: EventSchema::new(
                qualify(key, "complete"),
                Level::Info,
                format!("{} completed in {{duration}}ms", key),
            )
            .field("duration", duration())
            .field("multiple_completes", marker()),
            fail: EventSchema::new(
                qualify(key, "fail"),
                Level::Error,
                format!("{} failed after {{duration}}ms: {{error}}", key),
            )
            .field("duration", duration())
            .field("error", FieldSchema::error().required())
            .field("multiple_completes", marker()),
            timeout: EventSchema::new(
                qualify(key, "timeout"),
                Level::Warn,
                format!("{} timed out after {{duration}}ms", key),
            )
            .field("duration", duration())
            .field(
                "timeout_ms",
                FieldSchema::number().required().doc("configured idle timeout"),
            ),
            metadata_warning: EventSchema::new(
                qualify(key, "metadata_warning"),
                Level::Warn,
                format!("{} metadata collision on {{key}}", key),
            )
            .field("key", FieldSchema::string().required())
            .field("existing_value", FieldSchema::string().required())
            .field("attempted_value", FieldSchema::string().required()),
        }
    }
}

/// A group whose work is tracked as a correlation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationGroup {
    pub group: EventGroup,

    /// Idle timeout; zero disables timing out
    #[serde(with = "duration_ms")]
    pub timeout: Duration,

    pub auto: CorrelationEvents,
}

impl CorrelationGroup {
    pub fn new(key: impl Into<String>, timeout: Duration) -> Self {
        let key = key.into();
        Self {
            auto: CorrelationEvents::synthesize(&key),
            group: EventGroup::new(key),
            timeout,
        }
    }

    pub fn key(&self) -> &str {
        &self.group.key
    }

    pub fn event(mut self, schema: EventSchema) -> Self {
        self.group = self.group.event(schema);
        self
    }

    pub fn get(&self, key: &str) -> Option<&EventSchema> {
        self.group.get(key)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_qualifies_keys() {
        let group = EventGroup::new("db")
            .event(EventSchema::new("connected", Level::Info, "connected"))
            .event(EventSchema::new("db.closed", Level::Info, "closed"));

        assert!(group.events.contains_key("db.connected"));
        assert!(group.events.contains_key("db.closed"));
        assert!(!group.events.contains_key("db.db.closed"));
        assert_eq!(group.get("connected").unwrap().key, "db.connected");
    }

    #[test]
    fn test_prefix_must_end_at_separator() {
        assert_eq!(qualify("db", "dbx.open"), "db.dbx.open");
        assert_eq!(qualify("db", "db.open"), "db.open");
    }

    #[test]
    fn test_nested_groups() {
        let pool = EventGroup::new("pool").event(EventSchema::new("grow", Level::Debug, "grew"));
        let db = EventGroup::new("db").group(pool);
        assert!(db.events.contains_key("db.pool.grow"));
        assert!(!db.events.contains_key("db.pool.pool.grow"));
        assert_eq!(db.get("pool.grow").unwrap().key, "db.pool.grow");
    }

    #[test]
    fn test_groups_nest_two_levels() {
        let conn = EventGroup::new("conn").event(EventSchema::new("lost", Level::Warn, "lost"));
        let pool = EventGroup::new("pool").group(conn);
        let db = EventGroup::new("db").group(pool);

        assert_eq!(db.events.keys().collect::<Vec<_>>(), vec!["db.pool.conn.lost"]);
    }

    #[test]
    fn test_auto_events_synthesized() {
        let group = CorrelationGroup::new("checkout", Duration::from_secs(5));
        assert_eq!(group.auto.start.key, "checkout.start");
        assert_eq!(group.auto.complete.key, "checkout.complete");
        assert_eq!(group.auto.fail.key, "checkout.fail");
        assert_eq!(group.auto.fail.level, Level::Error);
        assert_eq!(group.auto.timeout.key, "checkout.timeout");
        assert_eq!(group.auto.metadata_warning.key, "checkout.metadata_warning");
        assert!(group.auto.fail.fields["error"].required);
    }

    #[test]
    fn test_schema_deserializes_from_json() {
        let schema: EventSchema = serde_json::from_value(serde_json::json!({
            "key": "http.request",
            "level": "info",
            "message": "{method} {path}",
            "fields": {
                "method": { "type": "string", "required": true },
                "status": { "type": "number" }
            }
        }))
        .unwrap();
        assert_eq!(schema.fields["status"].field_type, FieldType::Number);
        assert_eq!(schema.required_fields().collect::<Vec<_>>(), vec!["method"]);
    }
}
