//! Finished log records

use crate::context::{Collision, ContextRecord, ContextValidation};
use crate::fork::ForkId;
use crate::validate::{FieldValidation, TypeMismatch};
use crate::value::FieldMap;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Inline anomalies attached to a record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub type_errors: Vec<TypeMismatch>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unknown_fields: Vec<String>,

    /// Context overwrites refused since the previous record
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub collisions: Vec<Collision>,

    /// Reserved context keys refused since the previous record
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reserved_keys: Vec<String>,

    /// Context keys dropped at the key cap since the previous record
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped_keys: Vec<String>,

    /// Context diagnostics counted but not listed because the queue was full
    #[serde(skip_serializing_if = "is_zero")]
    pub suppressed: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl Diagnostics {
    pub fn is_empty(&self) -> bool {
        self.missing_fields.is_empty()
            && self.type_errors.is_empty()
            && self.unknown_fields.is_empty()
            && self.collisions.is_empty()
            && self.reserved_keys.is_empty()
            && self.dropped_keys.is_empty()
            && self.suppressed == 0
    }

    pub fn with_fields(mut self, validation: &FieldValidation) -> Self {
        self.missing_fields.extend(validation.missing_fields.iter().cloned());
        self.type_errors.extend(validation.type_errors.iter().cloned());
        self.unknown_fields.extend(validation.unknown_fields.iter().cloned());
        self
    }

    pub fn with_context(mut self, context: ContextValidation) -> Self {
        self.collisions.extend(context.collisions);
        self.reserved_keys.extend(context.reserved);
        self.dropped_keys.extend(context.dropped);
        self
    }

    pub fn with_suppressed(mut self, suppressed: usize) -> Self {
        self.suppressed += suppressed;
        self
    }

    /// Number of individual anomalies recorded
    pub fn count(&self) -> usize {
        self.missing_fields.len()
            + self.type_errors.len()
            + self.unknown_fields.len()
            + self.collisions.len()
            + self.reserved_keys.len()
            + self.dropped_keys.len()
            + self.suppressed
    }
}

/// The immutable record handed to a sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogPayload {
    pub event_key: String,
    pub fields: FieldMap,
    pub correlation_id: String,
    pub fork_id: ForkId,
    pub metadata: ContextRecord,
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "_validation", skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

impl LogPayload {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Assembles a [`LogPayload`]
#[derive(Debug)]
pub struct PayloadBuilder {
    event_key: String,
    fields: FieldMap,
    correlation_id: String,
    fork_id: ForkId,
    metadata: ContextRecord,
    diagnostics: Diagnostics,
    timestamp: Option<DateTime<Utc>>,
}

impl PayloadBuilder {
    pub fn new(
        event_key: impl Into<String>,
        correlation_id: impl Into<String>,
        fork_id: ForkId,
    ) -> Self {
        Self {
            event_key: event_key.into(),
            fields: FieldMap::new(),
            correlation_id: correlation_id.into(),
            fork_id,
            metadata: ContextRecord::new(),
            diagnostics: Diagnostics::default(),
            timestamp: None,
        }
    }

    pub fn fields(mut self, fields: FieldMap) -> Self {
        self.fields = fields;
        self
    }

    pub fn metadata(mut self, metadata: ContextRecord) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Build the record; an empty diagnostics block is omitted.
    pub fn build(self) -> LogPayload {
        LogPayload {
            event_key: self.event_key,
            fields: self.fields,
            correlation_id: self.correlation_id,
            fork_id: self.fork_id,
            metadata: self.metadata,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            diagnostics: (!self.diagnostics.is_empty()).then_some(self.diagnostics),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_diagnostics_omitted() {
        let payload = PayloadBuilder::new("app.start", "c1", ForkId::root()).build();
        assert!(payload.diagnostics.is_none());

        let json = payload.to_json();
        assert!(json.get("_validation").is_none());
        assert_eq!(json["fork_id"], json!("0"));
        assert_eq!(json["correlation_id"], json!("c1"));
    }

    #[test]
    fn test_diagnostics_serialized_as_validation_block() {
        let diagnostics = Diagnostics {
            missing_fields: vec!["port".into()],
            ..Default::default()
        };
        let payload = PayloadBuilder::new("app.start", "c1", ForkId::root().child(2))
            .diagnostics(diagnostics)
            .build();

        let json = payload.to_json();
        assert_eq!(json["_validation"]["missing_fields"], json!(["port"]));
        assert!(json["_validation"].get("type_errors").is_none());
        assert_eq!(json["fork_id"], json!("2"));
    }

    #[test]
    fn test_context_diagnostics_merge() {
        let context = ContextValidation {
            reserved: vec!["metadata".into()],
            dropped: vec!["k".into()],
            ..Default::default()
        };
        let d = Diagnostics::default().with_context(context);
        assert_eq!(d.reserved_keys, vec!["metadata"]);
        assert_eq!(d.dropped_keys, vec!["k"]);
        assert_eq!(d.count(), 2);
    }
}
