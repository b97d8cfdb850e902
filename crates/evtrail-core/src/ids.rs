//! Correlation id generation

use std::fmt;
use std::sync::Arc;

/// Source of fresh correlation ids
#[derive(Clone, Default)]
pub enum IdGenerator {
    /// Lexicographically sortable ULIDs
    #[default]
    Ulid,
    /// Random UUID v4
    UuidV4,
    /// Host-supplied function
    Custom(Arc<dyn Fn() -> String + Send + Sync>),
}

impl IdGenerator {
    pub fn custom(f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        IdGenerator::Custom(Arc::new(f))
    }

    pub fn generate(&self) -> String {
        match self {
            IdGenerator::Ulid => ulid::Ulid::new().to_string(),
            IdGenerator::UuidV4 => uuid::Uuid::new_v4().to_string(),
            IdGenerator::Custom(f) => f(),
        }
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdGenerator::Ulid => f.write_str("Ulid"),
            IdGenerator::UuidV4 => f.write_str("UuidV4"),
            IdGenerator::Custom(_) => f.write_str("Custom"),
        }
    }
}
