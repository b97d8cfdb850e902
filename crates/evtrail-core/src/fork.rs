//! Hierarchical fork identifiers
//!
//! Kept as a path of 1-based child indices and only rendered to the dotted
//! form at the payload boundary. The root renders as `"0"`, its children as
//! bare `"n"`, deeper descendants as `"1.3.2"`.

use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ForkId {
    path: Vec<u32>,
}

impl ForkId {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Id of the `n`-th child (1-based)
    pub fn child(&self, n: u32) -> Self {
        let mut path = self.path.clone();
        path.push(n);
        Self { path }
    }

    /// Number of separators in the rendered id
    pub fn depth(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    /// Depth the `n`-th child would have
    pub fn child_depth(&self) -> usize {
        self.path.len()
    }

    pub fn path(&self) -> &[u32] {
        &self.path
    }
}

impl fmt::Display for ForkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some((first, rest)) = self.path.split_first() else {
            return f.write_str("0");
        };
        write!(f, "{}", first)?;
        for n in rest {
            write!(f, ".{}", n)?;
        }
        Ok(())
    }
}

impl Serialize for ForkId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendering() {
        let root = ForkId::root();
        assert_eq!(root.to_string(), "0");
        assert_eq!(root.child(1).to_string(), "1");
        assert_eq!(root.child(2).child(3).to_string(), "2.3");
    }

    #[test]
    fn test_depth_counts_separators() {
        let root = ForkId::root();
        assert_eq!(root.depth(), 0);
        assert_eq!(root.child(4).depth(), 0);
        assert_eq!(root.child(4).child(1).depth(), 1);
        assert_eq!(root.child(4).child(1).child_depth(), 2);
    }

    #[test]
    fn test_serializes_as_string() {
        let id = ForkId::root().child(1).child(2);
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("1.2"));
    }
}
