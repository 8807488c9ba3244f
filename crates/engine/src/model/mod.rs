//! Data model for influence computation
//!
//! Node identifiers, canonical edge keys and the two read-only input tables.

mod attributes;
mod edges;
mod raw;
mod scored;

pub use attributes::AttributeTable;
pub use edges::{EdgeInstance, EdgeRow, EdgeTable};
pub use raw::RawTable;
pub use scored::{AugmentedEdge, AugmentedEdgeTable, INFLUENCE_COLUMN};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Discrete time bucket index
pub type Timeframe = i64;

/// Node identifier under a single total order.
///
/// Identifiers that parse as base-10 integers compare numerically and sort
/// before every non-numeric label. Both tables parse ids through
/// [`NodeId::parse`], so `"007"` in the edge table and `"7"` in the attribute
/// table name the same node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeId {
    Numeric(i64),
    Label(String),
}

impl NodeId {
    /// Parse a raw identifier into its canonical form
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<i64>() {
            Ok(n) => NodeId::Numeric(n),
            Err(_) => NodeId::Label(trimmed.to_string()),
        }
    }

    /// Whether the identifier is blank
    pub fn is_empty(&self) -> bool {
        matches!(self, NodeId::Label(s) if s.is_empty())
    }
}

impl FromStr for NodeId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(NodeId::parse(s))
    }
}

impl From<i64> for NodeId {
    fn from(n: i64) -> Self {
        NodeId::Numeric(n)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId::parse(s)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Numeric(n) => write!(f, "{}", n),
            NodeId::Label(s) => f.write_str(s),
        }
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(NodeId::parse(&raw))
    }
}

/// Canonical unordered edge `(u, v)` with `u < v`.
///
/// The stored influence of an edge is attributed to `u`; `v` sees the negation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    u: NodeId,
    v: NodeId,
}

impl EdgeKey {
    /// Canonicalise an endpoint pair. Returns `None` for self-loops.
    pub fn new(a: NodeId, b: NodeId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { u: a, v: b }),
            std::cmp::Ordering::Greater => Some(Self { u: b, v: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Smaller endpoint
    pub fn u(&self) -> &NodeId {
        &self.u
    }

    /// Larger endpoint
    pub fn v(&self) -> &NodeId {
        &self.v
    }

    /// Signed contribution of an edge influence to `node`
    pub fn contribution_for(&self, node: &NodeId, influence: f64) -> Option<f64> {
        if &self.u == node {
            Some(influence)
        } else if &self.v == node {
            Some(-influence)
        } else {
            None
        }
    }

    /// The endpoint opposite to `node`
    pub fn other(&self, node: &NodeId) -> Option<&NodeId> {
        if &self.u == node {
            Some(&self.v)
        } else if &self.v == node {
            Some(&self.u)
        } else {
            None
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.u, self.v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_canonical_form() {
        assert_eq!(NodeId::parse("007"), NodeId::Numeric(7));
        assert_eq!(NodeId::parse(" 7 "), NodeId::from(7));
        assert_eq!(NodeId::parse("007").to_string(), "7");
        assert_eq!(NodeId::parse("alice"), NodeId::Label("alice".into()));
        assert!(NodeId::parse("  ").is_empty());
    }

    #[test]
    fn test_node_id_order() {
        // Numeric ids compare by value, not lexicographically
        assert!(NodeId::parse("9") < NodeId::parse("10"));
        // Numbers sort before labels
        assert!(NodeId::parse("999") < NodeId::parse("a"));
        assert!(NodeId::parse("abc") < NodeId::parse("abd"));
    }

    #[test]
    fn test_edge_key_canonical() {
        let key = EdgeKey::new(NodeId::from(10), NodeId::from(9)).unwrap();
        assert_eq!(key.u(), &NodeId::from(9));
        assert_eq!(key.v(), &NodeId::from(10));
        assert_eq!(key, EdgeKey::new(NodeId::from(9), NodeId::from(10)).unwrap());
        assert!(EdgeKey::new(NodeId::from(1), NodeId::parse("01")).is_none());
    }

    #[test]
    fn test_contribution_sign_symmetry() {
        let key = EdgeKey::new("a".into(), "b".into()).unwrap();
        let u = key.contribution_for(&"a".into(), 0.4).unwrap();
        let v = key.contribution_for(&"b".into(), 0.4).unwrap();
        assert_eq!(u, -v);
        assert_eq!(key.contribution_for(&"c".into(), 0.4), None);
        assert_eq!(key.other(&"a".into()), Some(&NodeId::from("b")));
    }

    #[test]
    fn test_node_id_serde_as_string() {
        let json = serde_json::to_string(&NodeId::parse("0042")).unwrap();
        assert_eq!(json, "\"42\"");
        let back: NodeId = serde_json::from_str("\"bob\"").unwrap();
        assert_eq!(back, NodeId::Label("bob".into()));
    }
}
