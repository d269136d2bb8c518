//! Tagged document tree for opaque template and override payloads.
//!
//! User-authored templates, parameter values, and override layers travel
//! through the control plane as a [`RawDoc`] rather than being re-parsed at
//! every stage. The tree is lossless against the store's JSON wire form and
//! preserves map key order so rendered output is byte-stable.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A lossless JSON/YAML document tree.
///
/// Maps preserve insertion order. Numbers are split into integer and float
/// variants; a value that arrives as `1` stays an integer through every
/// rendering stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDoc {
    /// JSON null.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar (fits i64).
    Int(i64),
    /// Floating-point scalar.
    Float(f64),
    /// String scalar.
    String(String),
    /// Ordered list of documents.
    List(Vec<RawDoc>),
    /// Order-preserving map of string keys to documents.
    Map(IndexMap<String, RawDoc>),
}

impl Default for RawDoc {
    fn default() -> Self {
        Self::Null
    }
}

impl RawDoc {
    /// An empty map document.
    pub fn empty_map() -> Self {
        Self::Map(IndexMap::new())
    }

    /// Whether this document is `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow as a map, if this is one.
    pub fn as_map(&self) -> Option<&IndexMap<String, RawDoc>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Mutably borrow as a map, if this is one.
    pub fn as_map_mut(&mut self) -> Option<&mut IndexMap<String, RawDoc>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow as a list, if this is one.
    pub fn as_list(&self) -> Option<&[RawDoc]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Borrow as a string scalar, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as a bool scalar, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow as an integer scalar, if this is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Look up a dotted path (`spec.owner.component`) through nested maps.
    ///
    /// Returns `None` as soon as a segment is missing or a non-map is
    /// traversed. List indexing is not supported; field indexes only address
    /// map fields.
    pub fn lookup(&self, dotted_path: &str) -> Option<&RawDoc> {
        let mut current = self;
        for segment in dotted_path.split('.') {
            match current {
                Self::Map(m) => current = m.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Deep merge `other` over `self`, right-hand wins.
    ///
    /// Maps merge key-wise and recurse; every other pairing (including
    /// list-vs-list) is replaced wholesale by the right-hand side.
    pub fn merged(&self, other: &RawDoc) -> RawDoc {
        match (self, other) {
            (Self::Map(left), Self::Map(right)) => {
                let mut out = left.clone();
                for (k, v) in right {
                    let merged = match out.get(k) {
                        Some(existing) => existing.merged(v),
                        None => v.clone(),
                    };
                    out.insert(k.clone(), merged);
                }
                Self::Map(out)
            }
            _ => other.clone(),
        }
    }

    /// A short name for the document's shape, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }
}

impl From<&str> for RawDoc {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for RawDoc {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for RawDoc {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for RawDoc {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> RawDoc {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_roundtrip_preserves_key_order() {
        let doc = parse("z: 1\na: 2\nm: 3\n");
        let json = serde_json::to_string(&doc).unwrap();
        assert_eq!(json, r#"{"z":1,"a":2,"m":3}"#);
    }

    #[test]
    fn test_integers_stay_integers() {
        let doc = parse("count: 1\nratio: 1.5\n");
        let map = doc.as_map().unwrap();
        assert_eq!(map["count"], RawDoc::Int(1));
        assert_eq!(map["ratio"], RawDoc::Float(1.5));
    }

    #[test]
    fn test_lookup_dotted_path() {
        let doc = parse("spec:\n  owner:\n    component: checkout\n");
        assert_eq!(
            doc.lookup("spec.owner.component").and_then(RawDoc::as_str),
            Some("checkout")
        );
        assert!(doc.lookup("spec.owner.missing").is_none());
        assert!(doc.lookup("spec.owner.component.deeper").is_none());
    }

    #[test]
    fn test_merged_right_wins_at_scalars() {
        let left = parse("a: 1\nb:\n  c: 2\n  d: 3\n");
        let right = parse("b:\n  c: 9\ne: 4\n");
        let merged = left.merged(&right);
        assert_eq!(merged.lookup("a"), Some(&RawDoc::Int(1)));
        assert_eq!(merged.lookup("b.c"), Some(&RawDoc::Int(9)));
        assert_eq!(merged.lookup("b.d"), Some(&RawDoc::Int(3)));
        assert_eq!(merged.lookup("e"), Some(&RawDoc::Int(4)));
    }

    #[test]
    fn test_merged_lists_replace() {
        let left = parse("items: [1, 2, 3]\n");
        let right = parse("items: [4]\n");
        let merged = left.merged(&right);
        assert_eq!(
            merged.lookup("items"),
            Some(&RawDoc::List(vec![RawDoc::Int(4)]))
        );
    }

    #[test]
    fn test_merge_associativity() {
        let a = parse("x:\n  p: 1\n  q: 1\n");
        let b = parse("x:\n  q: 2\ny: 2\n");
        let c = parse("x:\n  p: 3\n");
        assert_eq!(a.merged(&b).merged(&c), a.merged(&b.merged(&c)));
    }
}
