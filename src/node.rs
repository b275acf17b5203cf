//! Document addressing: RFC 6901 pointers and the read-only node view.
//!
//! Every finding carries a [`Pointer`] that resolves against the original
//! document, with object keys and zero-based array indices. Validators walk
//! [`DocumentNode`] views and never mutate the underlying tree.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// One step of a pointer: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    /// The reference-token text of this segment, unescaped.
    fn token(&self) -> String {
        match self {
            Segment::Key(k) => k.clone(),
            Segment::Index(i) => i.to_string(),
        }
    }
}

/// An RFC 6901 pointer into a parsed document tree.
///
/// The empty pointer addresses the document root. `Display` produces the
/// standard text form with `~0`/`~1` escaping; numeric reference tokens are
/// array indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Pointer {
    segments: Vec<Segment>,
}

impl Pointer {
    /// Pointer to the document root.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Extend with an object key.
    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key.into()));
        Self { segments }
    }

    /// Extend with an array index.
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        Self { segments }
    }

    /// Resolve this pointer against a document.
    ///
    /// Returns `None` when any step does not exist. Numeric segments address
    /// array positions; against an object they fall back to key lookup so
    /// that numeric object keys remain reachable.
    pub fn resolve<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        let mut current = document;
        for segment in &self.segments {
            current = match (current, segment) {
                (Value::Object(map), seg) => map.get(seg.token().as_str())?,
                (Value::Array(items), Segment::Index(i)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            let token = segment.token();
            let escaped = token.replace('~', "~0").replace('/', "~1");
            write!(f, "/{escaped}")?;
        }
        Ok(())
    }
}

/// Error from parsing a pointer string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid pointer '{text}': {reason}")]
pub struct PointerParseError {
    pub text: String,
    pub reason: String,
}

impl FromStr for Pointer {
    type Err = PointerParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Pointer::root());
        }
        if !s.starts_with('/') {
            return Err(PointerParseError {
                text: s.to_string(),
                reason: "must start with '/'".to_string(),
            });
        }
        let mut segments = Vec::new();
        for token in s[1..].split('/') {
            let unescaped = token.replace("~1", "/").replace("~0", "~");
            // All-digit tokens are array indices; "0" is an index, "01" is not
            // a canonical index per RFC 6901 and stays a key.
            let is_index = !unescaped.is_empty()
                && unescaped.chars().all(|c| c.is_ascii_digit())
                && (unescaped == "0" || !unescaped.starts_with('0'));
            if is_index {
                let index = unescaped.parse::<usize>().map_err(|e| PointerParseError {
                    text: s.to_string(),
                    reason: e.to_string(),
                })?;
                segments.push(Segment::Index(index));
            } else {
                segments.push(Segment::Key(unescaped));
            }
        }
        Ok(Pointer { segments })
    }
}

impl Serialize for Pointer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Pointer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Shape classification of a document node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Scalar,
    Object,
    Sequence,
    Null,
}

impl NodeKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => NodeKind::Null,
            Value::Object(_) => NodeKind::Object,
            Value::Array(_) => NodeKind::Sequence,
            _ => NodeKind::Scalar,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Scalar => "scalar",
            NodeKind::Object => "object",
            NodeKind::Sequence => "array",
            NodeKind::Null => "null",
        }
    }
}

/// An immutable view over one location of a parsed document.
///
/// Carries the value together with the pointer that addresses it, so every
/// check can emit an exact location without re-deriving paths.
#[derive(Debug, Clone)]
pub struct DocumentNode<'a> {
    value: &'a Value,
    pointer: Pointer,
}

impl<'a> DocumentNode<'a> {
    pub fn new(value: &'a Value, pointer: Pointer) -> Self {
        Self { value, pointer }
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }

    pub fn pointer(&self) -> &Pointer {
        &self.pointer
    }

    pub fn kind(&self) -> NodeKind {
        NodeKind::of(self.value)
    }

    /// View of a child value under an object key, if present.
    pub fn child(&self, key: &str) -> Option<DocumentNode<'a>> {
        self.value.get(key).map(|value| DocumentNode {
            value,
            pointer: self.pointer.child(key),
        })
    }

    /// Views over sequence entries, with indexed pointers. Empty for
    /// non-sequence nodes.
    pub fn entries(&self) -> Vec<DocumentNode<'a>> {
        match self.value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, value)| DocumentNode {
                    value,
                    pointer: self.pointer.index(i),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether this node counts as empty: null, empty string, empty
    /// sequence or empty object.
    pub fn is_empty(&self) -> bool {
        value_is_empty(self.value)
    }
}

/// Emptiness rule shared by the structural validator and the rule engine.
pub fn value_is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_pointer_display_and_escaping() {
        let p = Pointer::root().child("a/b").child("m~n").index(3);
        assert_eq!(p.to_string(), "/a~1b/m~0n/3");
    }

    #[test]
    fn test_pointer_parse_round_trip() {
        let text = "/entry/0/resource/name/1/given/0";
        let p: Pointer = text.parse().unwrap();
        assert_eq!(p.to_string(), text);
    }

    #[test]
    fn test_pointer_resolve() {
        let doc = json!({"name": [{"given": ["Peter", "James"]}], "gender": "male"});
        let p = Pointer::root().child("name").index(0).child("given").index(1);
        assert_eq!(p.resolve(&doc), Some(&json!("James")));
        assert_eq!(Pointer::root().child("gender").resolve(&doc), Some(&json!("male")));
        assert_eq!(Pointer::root().child("missing").resolve(&doc), None);
    }

    #[test]
    fn test_pointer_resolve_numeric_object_key() {
        let doc = json!({"0": "zero"});
        let p: Pointer = "/0".parse().unwrap();
        assert_eq!(p.resolve(&doc), Some(&json!("zero")));
    }

    #[test]
    fn test_node_kind() {
        assert_eq!(NodeKind::of(&json!([])), NodeKind::Sequence);
        assert_eq!(NodeKind::of(&json!({})), NodeKind::Object);
        assert_eq!(NodeKind::of(&json!("x")), NodeKind::Scalar);
        assert_eq!(NodeKind::of(&json!(null)), NodeKind::Null);
    }

    #[test]
    fn test_document_node_view() {
        let doc = json!({"name": [{"family": "Doe"}], "note": ""});
        let root = DocumentNode::new(&doc, Pointer::root());
        assert_eq!(root.kind(), NodeKind::Object);
        assert!(!root.is_empty());
        assert!(root.child("missing").is_none());

        let note = root.child("note").unwrap();
        assert!(note.is_empty());
        assert_eq!(note.pointer().to_string(), "/note");
        assert_eq!(note.value(), &json!(""));

        let entries = root.child("name").unwrap().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pointer().to_string(), "/name/0");
        assert!(note.entries().is_empty());
    }

    #[test]
    fn test_value_is_empty() {
        assert!(value_is_empty(&json!(null)));
        assert!(value_is_empty(&json!("")));
        assert!(value_is_empty(&json!([])));
        assert!(!value_is_empty(&json!(false)));
        assert!(!value_is_empty(&json!(0)));
    }

    proptest::proptest! {
        #[test]
        fn pointer_text_round_trips(keys in proptest::collection::vec("[a-z~/]{1,8}", 0..5)) {
            let mut p = Pointer::root();
            for k in &keys {
                p = p.child(k.clone());
            }
            let parsed: Pointer = p.to_string().parse().unwrap();
            proptest::prop_assert_eq!(parsed.to_string(), p.to_string());
        }
    }
}
