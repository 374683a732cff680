//! Parse tree produced by the external SQL parser
//!
//! The tree is a closed tagged variant. JSON objects keep their key order,
//! which matters because alias and qualifier handling depend on sibling order.

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Immutable parse tree node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedTree {
    /// Terminal token text
    Leaf(String),

    /// Ordered sequence of nodes
    List(Vec<ParsedTree>),

    /// Ordered key/value pairs
    Map(Vec<(String, ParsedTree)>),
}

impl ParsedTree {
    /// Create a leaf node
    pub fn leaf(value: impl Into<String>) -> Self {
        Self::Leaf(value.into())
    }

    /// Create a list node
    pub fn list(items: impl IntoIterator<Item = ParsedTree>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Create a map node from ordered entries
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, ParsedTree)>) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Leaf text, if this is a leaf
    pub fn as_leaf(&self) -> Option<&str> {
        match self {
            Self::Leaf(value) => Some(value),
            _ => None,
        }
    }

    /// First value stored under `key`, if this is a map
    pub fn get(&self, key: &str) -> Option<&ParsedTree> {
        match self {
            Self::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Keys of a map node in order (empty for leaves and lists)
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Self::Map(entries) => entries.iter().map(|(k, _)| k.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Short name of the node shape, used in error messages
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Leaf(_) => "leaf",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Compact JSON form with original key order
    pub fn to_canonical_json(&self) -> String {
        // Serializing a ParsedTree into a string cannot fail: every variant maps to plain JSON.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Hex encoded SHA-256 of the canonical JSON form
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_canonical_json().as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl Serialize for ParsedTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Leaf(value) => serializer.serialize_str(value),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

struct ParsedTreeVisitor;

impl<'de> Visitor<'de> for ParsedTreeVisitor {
    type Value = ParsedTree;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number, boolean, array or object")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<ParsedTree, E> {
        Ok(ParsedTree::Leaf(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<ParsedTree, E> {
        Ok(ParsedTree::Leaf(value))
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<ParsedTree, E> {
        Ok(ParsedTree::Leaf(value.to_string()))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<ParsedTree, E> {
        Ok(ParsedTree::Leaf(value.to_string()))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<ParsedTree, E> {
        Ok(ParsedTree::Leaf(value.to_string()))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<ParsedTree, E> {
        Ok(ParsedTree::Leaf(value.to_string()))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<ParsedTree, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<ParsedTree>()? {
            items.push(item);
        }
        Ok(ParsedTree::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ParsedTree, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, ParsedTree>()? {
            entries.push((key, value));
        }
        Ok(ParsedTree::Map(entries))
    }
}

impl<'de> Deserialize<'de> for ParsedTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ParsedTreeVisitor)
    }
}
