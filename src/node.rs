//! Loosely shaped scraper output.
//!
//! The source fetcher emits nested dictionaries and lists whose shape varies
//! from word to word. Everything below the top-level entry fields is kept as a
//! [`Node`] tree and only interpreted by the row builder.

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum Node {
    #[default]
    Null,
    Scalar(String),
    Mapping(BTreeMap<String, Node>),
    Sequence(Vec<Node>),
}

impl Node {
    /// Builds a mapping node from `(key, value)` pairs.
    pub fn mapping<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Node)>,
    {
        Node::Mapping(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn scalar(value: impl Into<String>) -> Self {
        Node::Scalar(value.into())
    }

    /// Field lookup on a mapping. Anything else has no fields.
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Mapping(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Scalar(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    /// Short label for log messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Scalar(_) => "scalar",
            Node::Mapping(_) => "mapping",
            Node::Sequence(_) => "sequence",
        }
    }
}

impl From<serde_json::Value> for Node {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Scalar(b.to_string()),
            Value::Number(n) => Node::Scalar(n.to_string()),
            Value::String(s) => Node::Scalar(s),
            Value::Array(items) => Node::Sequence(items.into_iter().map(Node::from).collect()),
            Value::Object(map) => {
                Node::Mapping(map.into_iter().map(|(k, v)| (k, Node::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::Scalar(value.to_string())
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::Sequence(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_keeps_shape() {
        let node: Node = serde_json::from_str(
            r#"{"partOfSpeech": "verb", "rank": 3, "flag": true, "tags": ["a", null], "x": null}"#,
        )
        .unwrap();
        assert_eq!(node.get("partOfSpeech").and_then(Node::as_str), Some("verb"));
        assert_eq!(node.get("rank").and_then(Node::as_str), Some("3"));
        assert_eq!(node.get("flag").and_then(Node::as_str), Some("true"));
        assert_eq!(
            node.get("tags"),
            Some(&Node::Sequence(vec![Node::scalar("a"), Node::Null]))
        );
        assert!(node.get("x").unwrap().is_null());
        assert!(node.get("missing").is_none());
    }

    #[test]
    fn test_get_on_non_mapping() {
        assert!(Node::scalar("run").get("word").is_none());
        assert_eq!(Node::Sequence(vec![]).kind(), "sequence");
    }
}
