use crate::node::Node;
use serde::{Deserialize, Serialize};

// --- Source fetcher input ---

/// One scraped word as produced by the source fetcher.
///
/// Top-level fields are typed. `definitions` stays a [`Node`] because its
/// elements vary in shape and are validated one by one.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WordEntry {
    #[serde(default)]
    pub word: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub etymology: Option<String>,
    #[serde(default)]
    pub definitions: Node,
}

// --- Row families ---

/// Row of the `words` table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WordRecord {
    pub id: String,
    pub word: String,
    pub query: String,
    pub language: Option<String>,
    pub etymology: Option<String>,
}

/// Row of the `definitions` table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DefinitionRecord {
    pub id: String,
    #[serde(rename = "wordId")]
    pub word_id: String,
    #[serde(rename = "partOfSpeech")]
    pub part_of_speech: String,
    pub text: String,
    pub headword: String,
}

/// Many-to-many link between a definition and an appendix tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppendixLink {
    #[serde(rename = "definitionId")]
    pub definition_id: String,
    #[serde(rename = "appendixId")]
    pub appendix_id: String,
    /// Normalized tag label. Not a column of the link itself.
    #[serde(skip)]
    pub label: String,
}

impl AppendixLink {
    pub fn key(&self) -> (&str, &str) {
        (&self.definition_id, &self.appendix_id)
    }
}

/// Directed edge from a definition to a target word.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipEdge {
    #[serde(rename = "headDefinitionId")]
    pub head_definition_id: String,
    /// Id of the target word, computed exactly like [`WordRecord::id`].
    #[serde(rename = "wordId")]
    pub word_id: String,
    #[serde(rename = "relationshipType")]
    pub relationship_type: String,
}

/// The four row families, in the order they must reach the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Words,
    Definitions,
    AppendixLinks,
    RelationshipEdges,
}

impl Family {
    pub const DEPENDENCY_ORDER: [Family; 4] = [
        Family::Words,
        Family::Definitions,
        Family::AppendixLinks,
        Family::RelationshipEdges,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Family::Words => "words",
            Family::Definitions => "definitions",
            Family::AppendixLinks => "appendix links",
            Family::RelationshipEdges => "relationship edges",
        }
    }

    /// Column names as they appear in the serialized records.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Family::Words => &["id", "word", "query", "language", "etymology"],
            Family::Definitions => &["id", "wordId", "partOfSpeech", "text", "headword"],
            Family::AppendixLinks => &["definitionId", "appendixId"],
            Family::RelationshipEdges => &["headDefinitionId", "wordId", "relationshipType"],
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn keys(value: Value) -> Vec<String> {
        let mut keys: Vec<String> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn sorted(cols: &[&str]) -> Vec<String> {
        let mut cols: Vec<String> = cols.iter().map(|c| c.to_string()).collect();
        cols.sort();
        cols
    }

    #[test]
    fn test_serialized_keys_match_columns() {
        let word = WordRecord {
            id: "w".into(),
            word: "run".into(),
            query: "run".into(),
            language: Some("en".into()),
            etymology: None,
        };
        let def = DefinitionRecord {
            id: "d".into(),
            word_id: "w".into(),
            part_of_speech: "verb".into(),
            text: "to move fast".into(),
            headword: "run".into(),
        };
        let link = AppendixLink {
            definition_id: "d".into(),
            appendix_id: "a".into(),
            label: "verb".into(),
        };
        let edge = RelationshipEdge {
            head_definition_id: "d".into(),
            word_id: "t".into(),
            relationship_type: "synonym".into(),
        };
        assert_eq!(keys(serde_json::to_value(word).unwrap()), sorted(Family::Words.columns()));
        assert_eq!(keys(serde_json::to_value(def).unwrap()), sorted(Family::Definitions.columns()));
        assert_eq!(keys(serde_json::to_value(link).unwrap()), sorted(Family::AppendixLinks.columns()));
        assert_eq!(
            keys(serde_json::to_value(edge).unwrap()),
            sorted(Family::RelationshipEdges.columns())
        );
    }

    #[test]
    fn test_word_entry_defaults() {
        let entry: WordEntry = serde_json::from_str(r#"{"word": "run"}"#).unwrap();
        assert_eq!(entry.word.as_deref(), Some("run"));
        assert!(entry.query.is_none());
        assert!(entry.definitions.is_null());
    }
}
