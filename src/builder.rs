//! Turns one scraped word entry into rows.

use crate::error::{LexGraphError, Result};
use crate::flatten::{FlatRow, Flattener, KEY_SEPARATOR};
use crate::identity::{IdentityHasher, normalize_tag};
use crate::models::{AppendixLink, DefinitionRecord, RelationshipEdge, WordEntry, WordRecord};
use crate::node::Node;
use log::{debug, warn};
use std::collections::HashSet;

/// Fields of a definition that are consumed upstream and never stored.
const DISCARDED_FIELDS: [&str; 2] = ["examples", "categories"];

/// Rows produced from a single word entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryRows {
    pub word: WordRecord,
    pub definitions: Vec<DefinitionRecord>,
    pub appendix_links: Vec<AppendixLink>,
    pub relationship_edges: Vec<RelationshipEdge>,
    /// Elements or flattened rows dropped as malformed.
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct RowBuilder {
    hasher: IdentityHasher,
    definition_flattener: Flattener,
    relation_flattener: Flattener,
}

impl Default for RowBuilder {
    fn default() -> Self {
        RowBuilder::new(IdentityHasher::default())
    }
}

impl RowBuilder {
    pub fn new(hasher: IdentityHasher) -> Self {
        RowBuilder {
            hasher,
            definition_flattener: Flattener::merging(["text"]),
            relation_flattener: Flattener::new(),
        }
    }

    pub fn hasher(&self) -> &IdentityHasher {
        &self.hasher
    }

    /// Builds all rows of one entry.
    ///
    /// Fails only with [`LexGraphError::MissingIdentity`]. Malformed
    /// definitions, tags and relations are logged, counted and skipped.
    pub fn build(&self, entry: &WordEntry) -> Result<EntryRows> {
        let word = self.word_record(entry)?;
        let mut rows = EntryRows {
            word,
            definitions: Vec::new(),
            appendix_links: Vec::new(),
            relationship_edges: Vec::new(),
            skipped: 0,
        };

        let elements: &[Node] = match &entry.definitions {
            Node::Sequence(items) => items,
            Node::Null => &[],
            other => {
                warn!(
                    "Definitions of '{}' are a {}, expected a sequence; skipping them.",
                    rows.word.word,
                    other.kind()
                );
                rows.skipped += 1;
                &[]
            }
        };

        let mut seen_definitions = HashSet::new();
        let mut seen_links = HashSet::new();
        for (index, element) in elements.iter().enumerate() {
            let context = format!("definition #{} of '{}'", index, rows.word.word);
            if let Err(e) = self.add_definition_element(
                element,
                &context,
                &mut rows,
                &mut seen_definitions,
                &mut seen_links,
            ) {
                warn!("Skipping element: {}", e);
                rows.skipped += 1;
            }
        }

        debug!(
            "Built '{}': {} definitions, {} appendix links, {} edges, {} skipped",
            rows.word.word,
            rows.definitions.len(),
            rows.appendix_links.len(),
            rows.relationship_edges.len(),
            rows.skipped
        );
        Ok(rows)
    }

    fn word_record(&self, entry: &WordEntry) -> Result<WordRecord> {
        let surface = entry
            .word
            .as_deref()
            .map(surface_form)
            .filter(|w| !w.is_empty())
            .ok_or_else(|| {
                LexGraphError::MissingIdentity(format!(
                    "query={:?} language={:?}",
                    entry.query, entry.language
                ))
            })?;

        Ok(WordRecord {
            id: self.hasher.word_id(surface),
            word: surface.to_string(),
            query: entry
                .query
                .clone()
                .unwrap_or_else(|| surface.to_string()),
            language: entry.language.clone(),
            etymology: entry.etymology.clone(),
        })
    }

    fn add_definition_element(
        &self,
        element: &Node,
        context: &str,
        rows: &mut EntryRows,
        seen_definitions: &mut HashSet<String>,
        seen_links: &mut HashSet<(String, String)>,
    ) -> Result<()> {
        if !matches!(element, Node::Mapping(_)) {
            return Err(LexGraphError::malformed(
                context,
                format!("expected a mapping, found a {}", element.kind()),
            ));
        }
        let part_of_speech = element
            .get("partOfSpeech")
            .and_then(Node::as_str)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| LexGraphError::malformed(context, "missing partOfSpeech"))?;

        let shaped = Node::mapping([
            ("wordId", Node::scalar(rows.word.id.as_str())),
            ("partOfSpeech", Node::scalar(part_of_speech)),
            ("text", element.get("text").cloned().unwrap_or_default()),
        ]);

        // Definition ids of this element, in order, without repeats.
        let mut element_definitions: Vec<String> = Vec::new();
        for mut flat in self.definition_flattener.flatten(&shaped) {
            discard_fields(&mut flat);
            // The merged text payload may carry its own partOfSpeech; the
            // element-level value checked above is the one that is stored.
            flat.insert("partOfSpeech".to_string(), part_of_speech.to_string());
            match self.definition_record(&flat, &rows.word) {
                Some(definition) => {
                    if !element_definitions.contains(&definition.id) {
                        element_definitions.push(definition.id.clone());
                    }
                    if seen_definitions.insert(definition.id.clone()) {
                        rows.definitions.push(definition);
                    }
                }
                None => {
                    warn!("Skipping row of {}: no raw_text", context);
                    rows.skipped += 1;
                }
            }
        }
        if element_definitions.is_empty() {
            return Ok(());
        }

        for label in self.appendix_labels(element, context, &mut rows.skipped) {
            let appendix_id = self.hasher.appendix_id(&label);
            for definition_id in &element_definitions {
                if seen_links.insert((definition_id.clone(), appendix_id.clone())) {
                    rows.appendix_links.push(AppendixLink {
                        definition_id: definition_id.clone(),
                        appendix_id: appendix_id.clone(),
                        label: label.clone(),
                    });
                }
            }
        }

        for related in self.related_entries(element, context, &mut rows.skipped) {
            for flat in self.relation_flattener.flatten(related) {
                let Some((relationship_type, target)) = relation_fields(&flat) else {
                    warn!(
                        "Skipping related word of {}: needs relationshipType and words",
                        context
                    );
                    rows.skipped += 1;
                    continue;
                };
                let target_id = self.hasher.word_id(target);
                for definition_id in &element_definitions {
                    rows.relationship_edges.push(RelationshipEdge {
                        head_definition_id: definition_id.clone(),
                        word_id: target_id.clone(),
                        relationship_type: relationship_type.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn definition_record(&self, flat: &FlatRow, word: &WordRecord) -> Option<DefinitionRecord> {
        let part_of_speech = flat.get("partOfSpeech")?;
        // A bare string payload lands in `text` with no `raw_text` beside it.
        let raw_text = flat
            .get("raw_text")
            .or_else(|| flat.get("text"))
            .filter(|t| !t.trim().is_empty())?;
        let text = flat.get("text").unwrap_or(raw_text);
        let headword = flat
            .get("headword")
            .map(String::as_str)
            .unwrap_or(word.word.as_str());

        Some(DefinitionRecord {
            id: self
                .hasher
                .definition_id(&word.id, part_of_speech, raw_text),
            word_id: word.id.clone(),
            part_of_speech: part_of_speech.clone(),
            text: text.clone(),
            headword: headword.to_string(),
        })
    }

    /// Mapping-shaped entries of `relatedWords`. Anything else has no
    /// relationship type and is counted as skipped.
    fn related_entries<'n>(
        &self,
        element: &'n Node,
        context: &str,
        skipped: &mut usize,
    ) -> Vec<&'n Node> {
        let items: &[Node] = match element.get("relatedWords") {
            Some(Node::Sequence(items)) => items,
            Some(mapping @ Node::Mapping(_)) => return vec![mapping],
            Some(Node::Scalar(_)) => {
                warn!("Skipping relatedWords of {}: not a sequence", context);
                *skipped += 1;
                &[]
            }
            Some(Node::Null) | None => &[],
        };

        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Node::Mapping(_) => entries.push(item),
                Node::Null => {}
                other => {
                    warn!(
                        "Skipping related word of {}: expected a mapping, found a {}",
                        context,
                        other.kind()
                    );
                    *skipped += 1;
                }
            }
        }
        entries
    }

    /// Normalized, de-duplicated appendix tags of a definition element.
    fn appendix_labels(&self, element: &Node, context: &str, skipped: &mut usize) -> Vec<String> {
        let tags: &[Node] = match element.get("appendix_tags") {
            Some(Node::Sequence(items)) => items,
            Some(Node::Scalar(_)) | Some(Node::Mapping(_)) => {
                warn!("Skipping appendix_tags of {}: not a sequence", context);
                *skipped += 1;
                &[]
            }
            Some(Node::Null) | None => &[],
        };

        let mut labels: Vec<String> = Vec::new();
        for tag in tags {
            let label = tag.as_str().map(normalize_tag).unwrap_or_default();
            if label.is_empty() {
                debug!("Ignoring empty or non-text appendix tag in {}", context);
                *skipped += 1;
                continue;
            }
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        labels
    }
}

/// Surface form used for word identity, both for entries and relation targets.
pub fn surface_form(word: &str) -> &str {
    word.trim()
}

fn discard_fields(row: &mut FlatRow) {
    row.retain(|key, _| {
        !DISCARDED_FIELDS.iter().any(|field| {
            key == field
                || key
                    .strip_prefix(field)
                    .is_some_and(|rest| rest.starts_with(KEY_SEPARATOR))
        })
    });
}

fn relation_fields(row: &FlatRow) -> Option<(&str, &str)> {
    let relationship_type = row
        .get("relationshipType")
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())?;
    let target = row
        .get("words")
        .or_else(|| row.get(&format!("words{KEY_SEPARATOR}word")))
        .map(|w| surface_form(w))
        .filter(|w| !w.is_empty())?;
    Some((relationship_type, target))
}
