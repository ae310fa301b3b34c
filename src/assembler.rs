//! Accumulates entry rows into dependency-ordered batches.

use crate::builder::{EntryRows, RowBuilder};
use crate::error::{LexGraphError, Result};
use crate::models::{AppendixLink, DefinitionRecord, Family, RelationshipEdge, WordEntry, WordRecord};
use log::{debug, error, info};
use rayon::prelude::*;
use std::collections::HashSet;

/// Counters gathered while assembling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblyStats {
    pub entries: usize,
    /// Entries dropped for lack of a surface form.
    pub dropped_entries: usize,
    /// Malformed elements skipped inside otherwise valid entries.
    pub skipped_elements: usize,
    /// Rows that collapsed onto an identifier already assembled.
    pub collapsed_rows: usize,
}

impl AssemblyStats {
    fn merge(&mut self, other: AssemblyStats) {
        self.entries += other.entries;
        self.dropped_entries += other.dropped_entries;
        self.skipped_elements += other.skipped_elements;
        self.collapsed_rows += other.collapsed_rows;
    }
}

/// Append-only collection of the four row families.
///
/// Words, definitions and appendix links collapse on their keys, first
/// occurrence wins. Relationship edges have no key of their own and are kept
/// as produced; the store ignores repeats.
#[derive(Debug, Default)]
pub struct GraphAssembler {
    words: Vec<WordRecord>,
    definitions: Vec<DefinitionRecord>,
    appendix_links: Vec<AppendixLink>,
    relationship_edges: Vec<RelationshipEdge>,
    word_ids: HashSet<String>,
    definition_ids: HashSet<String>,
    link_keys: HashSet<(String, String)>,
    stats: AssemblyStats,
}

impl GraphAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> AssemblyStats {
        self.stats
    }

    /// Builds one entry and appends its rows. A dropped entry leaves the
    /// assembler untouched apart from the counters.
    pub fn add_entry(&mut self, builder: &RowBuilder, entry: &WordEntry) {
        self.stats.entries += 1;
        match builder.build(entry) {
            Ok(rows) => self.push(rows),
            Err(e) => {
                error!("Dropping word entry: {}", e);
                self.stats.dropped_entries += 1;
            }
        }
    }

    /// Appends a fully built entry. The word goes in before anything that
    /// references it.
    pub fn push(&mut self, rows: EntryRows) {
        let EntryRows {
            word,
            definitions,
            appendix_links,
            relationship_edges,
            skipped,
        } = rows;
        self.stats.skipped_elements += skipped;
        self.absorb(vec![word], definitions, appendix_links, relationship_edges);
    }

    /// Folds another assembler (e.g. a worker's output) into this one.
    /// Shared identifiers collapse; encounter order is this one's, then the
    /// other's.
    pub fn merge(&mut self, other: GraphAssembler) {
        let GraphAssembler {
            words,
            definitions,
            appendix_links,
            relationship_edges,
            stats,
            ..
        } = other;
        self.stats.merge(stats);
        self.absorb(words, definitions, appendix_links, relationship_edges);
    }

    fn absorb(
        &mut self,
        words: Vec<WordRecord>,
        definitions: Vec<DefinitionRecord>,
        appendix_links: Vec<AppendixLink>,
        relationship_edges: Vec<RelationshipEdge>,
    ) {
        for word in words {
            if self.word_ids.insert(word.id.clone()) {
                self.words.push(word);
            } else {
                self.stats.collapsed_rows += 1;
            }
        }
        for definition in definitions {
            if self.definition_ids.insert(definition.id.clone()) {
                self.definitions.push(definition);
            } else {
                self.stats.collapsed_rows += 1;
            }
        }
        for link in appendix_links {
            if self
                .link_keys
                .insert((link.definition_id.clone(), link.appendix_id.clone()))
            {
                self.appendix_links.push(link);
            } else {
                self.stats.collapsed_rows += 1;
            }
        }
        self.relationship_edges.extend(relationship_edges);
    }

    /// Assembles entries one after another.
    pub fn assemble<'a, I>(builder: &RowBuilder, entries: I) -> GraphAssembler
    where
        I: IntoIterator<Item = &'a WordEntry>,
    {
        let mut assembler = GraphAssembler::new();
        for entry in entries {
            assembler.add_entry(builder, entry);
        }
        info!("Assembled {} entries sequentially.", assembler.stats.entries);
        assembler
    }

    /// Assembles entries across the rayon pool. Each worker fills its own
    /// assembler; the results are merged afterwards.
    pub fn assemble_parallel(builder: &RowBuilder, entries: &[WordEntry]) -> GraphAssembler {
        let assembler = entries
            .par_iter()
            .fold(GraphAssembler::new, |mut acc, entry| {
                acc.add_entry(builder, entry);
                acc
            })
            .reduce(GraphAssembler::new, |mut left, right| {
                left.merge(right);
                left
            });
        info!(
            "Assembled {} entries on {} threads.",
            assembler.stats.entries,
            rayon::current_num_threads()
        );
        assembler
    }

    pub fn into_batches(self) -> GraphBatches {
        debug!(
            "Batches: {} words, {} definitions, {} appendix links, {} edges",
            self.words.len(),
            self.definitions.len(),
            self.appendix_links.len(),
            self.relationship_edges.len()
        );
        GraphBatches {
            words: self.words,
            definitions: self.definitions,
            appendix_links: self.appendix_links,
            relationship_edges: self.relationship_edges,
        }
    }
}

/// Assembled rows, ready for the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphBatches {
    pub words: Vec<WordRecord>,
    pub definitions: Vec<DefinitionRecord>,
    pub appendix_links: Vec<AppendixLink>,
    pub relationship_edges: Vec<RelationshipEdge>,
}

/// A borrowed slice of one row family.
#[derive(Debug, Clone, Copy)]
pub enum GraphBatch<'a> {
    Words(&'a [WordRecord]),
    Definitions(&'a [DefinitionRecord]),
    AppendixLinks(&'a [AppendixLink]),
    RelationshipEdges(&'a [RelationshipEdge]),
}

impl<'a> GraphBatch<'a> {
    pub fn family(&self) -> Family {
        match self {
            GraphBatch::Words(_) => Family::Words,
            GraphBatch::Definitions(_) => Family::Definitions,
            GraphBatch::AppendixLinks(_) => Family::AppendixLinks,
            GraphBatch::RelationshipEdges(_) => Family::RelationshipEdges,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            GraphBatch::Words(rows) => rows.len(),
            GraphBatch::Definitions(rows) => rows.len(),
            GraphBatch::AppendixLinks(rows) => rows.len(),
            GraphBatch::RelationshipEdges(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits the batch into chunks of at most `size` rows, keeping the family.
    pub fn chunks(self, size: usize) -> Vec<GraphBatch<'a>> {
        let size = size.max(1);
        match self {
            GraphBatch::Words(rows) => rows.chunks(size).map(GraphBatch::Words).collect(),
            GraphBatch::Definitions(rows) => rows.chunks(size).map(GraphBatch::Definitions).collect(),
            GraphBatch::AppendixLinks(rows) => {
                rows.chunks(size).map(GraphBatch::AppendixLinks).collect()
            }
            GraphBatch::RelationshipEdges(rows) => {
                rows.chunks(size).map(GraphBatch::RelationshipEdges).collect()
            }
        }
    }
}

impl GraphBatches {
    /// The four families, referenced rows strictly before referencing ones.
    pub fn in_dependency_order(&self) -> [GraphBatch<'_>; 4] {
        [
            GraphBatch::Words(&self.words),
            GraphBatch::Definitions(&self.definitions),
            GraphBatch::AppendixLinks(&self.appendix_links),
            GraphBatch::RelationshipEdges(&self.relationship_edges),
        ]
    }

    pub fn total_rows(&self) -> usize {
        self.words.len()
            + self.definitions.len()
            + self.appendix_links.len()
            + self.relationship_edges.len()
    }

    /// Checks that every definition points at an assembled word and every
    /// link or edge hangs off an assembled definition. Edge targets may be
    /// words that were never scraped and are not checked.
    pub fn check_referential_order(&self) -> Result<()> {
        let word_ids: HashSet<&str> = self.words.iter().map(|w| w.id.as_str()).collect();
        if let Some(d) = self
            .definitions
            .iter()
            .find(|d| !word_ids.contains(d.word_id.as_str()))
        {
            return Err(LexGraphError::IntegrityViolation(format!(
                "definition {} references unknown word {}",
                d.id, d.word_id
            )));
        }

        let definition_ids: HashSet<&str> =
            self.definitions.iter().map(|d| d.id.as_str()).collect();
        if let Some(l) = self
            .appendix_links
            .iter()
            .find(|l| !definition_ids.contains(l.definition_id.as_str()))
        {
            return Err(LexGraphError::IntegrityViolation(format!(
                "appendix link references unknown definition {}",
                l.definition_id
            )));
        }
        if let Some(e) = self
            .relationship_edges
            .iter()
            .find(|e| !definition_ids.contains(e.head_definition_id.as_str()))
        {
            return Err(LexGraphError::IntegrityViolation(format!(
                "edge references unknown definition {}",
                e.head_definition_id
            )));
        }
        Ok(())
    }
}
