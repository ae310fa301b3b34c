//! Normalizes scraped dictionary entries into a flat word graph.
//!
//! Source fetcher output ([`WordEntry`]) goes through the [`RowBuilder`],
//! which flattens nested definitions and assigns content-derived ids, then
//! through the [`GraphAssembler`], which collects rows from many entries into
//! dependency-ordered batches for a [`Store`].

// Declare modules
pub mod assembler;
pub mod builder;
pub mod db;
pub mod error;
pub mod flatten;
pub mod identity;
pub mod models;
pub mod node;
pub mod progress;
pub mod source;
pub mod store;

// Re-export key types for easier use
pub use assembler::{AssemblyStats, GraphAssembler, GraphBatch, GraphBatches};
pub use builder::{EntryRows, RowBuilder};
pub use db::SqliteStore;
pub use error::{LexGraphError, Result};
pub use flatten::{FlatRow, Flattener};
pub use identity::{DEFAULT_TEXT_PREFIX_LEN, IdentityHasher, Part, normalize_tag};
pub use models::{
    AppendixLink,
    DefinitionRecord,
    Family,
    RelationshipEdge,
    WordEntry,
    WordRecord,
};
pub use node::Node;
pub use store::{BatchWriter, MemoryStore, PersistSummary, Store, persist};

use log::info;
use progress::ProgressCallback;

/// Options for an ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Characters of definition text that take part in definition ids.
    pub text_prefix_len: usize,
    /// Build rows on the rayon pool instead of one entry after another.
    pub parallel: bool,
    /// Erase all stored rows before writing.
    pub erase_first: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions {
            text_prefix_len: DEFAULT_TEXT_PREFIX_LEN,
            parallel: false,
            erase_first: false,
        }
    }
}

/// Outcome of [`ingest`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub assembly: AssemblyStats,
    pub persisted: PersistSummary,
}

/// Runs the whole pipeline over `entries` and writes the result to `store`.
///
/// Entry-level problems are logged and counted in the report. Only store
/// failures abort the run, in which case nothing of this run is kept.
pub fn ingest<S: Store>(
    store: &mut S,
    entries: &[WordEntry],
    options: &IngestOptions,
    progress: Option<&mut ProgressCallback>,
) -> Result<IngestReport> {
    if options.text_prefix_len == 0 {
        return Err(LexGraphError::InvalidArgument(
            "text prefix length must be at least 1".to_string(),
        ));
    }
    let builder = RowBuilder::new(IdentityHasher::new(options.text_prefix_len));

    let assembler = if options.parallel {
        GraphAssembler::assemble_parallel(&builder, entries)
    } else {
        GraphAssembler::assemble(&builder, entries)
    };
    let assembly = assembler.stats();
    let batches = assembler.into_batches();

    if options.erase_first {
        info!("Erase requested. Clearing existing graph before writing...");
        store.erase()?;
    }
    let persisted = persist(store, &batches, progress)?;

    info!(
        "Ingested {} entries ({} dropped, {} elements skipped).",
        assembly.entries, assembly.dropped_entries, assembly.skipped_elements
    );
    Ok(IngestReport { assembly, persisted })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_into_memory_store() {
        let entries = source::parse_entries(
            r#"[{"word": "run", "language": "en", "definitions": [{
                    "partOfSpeech": "verb", "text": {"raw_text": "to move fast"},
                    "appendix_tags": ["Verb"],
                    "relatedWords": [{"relationshipType": "synonym", "words": "sprint"}]}]},
                {"language": "en"}]"#,
        )
        .unwrap();
        let mut store = MemoryStore::new();
        let report = ingest(&mut store, &entries, &IngestOptions::default(), None).unwrap();
        assert_eq!(report.assembly.entries, 2);
        assert_eq!(report.assembly.dropped_entries, 1);
        assert_eq!(report.persisted.inserted(), 4);
        assert!(store.words.contains_key(&IdentityHasher::default().word_id("run")));
    }

    #[test]
    fn test_ingest_rejects_zero_prefix() {
        let options = IngestOptions {
            text_prefix_len: 0,
            ..IngestOptions::default()
        };
        let err = ingest(&mut MemoryStore::new(), &[], &options, None).unwrap_err();
        assert!(matches!(err, LexGraphError::InvalidArgument(_)));
    }

    #[test]
    fn test_erase_first_replaces_previous_run() {
        let first = source::parse_entries(r#"[{"word": "run"}]"#).unwrap();
        let second = source::parse_entries(r#"[{"word": "walk"}]"#).unwrap();
        let mut store = MemoryStore::new();
        ingest(&mut store, &first, &IngestOptions::default(), None).unwrap();
        let options = IngestOptions {
            erase_first: true,
            ..IngestOptions::default()
        };
        ingest(&mut store, &second, &options, None).unwrap();
        assert_eq!(store.words.len(), 1);
        assert_eq!(store.words.values().next().unwrap().word, "walk");
    }
}
