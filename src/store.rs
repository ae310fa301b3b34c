//! Persistence seam.
//!
//! The pipeline never talks SQL. It hands dependency-ordered batches to a
//! [`Store`], which applies them with insert-or-ignore semantics inside one
//! scoped unit of work.

use crate::assembler::{GraphBatch, GraphBatches};
use crate::error::{LexGraphError, Result};
use crate::models::{DefinitionRecord, Family, WordRecord};
use crate::progress::{ProgressCallback, ProgressUpdate, report};
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

/// Rows per insert call.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Write access handed out for the duration of a unit of work.
pub trait BatchWriter {
    /// Inserts the rows of one batch, silently skipping rows whose key is
    /// already stored. Returns the number of rows actually inserted.
    fn insert_or_ignore(&mut self, batch: GraphBatch<'_>) -> Result<usize>;
}

pub trait Store {
    /// Runs `work` inside one unit of work. Commits when `work` succeeds and
    /// rolls back on every error path.
    fn transaction<T, F>(&mut self, work: F) -> Result<T>
    where
        F: FnOnce(&mut dyn BatchWriter) -> Result<T>;

    /// Removes every stored row of the graph.
    fn erase(&mut self) -> Result<()>;
}

/// Rows inserted per family by one [`persist`] call. Rows that already
/// existed are counted in `ignored`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub words: usize,
    pub definitions: usize,
    pub appendix_links: usize,
    pub relationship_edges: usize,
    pub ignored: usize,
}

impl PersistSummary {
    fn record(&mut self, family: Family, inserted: usize, offered: usize) {
        match family {
            Family::Words => self.words += inserted,
            Family::Definitions => self.definitions += inserted,
            Family::AppendixLinks => self.appendix_links += inserted,
            Family::RelationshipEdges => self.relationship_edges += inserted,
        }
        self.ignored += offered.saturating_sub(inserted);
    }

    pub fn inserted(&self) -> usize {
        self.words + self.definitions + self.appendix_links + self.relationship_edges
    }
}

/// Writes all four families to `store`, words first, in one unit of work.
///
/// Any failure, including a cancellation requested through `progress`, rolls
/// the whole unit back.
pub fn persist<S: Store>(
    store: &mut S,
    batches: &GraphBatches,
    mut progress: Option<&mut ProgressCallback>,
) -> Result<PersistSummary> {
    batches.check_referential_order()?;
    info!("Persisting {} rows...", batches.total_rows());
    let start_time = Instant::now();

    let summary = store.transaction(|writer| {
        let mut summary = PersistSummary::default();
        let passes = batches.in_dependency_order();
        let pass_count = passes.len();

        for (index, batch) in passes.into_iter().enumerate() {
            let stage = format!("Pass {}/{}: {}", index + 1, pass_count, batch.family());
            info!("{} ({} rows)", stage, batch.len());
            report(
                &mut progress,
                ProgressUpdate::new_stage(stage.clone(), Some(batch.len() as u64)),
            );

            let mut done = 0u64;
            for chunk in batch.chunks(DEFAULT_CHUNK_SIZE) {
                let inserted = writer.insert_or_ignore(chunk)?;
                summary.record(chunk.family(), inserted, chunk.len());
                done += chunk.len() as u64;
                let keep_going = report(
                    &mut progress,
                    ProgressUpdate {
                        stage_description: stage.clone(),
                        current_item: done,
                        total_items: Some(batch.len() as u64),
                        message: None,
                    },
                );
                if !keep_going {
                    return Err(LexGraphError::Cancelled(format!(
                        "stopped during {}",
                        batch.family()
                    )));
                }
            }
        }
        Ok(summary)
    })?;

    info!(
        "Persisted {} new rows ({} already present). Took {:.2?}",
        summary.inserted(),
        summary.ignored,
        start_time.elapsed()
    );
    Ok(summary)
}

// --- In-memory store ---

/// A store keeping rows in primary-key maps.
///
/// Enforces the same keys and foreign keys as the SQLite schema. Useful for
/// dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub words: BTreeMap<String, WordRecord>,
    pub definitions: BTreeMap<String, DefinitionRecord>,
    /// Appendix tag id to normalized label.
    pub appendix_tags: BTreeMap<String, String>,
    pub appendix_links: BTreeSet<(String, String)>,
    /// `(headDefinitionId, wordId, relationshipType)`
    pub relationship_edges: BTreeSet<(String, String, String)>,
    rejected: Option<Family>,
    commits: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every insert into `family` fail, for exercising rollback paths.
    pub fn rejecting(family: Family) -> Self {
        MemoryStore {
            rejected: Some(family),
            ..Self::default()
        }
    }

    /// Number of committed units of work.
    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn row_count(&self) -> usize {
        self.words.len()
            + self.definitions.len()
            + self.appendix_links.len()
            + self.relationship_edges.len()
    }
}

struct MemoryWriter<'a> {
    staged: &'a mut MemoryStore,
}

impl MemoryWriter<'_> {
    fn missing(family: Family, what: &str, id: &str) -> LexGraphError {
        LexGraphError::Persistence {
            family: family.name(),
            reason: format!("foreign key violation: unknown {what} {id}"),
        }
    }
}

impl BatchWriter for MemoryWriter<'_> {
    fn insert_or_ignore(&mut self, batch: GraphBatch<'_>) -> Result<usize> {
        let family = batch.family();
        if self.staged.rejected == Some(family) {
            return Err(LexGraphError::Persistence {
                family: family.name(),
                reason: "rejected by store".to_string(),
            });
        }

        let store = &mut *self.staged;
        let mut inserted = 0;
        match batch {
            GraphBatch::Words(rows) => {
                for row in rows {
                    if !store.words.contains_key(&row.id) {
                        store.words.insert(row.id.clone(), row.clone());
                        inserted += 1;
                    }
                }
            }
            GraphBatch::Definitions(rows) => {
                for row in rows {
                    if !store.words.contains_key(&row.word_id) {
                        return Err(Self::missing(family, "word", &row.word_id));
                    }
                    if !store.definitions.contains_key(&row.id) {
                        store.definitions.insert(row.id.clone(), row.clone());
                        inserted += 1;
                    }
                }
            }
            GraphBatch::AppendixLinks(rows) => {
                for row in rows {
                    if !store.definitions.contains_key(&row.definition_id) {
                        return Err(Self::missing(family, "definition", &row.definition_id));
                    }
                    store
                        .appendix_tags
                        .entry(row.appendix_id.clone())
                        .or_insert_with(|| row.label.clone());
                    if store
                        .appendix_links
                        .insert((row.definition_id.clone(), row.appendix_id.clone()))
                    {
                        inserted += 1;
                    }
                }
            }
            GraphBatch::RelationshipEdges(rows) => {
                for row in rows {
                    if !store.definitions.contains_key(&row.head_definition_id) {
                        return Err(Self::missing(family, "definition", &row.head_definition_id));
                    }
                    if store.relationship_edges.insert((
                        row.head_definition_id.clone(),
                        row.word_id.clone(),
                        row.relationship_type.clone(),
                    )) {
                        inserted += 1;
                    }
                }
            }
        }
        debug!("Memory store: {} of {} {} inserted", inserted, batch.len(), family);
        Ok(inserted)
    }
}

impl Store for MemoryStore {
    fn transaction<T, F>(&mut self, work: F) -> Result<T>
    where
        F: FnOnce(&mut dyn BatchWriter) -> Result<T>,
    {
        // Work on a copy; it replaces `self` only on success.
        let mut staged = self.clone();
        let value = work(&mut MemoryWriter {
            staged: &mut staged,
        })?;
        staged.commits += 1;
        *self = staged;
        Ok(value)
    }

    fn erase(&mut self) -> Result<()> {
        info!("Erasing in-memory graph...");
        self.relationship_edges.clear();
        self.appendix_links.clear();
        self.appendix_tags.clear();
        self.definitions.clear();
        self.words.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::GraphAssembler;
    use crate::builder::RowBuilder;
    use crate::models::WordEntry;
    use std::sync::{Arc, Mutex};

    fn sample_batches() -> GraphBatches {
        let entries: Vec<WordEntry> = serde_json::from_str(
            r#"[
                {"word": "run", "language": "en", "definitions": [
                    {"partOfSpeech": "verb", "text": {"raw_text": "to move fast"}, "appendix_tags": ["Verb"],
                     "relatedWords": [{"relationshipType": "synonym", "words": "sprint"}]}
                ]},
                {"word": "sprint", "definitions": [
                    {"partOfSpeech": "verb", "text": {"raw_text": "to run at full speed"}, "appendix_tags": ["verb"]}
                ]}
            ]"#,
        )
        .unwrap();
        GraphAssembler::assemble(&RowBuilder::default(), &entries).into_batches()
    }

    #[test]
    fn test_persist_twice_is_idempotent() {
        let batches = sample_batches();
        let mut store = MemoryStore::new();

        let first = persist(&mut store, &batches, None).unwrap();
        assert_eq!(first.words, 2);
        assert_eq!(first.definitions, 2);
        assert_eq!(first.appendix_links, 2);
        assert_eq!(first.relationship_edges, 1);
        assert_eq!(first.ignored, 0);
        assert_eq!(store.appendix_tags.len(), 1);

        let rows_before = store.row_count();
        let second = persist(&mut store, &batches, None).unwrap();
        assert_eq!(second.inserted(), 0);
        assert_eq!(second.ignored, batches.total_rows());
        assert_eq!(store.row_count(), rows_before);
        assert_eq!(store.commits(), 2);
    }

    #[test]
    fn test_failure_rolls_back_everything() {
        let batches = sample_batches();
        let mut store = MemoryStore::rejecting(Family::RelationshipEdges);
        let err = persist(&mut store, &batches, None).unwrap_err();
        assert!(matches!(
            err,
            LexGraphError::Persistence { family: "relationship edges", .. }
        ));
        // words and definitions went in before the failing pass, yet nothing stuck
        assert_eq!(store.row_count(), 0);
        assert_eq!(store.commits(), 0);
    }

    #[test]
    fn test_orphans_are_refused_before_writing() {
        let mut batches = sample_batches();
        batches.words.clear();
        let mut store = MemoryStore::new();
        assert!(matches!(
            persist(&mut store, &batches, None),
            Err(LexGraphError::IntegrityViolation(_))
        ));
        assert_eq!(store.commits(), 0);
    }

    #[test]
    fn test_progress_reports_passes_in_order_and_can_cancel() {
        let batches = sample_batches();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut callback: ProgressCallback = Box::new(move |update: ProgressUpdate| {
            let stop = update.stage_description.starts_with("Pass 3/4") && update.current_item > 0;
            sink.lock().unwrap().push(update.stage_description);
            !stop
        });

        let mut store = MemoryStore::new();
        let err = persist(&mut store, &batches, Some(&mut callback)).unwrap_err();
        assert!(matches!(err, LexGraphError::Cancelled(_)));
        assert_eq!(store.row_count(), 0);

        let stages = seen.lock().unwrap().clone();
        assert_eq!(stages.first().map(String::as_str), Some("Pass 1/4: words"));
        assert!(stages.iter().any(|s| s == "Pass 2/4: definitions"));
        assert!(!stages.iter().any(|s| s.starts_with("Pass 4/4")));
    }

    #[test]
    fn test_erase_empties_store() {
        let mut store = MemoryStore::new();
        persist(&mut store, &sample_batches(), None).unwrap();
        store.erase().unwrap();
        assert_eq!(store.row_count(), 0);
        assert!(store.appendix_tags.is_empty());
    }
}
