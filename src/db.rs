use crate::assembler::GraphBatch;
use crate::error::{LexGraphError, Result};
use crate::models::{DefinitionRecord, Family};
use crate::store::{BatchWriter, Store};
use directories_next::ProjectDirs;
use log::{debug, error, info, warn};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction, params};
use std::fs;
use std::path::{Path, PathBuf};

/// Subdirectory name within user's data directory
pub const DATA_SUBDIR: &str = "wikt-graph";
const DB_FILENAME: &str = "wikt-graph.db";

// --- Schema Definition ---

const SCHEMA_VERSION: u32 = 1;

const CREATE_METADATA_TABLE: &str = "
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);";

const CREATE_WORDS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS words (
    id TEXT PRIMARY KEY, -- sha256 of the surface form
    word TEXT NOT NULL,
    query TEXT NOT NULL,
    language TEXT,
    etymology TEXT
);";

const CREATE_DEFINITIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS definitions (
    id TEXT PRIMARY KEY,
    wordId TEXT NOT NULL,
    partOfSpeech TEXT NOT NULL,
    text TEXT NOT NULL,
    headword TEXT NOT NULL,
    FOREIGN KEY (wordId) REFERENCES words(id) ON DELETE CASCADE
);";

const CREATE_APPENDIX_TAGS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS appendix_tags (
    id TEXT PRIMARY KEY,
    label TEXT NOT NULL -- normalized label
);";

const CREATE_DEFINITION_APPENDIX_TABLE: &str = "
CREATE TABLE IF NOT EXISTS definition_appendix (
    definitionId TEXT NOT NULL,
    appendixId TEXT NOT NULL,
    PRIMARY KEY (definitionId, appendixId),
    FOREIGN KEY (definitionId) REFERENCES definitions(id) ON DELETE CASCADE,
    FOREIGN KEY (appendixId) REFERENCES appendix_tags(id)
);";

// Targets are not foreign keys: a related word may never have been scraped.
const CREATE_RELATIONSHIPS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS relationships (
    headDefinitionId TEXT NOT NULL,
    wordId TEXT NOT NULL,
    relationshipType TEXT NOT NULL,
    PRIMARY KEY (headDefinitionId, wordId, relationshipType),
    FOREIGN KEY (headDefinitionId) REFERENCES definitions(id) ON DELETE CASCADE
);";

// --- Indices ---

const CREATE_WORD_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_words_word ON words (word);";
const CREATE_DEFINITION_WORD_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_definitions_word ON definitions (wordId);";
const CREATE_APPENDIX_ID_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_definition_appendix_tag ON definition_appendix (appendixId);";
const CREATE_RELATIONSHIP_TARGET_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_relationships_word ON relationships (wordId);";

// --- Insert Statements ---

const INSERT_WORD: &str = "INSERT OR IGNORE INTO words (id, word, query, language, etymology)
     VALUES (?1, ?2, ?3, ?4, ?5)";
const INSERT_DEFINITION: &str =
    "INSERT OR IGNORE INTO definitions (id, wordId, partOfSpeech, text, headword)
     VALUES (?1, ?2, ?3, ?4, ?5)";
const INSERT_APPENDIX_TAG: &str = "INSERT OR IGNORE INTO appendix_tags (id, label) VALUES (?1, ?2)";
const INSERT_DEFINITION_APPENDIX: &str =
    "INSERT OR IGNORE INTO definition_appendix (definitionId, appendixId) VALUES (?1, ?2)";
const INSERT_RELATIONSHIP: &str =
    "INSERT OR IGNORE INTO relationships (headDefinitionId, wordId, relationshipType)
     VALUES (?1, ?2, ?3)";

// --- Initialization Function ---

/// Creates all necessary tables and indices in the database if they don't exist.
/// Also checks and sets the schema version.
pub fn initialize_database(conn: &mut Connection) -> Result<()> {
    info!(
        "Initializing database schema (version {})...",
        SCHEMA_VERSION
    );
    let tx = conn.transaction()?;

    tx.execute(CREATE_METADATA_TABLE, [])?;
    tx.execute(CREATE_WORDS_TABLE, [])?;
    tx.execute(CREATE_DEFINITIONS_TABLE, [])?;
    tx.execute(CREATE_APPENDIX_TAGS_TABLE, [])?;
    tx.execute(CREATE_DEFINITION_APPENDIX_TABLE, [])?;
    tx.execute(CREATE_RELATIONSHIPS_TABLE, [])?;

    tx.execute(CREATE_WORD_INDEX, [])?;
    tx.execute(CREATE_DEFINITION_WORD_INDEX, [])?;
    tx.execute(CREATE_APPENDIX_ID_INDEX, [])?;
    tx.execute(CREATE_RELATIONSHIP_TARGET_INDEX, [])?;

    let existing_version_str: Option<String> = tx
        .query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match existing_version_str {
        Some(v_str) => {
            let existing_version: u32 = v_str.parse().map_err(|e| {
                LexGraphError::InvalidArgument(format!(
                    "Failed to parse existing schema version '{}': {}",
                    v_str, e
                ))
            })?;
            match existing_version.cmp(&SCHEMA_VERSION) {
                std::cmp::Ordering::Less => {
                    warn!(
                        "Database schema version ({}) is older than expected ({}). Migration needed.",
                        existing_version, SCHEMA_VERSION
                    );
                    tx.execute(
                        "UPDATE metadata SET value = ?1 WHERE key = 'schema_version'",
                        params![SCHEMA_VERSION.to_string()],
                    )?;
                }
                std::cmp::Ordering::Greater => {
                    warn!(
                        "Database schema version ({}) is newer than expected ({}). Using potentially incompatible schema.",
                        existing_version, SCHEMA_VERSION
                    );
                }
                std::cmp::Ordering::Equal => {
                    debug!(
                        "Database schema version ({}) matches expected version.",
                        existing_version
                    );
                }
            }
        }
        None => {
            tx.execute(
                "INSERT INTO metadata (key, value) VALUES ('schema_version', ?1)",
                params![SCHEMA_VERSION.to_string()],
            )?;
            info!("Set initial schema version in metadata table.");
        }
    }

    tx.commit()?;
    info!("Database schema initialization complete.");
    Ok(())
}

/// Deletes all graph rows. Referencing tables go first.
pub fn clear_graph_data(tx: &Transaction) -> Result<()> {
    info!("Clearing existing data from database tables...");
    tx.execute("DELETE FROM relationships", [])?;
    tx.execute("DELETE FROM definition_appendix", [])?;
    tx.execute("DELETE FROM appendix_tags", [])?;
    tx.execute("DELETE FROM definitions", [])?;
    tx.execute("DELETE FROM words", [])?;
    // Don't delete from metadata table
    info!("Finished clearing data.");
    Ok(())
}

fn open_db_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
    )?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "cache_size", "-64000")?; // 64MB
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

// --- SQLite Store ---

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub words: u64,
    pub definitions: u64,
    pub appendix_tags: u64,
    pub appendix_links: u64,
    pub relationships: u64,
}

/// A related word as read back from the store. `word` is `None` when the
/// target was never ingested as an entry of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedWord {
    pub relationship_type: String,
    pub word_id: String,
    pub word: Option<String>,
}

/// [`Store`] backed by a SQLite database with foreign keys enforced.
pub struct SqliteStore {
    conn: Connection,
    db_file_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and initializes the schema.
    pub fn open(path: &Path) -> Result<Self> {
        info!("Using database path: {:?}", path);
        let conn = open_db_connection(path)?;
        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    /// Opens the database at `path`, or at [`SqliteStore::default_db_path`].
    pub fn open_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::open(path),
            None => Self::open(&Self::default_db_path()?),
        }
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(mut conn: Connection, db_file_path: Option<PathBuf>) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        initialize_database(&mut conn)?;
        Ok(SqliteStore { conn, db_file_path })
    }

    /// Gets the default path for the SQLite database file.
    pub fn default_db_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("org", "WiktGraph", DATA_SUBDIR)
            .ok_or(LexGraphError::DataDirNotFound)?;
        let data_dir = project_dirs.data_dir();
        fs::create_dir_all(data_dir)?;
        Ok(data_dir.join(DB_FILENAME))
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_file_path.as_deref()
    }

    // --- Query Methods ---

    pub fn table_counts(&self) -> Result<TableCounts> {
        let count = |table: &str| -> Result<u64> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(n as u64)
        };
        Ok(TableCounts {
            words: count("words")?,
            definitions: count("definitions")?,
            appendix_tags: count("appendix_tags")?,
            appendix_links: count("definition_appendix")?,
            relationships: count("relationships")?,
        })
    }

    /// Definitions of a surface word, in insertion order.
    pub fn lookup_definitions(&self, word: &str) -> Result<Vec<DefinitionRecord>> {
        debug!("lookup_definitions: word='{}'", word);
        let mut stmt = self.conn.prepare(
            "SELECT d.id, d.wordId, d.partOfSpeech, d.text, d.headword
             FROM definitions d JOIN words w ON w.id = d.wordId
             WHERE w.word = ?1
             ORDER BY d.rowid",
        )?;
        let def_iter = stmt.query_map(params![word], |row| {
            Ok(DefinitionRecord {
                id: row.get(0)?,
                word_id: row.get(1)?,
                part_of_speech: row.get(2)?,
                text: row.get(3)?,
                headword: row.get(4)?,
            })
        })?;
        def_iter
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LexGraphError::from)
    }

    /// Normalized appendix labels attached to a definition.
    pub fn appendix_labels(&self, definition_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.label FROM definition_appendix da
             JOIN appendix_tags t ON t.id = da.appendixId
             WHERE da.definitionId = ?1
             ORDER BY t.label",
        )?;
        let label_iter = stmt.query_map(params![definition_id], |row| row.get::<_, String>(0))?;
        label_iter
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LexGraphError::from)
    }

    /// Outgoing relationship edges of a definition.
    pub fn related_words(&self, definition_id: &str) -> Result<Vec<RelatedWord>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.relationshipType, r.wordId, w.word
             FROM relationships r LEFT JOIN words w ON w.id = r.wordId
             WHERE r.headDefinitionId = ?1
             ORDER BY r.relationshipType, r.rowid",
        )?;
        let rel_iter = stmt.query_map(params![definition_id], |row| {
            Ok(RelatedWord {
                relationship_type: row.get(0)?,
                word_id: row.get(1)?,
                word: row.get(2)?,
            })
        })?;
        rel_iter
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LexGraphError::from)
    }
}

struct SqliteWriter<'conn, 'tx> {
    tx: &'tx Transaction<'conn>,
}

fn persistence(family: Family) -> impl Fn(rusqlite::Error) -> LexGraphError {
    move |e| LexGraphError::Persistence {
        family: family.name(),
        reason: e.to_string(),
    }
}

impl BatchWriter for SqliteWriter<'_, '_> {
    fn insert_or_ignore(&mut self, batch: GraphBatch<'_>) -> Result<usize> {
        let family = batch.family();
        let fail = persistence(family);
        let mut inserted = 0;

        match batch {
            GraphBatch::Words(rows) => {
                let mut stmt = self.tx.prepare_cached(INSERT_WORD).map_err(&fail)?;
                for w in rows {
                    inserted += stmt
                        .execute(params![w.id, w.word, w.query, w.language, w.etymology])
                        .map_err(&fail)?;
                }
            }
            GraphBatch::Definitions(rows) => {
                let mut stmt = self.tx.prepare_cached(INSERT_DEFINITION).map_err(&fail)?;
                for d in rows {
                    inserted += stmt
                        .execute(params![d.id, d.word_id, d.part_of_speech, d.text, d.headword])
                        .map_err(&fail)?;
                }
            }
            GraphBatch::AppendixLinks(rows) => {
                let mut tag_stmt = self.tx.prepare_cached(INSERT_APPENDIX_TAG).map_err(&fail)?;
                let mut link_stmt = self
                    .tx
                    .prepare_cached(INSERT_DEFINITION_APPENDIX)
                    .map_err(&fail)?;
                for l in rows {
                    tag_stmt
                        .execute(params![l.appendix_id, l.label])
                        .map_err(&fail)?;
                    inserted += link_stmt
                        .execute(params![l.definition_id, l.appendix_id])
                        .map_err(&fail)?;
                }
            }
            GraphBatch::RelationshipEdges(rows) => {
                let mut stmt = self.tx.prepare_cached(INSERT_RELATIONSHIP).map_err(&fail)?;
                for e in rows {
                    inserted += stmt
                        .execute(params![e.head_definition_id, e.word_id, e.relationship_type])
                        .map_err(&fail)?;
                }
            }
        }
        debug!("SQLite: {} of {} {} inserted", inserted, batch.len(), family);
        Ok(inserted)
    }
}

impl Store for SqliteStore {
    fn transaction<T, F>(&mut self, work: F) -> Result<T>
    where
        F: FnOnce(&mut dyn BatchWriter) -> Result<T>,
    {
        let tx = self.conn.transaction()?;
        let outcome = work(&mut SqliteWriter { tx: &tx });
        match outcome {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    error!("Rollback failed after '{}': {}", e, rollback_err);
                }
                Err(e)
            }
        }
    }

    fn erase(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        clear_graph_data(&tx)?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{GraphAssembler, GraphBatches};
    use crate::builder::RowBuilder;
    use crate::models::{RelationshipEdge, WordEntry};
    use crate::store::persist;
    use tempfile::tempdir;

    fn batches(json: &str) -> GraphBatches {
        let entries: Vec<WordEntry> = serde_json::from_str(json).unwrap();
        GraphAssembler::assemble(&RowBuilder::default(), &entries).into_batches()
    }

    const RUN: &str = r#"[{
        "word": "run", "language": "en",
        "definitions": [{
            "partOfSpeech": "verb",
            "text": {"raw_text": "to move fast"},
            "appendix_tags": ["Verb", "intransitive"],
            "relatedWords": [{"relationshipType": "synonym", "words": ["sprint", "dash"]}]
        }]
    }, {"word": "sprint", "definitions": []}]"#;

    #[test]
    fn test_initialize_is_repeatable() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("graph.db");
        {
            let store = SqliteStore::open(&db_path).unwrap();
            assert_eq!(store.path(), Some(db_path.as_path()));
        }
        let store = SqliteStore::open(&db_path).unwrap();
        let version: String = store
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION.to_string());
    }

    #[test]
    fn test_persist_and_read_back() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let graph = batches(RUN);
        let summary = persist(&mut store, &graph, None).unwrap();
        assert_eq!(summary.words, 2);
        assert_eq!(summary.definitions, 1);
        assert_eq!(summary.appendix_links, 2);
        assert_eq!(summary.relationship_edges, 2);

        let defs = store.lookup_definitions("run").unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].text, "to move fast");
        assert_eq!(
            store.appendix_labels(&defs[0].id).unwrap(),
            vec!["intransitive".to_string(), "verb".to_string()]
        );

        let related = store.related_words(&defs[0].id).unwrap();
        assert_eq!(related.len(), 2);
        let sprint = related.iter().find(|r| r.word.as_deref() == Some("sprint"));
        assert!(sprint.is_some());
        // "dash" was never ingested on its own
        assert!(related.iter().any(|r| r.word.is_none()));
    }

    #[test]
    fn test_second_run_changes_nothing() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let graph = batches(RUN);
        persist(&mut store, &graph, None).unwrap();
        let before = store.table_counts().unwrap();
        let summary = persist(&mut store, &graph, None).unwrap();
        assert_eq!(summary.inserted(), 0);
        assert_eq!(store.table_counts().unwrap(), before);
        assert_eq!(before.appendix_tags, 2);
    }

    #[test]
    fn test_constraint_violation_rolls_back_batch() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let graph = batches(RUN);
        let err = store
            .transaction(|writer| {
                writer.insert_or_ignore(GraphBatch::Words(&graph.words))?;
                // head definition was never inserted
                writer.insert_or_ignore(GraphBatch::RelationshipEdges(&[RelationshipEdge {
                    head_definition_id: "missing".into(),
                    word_id: graph.words[0].id.clone(),
                    relationship_type: "synonym".into(),
                }]))
            })
            .unwrap_err();
        assert!(matches!(
            err,
            LexGraphError::Persistence { family: "relationship edges", .. }
        ));
        assert_eq!(store.table_counts().unwrap(), TableCounts::default());
    }

    #[test]
    fn test_erase_keeps_schema() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        persist(&mut store, &batches(RUN), None).unwrap();
        store.erase().unwrap();
        assert_eq!(store.table_counts().unwrap(), TableCounts::default());
        persist(&mut store, &batches(RUN), None).unwrap();
        assert_eq!(store.table_counts().unwrap().words, 2);
    }
}
