use std::fs;
use tempfile::tempdir;
use wikt_graph::{IdentityHasher, IngestOptions, SqliteStore, ingest, source};

const DUMP: &str = r#"
{"word": "run", "query": "run", "language": "en", "definitions": [{"partOfSpeech": "verb", "text": {"raw_text": "to move fast", "text": "To move fast."}, "appendix_tags": ["Verb", "English  verbs"], "relatedWords": [{"relationshipType": "synonym", "words": "sprint"}]}]}
{"word": "sprint", "language": "en", "definitions": [{"partOfSpeech": "verb", "text": {"raw_text": "to run at full speed"}, "appendix_tags": ["VERB"]}]}
{"language": "en"}
"#;

fn write_dump(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("dump.jsonl");
    fs::write(&path, DUMP).expect("Failed to write dump");
    path
}

#[test]
fn test_dump_to_sqlite() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let dump = write_dump(temp_dir.path());
    let db_path = temp_dir.path().join("graph.db");

    let entries = source::read_entries(&dump).unwrap();
    assert_eq!(entries.len(), 3);

    let mut store = SqliteStore::open(&db_path).unwrap();
    let report = ingest(&mut store, &entries, &IngestOptions::default(), None).unwrap();
    assert_eq!(report.assembly.dropped_entries, 1);
    assert_eq!(report.persisted.words, 2);
    assert_eq!(report.persisted.definitions, 2);
    assert_eq!(report.persisted.appendix_links, 3);
    assert_eq!(report.persisted.relationship_edges, 1);

    let counts = store.table_counts().unwrap();
    assert_eq!(counts.words, 2);
    // "Verb" and "VERB" normalize to the same tag.
    assert_eq!(counts.appendix_tags, 2);

    let definitions = store.lookup_definitions("run").unwrap();
    assert_eq!(definitions.len(), 1);
    assert_eq!(definitions[0].word_id, IdentityHasher::default().word_id("run"));
    assert_eq!(definitions[0].text, "To move fast.");
    assert_eq!(definitions[0].headword, "run");
    assert_eq!(
        store.appendix_labels(&definitions[0].id).unwrap(),
        vec!["english verbs".to_string(), "verb".to_string()]
    );

    let related = store.related_words(&definitions[0].id).unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].relationship_type, "synonym");
    assert_eq!(related[0].word.as_deref(), Some("sprint"));
}

#[test]
fn test_reingest_is_idempotent() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let dump = write_dump(temp_dir.path());
    let db_path = temp_dir.path().join("graph.db");
    let entries = source::read_entries(&dump).unwrap();

    {
        let mut store = SqliteStore::open(&db_path).unwrap();
        ingest(&mut store, &entries, &IngestOptions::default(), None).unwrap();
    }
    let before = SqliteStore::open(&db_path).unwrap().table_counts().unwrap();

    let mut store = SqliteStore::open(&db_path).unwrap();
    let options = IngestOptions {
        parallel: true,
        ..IngestOptions::default()
    };
    let report = ingest(&mut store, &entries, &options, None).unwrap();
    assert_eq!(report.persisted.inserted(), 0);
    assert_eq!(store.table_counts().unwrap(), before);
}
