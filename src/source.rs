//! Reading source fetcher dumps.
//!
//! A dump is either one JSON array of word entries or JSON lines, one entry
//! per line. Files ending in `.gz` are decompressed on the fly.

use crate::error::Result;
use crate::models::WordEntry;
use flate2::read::GzDecoder;
use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Reads and parses a dump file.
pub fn read_entries(path: &Path) -> Result<Vec<WordEntry>> {
    info!("Reading word entries from {:?}", path);
    let file = File::open(path)?;
    let mut content = String::new();
    if path.extension().is_some_and(|ext| ext == "gz") {
        debug!("Decompressing gzip dump {:?}", path);
        GzDecoder::new(BufReader::new(file)).read_to_string(&mut content)?;
    } else {
        BufReader::new(file).read_to_string(&mut content)?;
    }
    parse_entries(&content)
}

/// Parses dump content. Entries that do not have the expected top-level
/// shape are logged and left out; a syntactically broken JSON array is an
/// error.
pub fn parse_entries(content: &str) -> Result<Vec<WordEntry>> {
    let raw: Vec<serde_json::Value> = if content.trim_start().starts_with('[') {
        serde_json::from_str(content)?
    } else {
        let mut values = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(value) => values.push(value),
                Err(e) => warn!("Skipping unreadable line {}: {}", line_no + 1, e),
            }
        }
        values
    };

    let total = raw.len();
    let entries: Vec<WordEntry> = raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping entry #{}: {}", index, e);
                None
            }
        })
        .collect();
    info!("Parsed {} of {} word entries.", entries.len(), total);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::{BufWriter, Write};
    use tempfile::tempdir;

    const DUMP: &str = r#"[
        {"word": "run", "query": "run", "language": "en", "etymology": "Old English rinnan",
         "definitions": [{"partOfSpeech": "verb", "text": {"raw_text": "to move fast"}}]},
        {"word": 42},
        {"word": "sprint"}
    ]"#;

    #[test]
    fn test_parse_array_skips_bad_entries() {
        let _ = env_logger::builder().is_test(true).try_init();
        let entries = parse_entries(DUMP).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].etymology.as_deref(), Some("Old English rinnan"));
        assert_eq!(entries[1].word.as_deref(), Some("sprint"));
    }

    #[test]
    fn test_parse_json_lines() {
        let content = "{\"word\": \"run\"}\n\n{not json}\n{\"word\": \"walk\"}\n";
        let entries = parse_entries(content).unwrap();
        let words: Vec<_> = entries.iter().filter_map(|e| e.word.as_deref()).collect();
        assert_eq!(words, vec!["run", "walk"]);
    }

    #[test]
    fn test_broken_array_is_an_error() {
        assert!(parse_entries("[{\"word\": \"run\"}").is_err());
    }

    #[test]
    fn test_read_gzip_dump() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let gz_path = temp_dir.path().join("dump.json.gz");
        let file = File::create(&gz_path).unwrap();
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        encoder.write_all(DUMP.as_bytes()).unwrap();
        encoder.finish().unwrap().flush().unwrap();

        let entries = read_entries(&gz_path).unwrap();
        assert_eq!(entries.len(), 2);

        let plain_path = temp_dir.path().join("dump.json");
        std::fs::write(&plain_path, DUMP).unwrap();
        assert_eq!(read_entries(&plain_path).unwrap(), entries);
    }
}
