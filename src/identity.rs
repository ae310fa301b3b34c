//! Content-derived identifiers.
//!
//! Every identifier is the lowercase hex SHA-256 of its parts joined with
//! `_`. Free-text parts are cut to a fixed number of characters before the
//! join, so two definitions that only differ past the cut share an id.
//!
//! Word ids hash the surface form alone. The same spelling in two languages
//! therefore resolves to one word record.

use sha2::{Digest, Sha256};
use std::borrow::Cow;

/// Default number of characters of definition text that take part in the id.
pub const DEFAULT_TEXT_PREFIX_LEN: usize = 512;

/// Delimiter placed between hashed parts.
pub const PART_DELIMITER: &str = "_";

/// One input to [`IdentityHasher::hash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part<'a> {
    /// Identifier-like content, hashed verbatim.
    Key(&'a str),
    /// Free text, truncated to the configured prefix length first.
    Text(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityHasher {
    text_prefix_len: usize,
}

impl Default for IdentityHasher {
    fn default() -> Self {
        IdentityHasher::new(DEFAULT_TEXT_PREFIX_LEN)
    }
}

impl IdentityHasher {
    pub fn new(text_prefix_len: usize) -> Self {
        IdentityHasher { text_prefix_len }
    }

    pub fn text_prefix_len(&self) -> usize {
        self.text_prefix_len
    }

    /// Hashes the parts in the given order into a 64 character hex digest.
    pub fn hash(&self, parts: &[Part<'_>]) -> String {
        let joined = parts
            .iter()
            .map(|part| match *part {
                Part::Key(s) => Cow::Borrowed(s),
                Part::Text(s) => truncate_chars(s, self.text_prefix_len),
            })
            .collect::<Vec<_>>()
            .join(PART_DELIMITER);
        hex::encode(Sha256::digest(joined.as_bytes()))
    }

    /// Id of a word record: depends on the surface form only.
    pub fn word_id(&self, surface: &str) -> String {
        self.hash(&[Part::Key(surface)])
    }

    pub fn definition_id(&self, word_id: &str, part_of_speech: &str, raw_text: &str) -> String {
        self.hash(&[
            Part::Key(word_id),
            Part::Key(part_of_speech),
            Part::Text(raw_text),
        ])
    }

    /// Id of an appendix tag. Expects a label already passed through
    /// [`normalize_tag`].
    pub fn appendix_id(&self, normalized_tag: &str) -> String {
        self.hash(&[Part::Key(normalized_tag)])
    }
}

/// Lowercases a tag, turns non-breaking spaces into plain ones and collapses
/// whitespace runs.
pub fn normalize_tag(tag: &str) -> String {
    tag.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Cow::Borrowed(&s[..byte_idx]),
        None => Cow::Borrowed(s),
    }
}
