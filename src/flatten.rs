//! Cartesian unnesting of [`Node`] trees into flat rows.

use crate::node::Node;
use std::collections::{BTreeMap, BTreeSet};

/// One flattened row: column name to scalar value.
pub type FlatRow = BTreeMap<String, String>;

/// Separator placed between an outer field name and the keys of a nested,
/// non-merged mapping (`words/word`).
pub const KEY_SEPARATOR: &str = "/";

/// Expands nested mappings and sequences into flat rows.
///
/// Sibling sequence-valued fields are combined as a cartesian product, so a
/// mapping with two lists of lengths 2 and 3 yields 6 rows. Fields named in
/// the merge set are terminal payloads: their inner keys are lifted to the
/// enclosing level instead of being prefixed.
#[derive(Debug, Clone, Default)]
pub struct Flattener {
    merged: BTreeSet<String>,
}

impl Flattener {
    pub fn new() -> Self {
        Self::default()
    }

    /// A flattener that merges the inner keys of the given fields directly
    /// into the enclosing row.
    pub fn merging<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Flattener {
            merged: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Flattens a node.
    ///
    /// A mapping always yields at least one row. A sequence yields the rows of
    /// its elements in order. Bare scalars and nulls have no column name and
    /// yield nothing.
    pub fn flatten(&self, node: &Node) -> Vec<FlatRow> {
        match node {
            Node::Mapping(map) => self.flatten_mapping(map, ""),
            Node::Sequence(items) => items.iter().flat_map(|item| self.flatten(item)).collect(),
            Node::Scalar(_) | Node::Null => Vec::new(),
        }
    }

    fn flatten_mapping(&self, map: &BTreeMap<String, Node>, prefix: &str) -> Vec<FlatRow> {
        let mut rows = vec![FlatRow::new()];
        for (key, value) in map {
            let branch = self.expand_field(key, prefix, value);
            rows = cartesian(&rows, &branch);
        }
        rows
    }

    /// Rows contributed by a single field. Never empty.
    fn expand_field(&self, key: &str, prefix: &str, value: &Node) -> Vec<FlatRow> {
        let column = join_key(prefix, key);
        match value {
            Node::Null => vec![FlatRow::new()],
            Node::Scalar(s) => vec![FlatRow::from([(column, s.clone())])],
            Node::Mapping(inner) => {
                if self.merged.contains(key) {
                    self.flatten_mapping(inner, prefix)
                } else {
                    self.flatten_mapping(inner, &column)
                }
            }
            Node::Sequence(items) => {
                let rows: Vec<FlatRow> = items
                    .iter()
                    .flat_map(|item| self.expand_field(key, prefix, item))
                    .collect();
                if rows.is_empty() {
                    // Placeholder keeps sibling fields alive.
                    vec![FlatRow::new()]
                } else {
                    rows
                }
            }
        }
    }
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{KEY_SEPARATOR}{key}")
    }
}

fn cartesian(left: &[FlatRow], right: &[FlatRow]) -> Vec<FlatRow> {
    let mut out = Vec::with_capacity(left.len() * right.len());
    for l in left {
        for r in right {
            let mut row = l.clone();
            row.extend(r.iter().map(|(k, v)| (k.clone(), v.clone())));
            out.push(row);
        }
    }
    out
}
