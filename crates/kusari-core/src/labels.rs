//! # Label Dictionary
//!
//! Bijection between numeric tag ids and tag strings (e.g. "B-PER", "O"),
//! loaded once from a plain-text file and shared read-only by the scorer
//! and the evaluator.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{KusariError, Result};

/// Read-only mapping between tag ids `0..num_tags` and tag strings.
///
/// The on-disk format is one entry per line: `<tag_string> <tag_id>`.
/// Ids must form a dense `0..N-1` range; anything else is a fatal
/// configuration error.
#[derive(Debug, Clone)]
pub struct LabelDict {
    id_to_tag: Vec<String>,
    tag_to_id: HashMap<String, u32>,
}

impl LabelDict {
    /// Load a label dictionary from a file.
    ///
    /// Fails fast on the first malformed line; no partial dictionary is
    /// ever returned.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut entries: Vec<(String, usize)> = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut parts = line.split_whitespace();
            let (tag, id) = match (parts.next(), parts.next(), parts.next()) {
                (Some(tag), Some(id), None) => (tag, id),
                _ => {
                    return Err(KusariError::MalformedLabelEntry {
                        line: idx + 1,
                        text: line.to_string(),
                    });
                }
            };

            let id: usize = id.parse().map_err(|_| KusariError::MalformedLabelEntry {
                line: idx + 1,
                text: line.to_string(),
            })?;
            entries.push((tag.to_string(), id));
        }

        let dict = Self::from_entries(entries)?;
        tracing::debug!(num_tags = dict.num_tags(), "label dictionary loaded");
        Ok(dict)
    }

    fn from_entries(entries: Vec<(String, usize)>) -> Result<Self> {
        let count = entries.len();
        let mut id_to_tag: Vec<Option<String>> = vec![None; count];
        for (tag, id) in entries {
            match id_to_tag.get_mut(id) {
                Some(slot @ None) => *slot = Some(tag),
                _ => return Err(KusariError::SparseLabelIds { count, id }),
            }
        }

        let id_to_tag: Vec<String> = id_to_tag.into_iter().map(|t| t.unwrap_or_default()).collect();
        let tag_to_id = id_to_tag
            .iter()
            .enumerate()
            .map(|(id, tag)| (tag.clone(), id as u32))
            .collect();

        Ok(Self {
            id_to_tag,
            tag_to_id,
        })
    }

    /// Number of tags in the dictionary.
    pub fn num_tags(&self) -> usize {
        self.id_to_tag.len()
    }

    /// Tag string for the given id, if in range.
    pub fn tag(&self, id: u32) -> Option<&str> {
        self.id_to_tag.get(id as usize).map(String::as_str)
    }

    /// Tag id for the given string, if present.
    pub fn id(&self, tag: &str) -> Option<u32> {
        self.tag_to_id.get(tag).copied()
    }
}
