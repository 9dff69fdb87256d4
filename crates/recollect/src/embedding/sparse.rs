//! Deterministic BM25-style sparse encoder.
//!
//! Maps terms to u32 indices by hashing and weights them with a saturated
//! term-frequency formula. The same encoder runs at indexing time, so query
//! vectors land in the same index space as the stored collection.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::types::SparseVector;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from",
    "had", "has", "have", "in", "is", "it", "its", "of", "on", "or", "that",
    "the", "their", "there", "they", "this", "to", "was", "were", "which",
    "will", "with",
];

#[derive(Debug, Clone)]
pub struct Bm25Encoder {
    k1: f32,
    b: f32,
    avg_len: f32,
}

impl Default for Bm25Encoder {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            avg_len: 256.0,
        }
    }
}

impl Bm25Encoder {
    pub fn new(k1: f32, b: f32, avg_len: f32) -> Self {
        Self { k1, b, avg_len }
    }

    fn term_index(term: &str) -> u32 {
        let mut hasher = DefaultHasher::new();
        term.hash(&mut hasher);
        hasher.finish() as u32
    }

    fn tokenize(text: &str) -> Vec<String> {
        let normalized: String = text
            .chars()
            .map(|c| {
                if c.is_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    ' '
                }
            })
            .collect();

        normalized
            .split_whitespace()
            .filter(|t| t.len() >= 2 && !STOPWORDS.contains(t))
            .map(str::to_string)
            .collect()
    }

    pub fn encode(&self, text: &str) -> SparseVector {
        let tokens = Self::tokenize(text);
        let doc_len = tokens.len() as f32;

        let mut counts: HashMap<u32, f32> = HashMap::new();
        for token in &tokens {
            *counts.entry(Self::term_index(token)).or_insert(0.0) += 1.0;
        }

        let norm = self.k1 * (1.0 - self.b + self.b * doc_len / self.avg_len);
        let mut entries: Vec<(u32, f32)> = counts
            .into_iter()
            .map(|(idx, tf)| (idx, tf * (self.k1 + 1.0) / (tf + norm)))
            .collect();
        entries.sort_by_key(|(idx, _)| *idx);

        SparseVector {
            indices: entries.iter().map(|(idx, _)| *idx).collect(),
            values: entries.iter().map(|(_, w)| *w).collect(),
        }
    }
}
