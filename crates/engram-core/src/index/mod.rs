//! In-memory secondary indices
//!
//! Four maps from a key to the set of memory ids carrying that key:
//! type, tag, keyword token and a flat semantic (id -> embedding) store.
//! All of it is reconstructible from storage; loss is recoverable via
//! `reindex_all` without data loss.
//!
//! Mutations are idempotent and must run under the engine's write lock.

use std::collections::{HashMap, HashSet};

use crate::memory::{IndexSizes, MemoryRecord, MemoryType};

/// Keyword tokens kept per document
pub const MAX_KEYWORDS_PER_DOC: usize = 64;

/// Minimum token length admitted into the keyword index
pub const MIN_KEYWORD_LEN: usize = 3;

/// Lowercased alphanumeric tokens of length >= 3, de-duplicated,
/// capped at [`MAX_KEYWORDS_PER_DOC`]
pub fn tokenize(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= MIN_KEYWORD_LEN)
        .map(|w| w.to_lowercase())
        .filter(|w| seen.insert(w.clone()))
        .take(MAX_KEYWORDS_PER_DOC)
        .collect()
}

/// The engine's in-memory index set
#[derive(Debug, Default)]
pub struct MemoryIndex {
    by_type: HashMap<MemoryType, HashSet<String>>,
    by_tag: HashMap<String, HashSet<String>>,
    by_keyword: HashMap<String, HashSet<String>>,
    by_semantic: HashMap<String, Vec<f32>>,
}

impl MemoryIndex {
    /// Empty index set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a memory into all four indices. Re-inserting the same id
    /// is a no-op per index key.
    pub fn insert(&mut self, memory: &MemoryRecord) {
        self.by_type
            .entry(memory.memory_type)
            .or_default()
            .insert(memory.id.clone());
        for tag in &memory.tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(memory.id.clone());
        }
        for token in tokenize(&memory.content) {
            self.by_keyword
                .entry(token)
                .or_default()
                .insert(memory.id.clone());
        }
        self.by_semantic
            .insert(memory.id.clone(), memory.embedding.clone());
    }

    /// Remove a memory from all four indices, dropping emptied buckets.
    /// Removing an absent id is a no-op.
    pub fn remove(&mut self, memory: &MemoryRecord) {
        if let Some(ids) = self.by_type.get_mut(&memory.memory_type) {
            ids.remove(&memory.id);
            if ids.is_empty() {
                self.by_type.remove(&memory.memory_type);
            }
        }
        for tag in &memory.tags {
            if let Some(ids) = self.by_tag.get_mut(tag) {
                ids.remove(&memory.id);
                if ids.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
        for token in tokenize(&memory.content) {
            if let Some(ids) = self.by_keyword.get_mut(&token) {
                ids.remove(&memory.id);
                if ids.is_empty() {
                    self.by_keyword.remove(&token);
                }
            }
        }
        self.by_semantic.remove(&memory.id);
    }

    /// Drop everything and rebuild from an iterator of records
    pub fn reindex_all<'a>(&mut self, memories: impl IntoIterator<Item = &'a MemoryRecord>) {
        self.clear();
        for memory in memories {
            self.insert(memory);
        }
    }

    /// Drop all entries
    pub fn clear(&mut self) {
        self.by_type.clear();
        self.by_tag.clear();
        self.by_keyword.clear();
        self.by_semantic.clear();
    }

    /// Ids recorded under a memory type
    pub fn ids_with_type(&self, memory_type: MemoryType) -> Option<&HashSet<String>> {
        self.by_type.get(&memory_type)
    }

    /// Ids carrying any of the given tags (union)
    pub fn ids_with_any_tag(&self, tags: &[String]) -> HashSet<String> {
        let mut out = HashSet::new();
        for tag in tags {
            if let Some(ids) = self.by_tag.get(tag) {
                out.extend(ids.iter().cloned());
            }
        }
        out
    }

    /// Ids whose content contains the keyword token
    pub fn ids_with_keyword(&self, token: &str) -> Option<&HashSet<String>> {
        self.by_keyword.get(token)
    }

    /// The stored embedding for an id, if indexed
    pub fn embedding(&self, id: &str) -> Option<&[f32]> {
        self.by_semantic.get(id).map(|v| v.as_slice())
    }

    /// Whether an id is present in the semantic index
    pub fn contains(&self, id: &str) -> bool {
        self.by_semantic.contains_key(id)
    }

    /// Current sizes, for stats reporting
    pub fn sizes(&self) -> IndexSizes {
        IndexSizes {
            types: self.by_type.len(),
            tags: self.by_tag.len(),
            keywords: self.by_keyword.len(),
            semantic: self.by_semantic.len(),
        }
    }

    /// Count of ids carrying a tag (0 when unindexed)
    pub fn tag_count(&self, tag: &str) -> usize {
        self.by_tag.get(tag).map_or(0, |ids| ids.len())
    }
}

// ============================================================================
// TESTS
// ============================================================================
