//! Storage adapters
//!
//! The [`StorageAdapter`] trait is the persistence contract: upsert by id,
//! id-addressed reads, filtered listing, transactional bulk writes. Three
//! implementations ship:
//! - [`FileStore`] - one JSON file per memory under per-tenant directories
//! - [`SqliteStore`] - single-table SQLite with JSON tag membership
//! - `RedisStore` - key-value with secondary index keys (`kv` feature)
//!
//! Every adapter guarantees: reads observe the latest committed write for
//! an id, failed writes leave storage unchanged, and `list` never returns
//! torn records.

mod file;
mod sqlite;

#[cfg(feature = "kv")]
mod redis;

pub use file::FileStore;
pub use sqlite::SqliteStore;

#[cfg(feature = "kv")]
pub use redis::RedisStore;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::{MemoryPatch, MemoryRecord, MemoryType};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage adapter error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// SQLite failure
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Key-value backend failure
    #[cfg(feature = "kv")]
    #[error("kv error: {0}")]
    Kv(#[from] ::redis::RedisError),
    /// Concurrent update detected by the optimistic check
    #[error("write conflict: {0}")]
    Conflict(String),
    /// Record not found where one was required
    #[error("record not found: {0}")]
    NotFound(String),
    /// Adapter could not be opened
    #[error("initialization error: {0}")]
    Init(String),
    /// Anything backend-specific not covered above
    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether the caller may reasonably retry
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Io(_) => true,
            StorageError::Database(_) => true,
            #[cfg(feature = "kv")]
            StorageError::Kv(_) => true,
            StorageError::Conflict(_) => true,
            StorageError::Backend(_) => true,
            StorageError::Serialization(_) => false,
            StorageError::NotFound(_) => false,
            StorageError::Init(_) => false,
        }
    }
}

/// Storage result type
pub type StorageResult<T> = Result<T, StorageError>;

// ============================================================================
// FILTERS
// ============================================================================

/// Sort key accepted by `list`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    /// Order by `created_at`
    #[default]
    Created,
    /// Order by `updated_at`
    Updated,
    /// Order by `last_accessed_at` (absent sorts last)
    Accessed,
    /// Order by `importance`
    Importance,
}

/// Filter predicate for `list` and `count`.
///
/// `tags` is subset-of: a record matches only if it carries every listed
/// tag. Results come back sorted descending by `sort_by`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryFilter {
    /// Restrict to a tenant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Restrict to an agent within the tenant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Restrict to a memory type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_type: Option<MemoryType>,
    /// Require all of these tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Inclusive lower bound on importance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_importance: Option<f32>,
    /// Inclusive upper bound on importance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_importance: Option<f32>,
    /// Inclusive lower bound on `created_at`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Sort key, descending
    #[serde(default)]
    pub sort_by: SortField,
    /// Page size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Page offset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl MemoryFilter {
    /// Filter scoped to one tenant
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Default::default()
        }
    }

    /// Whether a record satisfies every predicate (ignores paging)
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if let Some(tenant) = &self.tenant_id {
            if &record.tenant_id != tenant {
                return false;
            }
        }
        if let Some(agent) = &self.agent_id {
            if record.agent_id.as_deref() != Some(agent.as_str()) {
                return false;
            }
        }
        if let Some(ty) = self.memory_type {
            if record.memory_type != ty {
                return false;
            }
        }
        if !self.tags.iter().all(|t| record.tags.contains(t)) {
            return false;
        }
        if let Some(min) = self.min_importance {
            if record.importance < min {
                return false;
            }
        }
        if let Some(max) = self.max_importance {
            if record.importance > max {
                return false;
            }
        }
        if let Some(start) = self.start_date {
            if record.created_at < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if record.created_at > end {
                return false;
            }
        }
        true
    }

    /// Sort (descending by `sort_by`, id ascending on ties) and paginate
    pub fn apply_order_and_page(&self, mut records: Vec<MemoryRecord>) -> Vec<MemoryRecord> {
        let sort_by = self.sort_by;
        records.sort_by(|a, b| {
            let ordering = match sort_by {
                SortField::Created => b.created_at.cmp(&a.created_at),
                SortField::Updated => b.updated_at.cmp(&a.updated_at),
                SortField::Accessed => b.last_accessed_at.cmp(&a.last_accessed_at),
                SortField::Importance => b
                    .importance
                    .partial_cmp(&a.importance)
                    .unwrap_or(std::cmp::Ordering::Equal),
            };
            ordering.then_with(|| a.id.cmp(&b.id))
        });

        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);
        records.into_iter().skip(offset).take(limit).collect()
    }
}

// ============================================================================
// ADAPTER HEALTH
// ============================================================================

/// Result of an adapter health probe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterHealth {
    /// Whether the backend answered the probe
    pub ok: bool,
    /// Backend-specific details (counts, skipped records, versions)
    #[serde(default)]
    pub details: HashMap<String, String>,
}

impl AdapterHealth {
    /// Healthy probe with no details
    pub fn ok() -> Self {
        Self {
            ok: true,
            details: HashMap::new(),
        }
    }

    /// Failed probe carrying a reason
    pub fn failed(reason: impl Into<String>) -> Self {
        let mut details = HashMap::new();
        details.insert("error".to_string(), reason.into());
        Self { ok: false, details }
    }
}

// ============================================================================
// ADAPTER CONTRACT
// ============================================================================

/// Persistence contract implemented by every backend
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Open the backend and create any schemas. Idempotent.
    async fn initialize(&self) -> StorageResult<()>;

    /// Upsert a record by id, atomic per call
    async fn store(&self, memory: &MemoryRecord) -> StorageResult<()>;

    /// Fetch a record by id
    async fn retrieve(&self, id: &str) -> StorageResult<Option<MemoryRecord>>;

    /// Apply a partial update atomically; `NotFound` when the id is absent
    async fn update(&self, id: &str, patch: &MemoryPatch) -> StorageResult<()>;

    /// Delete a record by id; returns whether one existed
    async fn delete(&self, id: &str) -> StorageResult<bool>;

    /// Records matching a filter, sorted and paged
    async fn list(&self, filter: &MemoryFilter) -> StorageResult<Vec<MemoryRecord>>;

    /// Number of records matching a filter (paging ignored)
    async fn count(&self, filter: &MemoryFilter) -> StorageResult<u64>;

    /// Remove every record of one tenant (or all); returns removed count
    async fn clear(&self, tenant_id: Option<&str>) -> StorageResult<u64>;

    /// Store a batch transactionally: on failure nothing persists
    async fn bulk_store(&self, memories: &[MemoryRecord]) -> StorageResult<()>;

    /// Probe the backend
    async fn health(&self) -> AdapterHealth;

    /// Flush and release resources
    async fn close(&self) -> StorageResult<()>;
}

// ============================================================================
// TESTS
// ============================================================================
