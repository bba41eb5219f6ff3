//! Memory module - Core types and data structures
//!
//! Defines:
//! - The tenant-scoped memory record and its invariants
//! - Write options, patches and recall tuning
//! - Context synthesis request/response envelopes
//! - Engine statistics and health reporting

mod record;

pub use record::{
    clamp_importance, dedup_tags, ContextRequest, ContextResponse, MemoryPatch, MemoryRecord,
    MemoryType, RecallHit, RecallOptions, RememberOptions, DEFAULT_CONTEXT_MEMORIES,
    DEFAULT_RECALL_LIMIT, DEFAULT_RECALL_THRESHOLD, MAX_CONTEXT_MEMORIES, MAX_IMPORTANCE,
    MAX_RECALL_LIMIT, MIN_IMPORTANCE,
};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// ENGINE STATISTICS
// ============================================================================

/// Sizes of the in-memory secondary indices
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSizes {
    /// Distinct memory types indexed
    pub types: usize,
    /// Distinct tags indexed
    pub tags: usize,
    /// Distinct keyword tokens indexed
    pub keywords: usize,
    /// Embeddings held in the semantic index
    pub semantic: usize,
}

/// Aggregate statistics over the whole store
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    /// Total live memories
    pub total: u64,
    /// Count per memory type
    pub by_type: BTreeMap<String, u64>,
    /// Mean importance over the non-empty set, 0 when empty
    pub avg_importance: f64,
    /// Memories accessed within the last 24 hours
    pub recent_activity_24h: u64,
    /// Current in-memory index sizes
    pub index_sizes: IndexSizes,
    /// Timestamp of the oldest memory
    pub oldest_memory: Option<DateTime<Utc>>,
    /// Timestamp of the newest memory
    pub newest_memory: Option<DateTime<Utc>>,
}

impl Default for EngineStats {
    fn default() -> Self {
        Self {
            total: 0,
            by_type: BTreeMap::new(),
            avg_importance: 0.0,
            recent_activity_24h: 0,
            index_sizes: IndexSizes::default(),
            oldest_memory: None,
            newest_memory: None,
        }
    }
}

// ============================================================================
// HEALTH REPORTING
// ============================================================================

/// Tri-state health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All component checks passed
    Healthy,
    /// Exactly one component check failed
    Degraded,
    /// Multiple failures, or the engine is not initialized
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Result of a single component probe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    /// Component name ("storage", "embedding", "index")
    pub name: String,
    /// Whether the probe passed
    pub ok: bool,
    /// Human-readable detail
    pub detail: String,
}

/// Structured health report for the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Overall classification
    pub status: HealthStatus,
    /// Whether `initialize` has completed and `close` has not
    pub initialized: bool,
    /// Individual component probes
    pub checks: Vec<HealthCheck>,
    /// When the report was generated
    pub timestamp: DateTime<Utc>,
}
