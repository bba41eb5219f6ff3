//! Memory record - The fundamental unit of storage
//!
//! Each record carries:
//! - Tenant/agent scoping
//! - Content and its dense embedding
//! - Classification, confidence and importance
//! - Access metadata and optional expiry

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// MEMORY TYPES
// ============================================================================

/// Classification of a memory
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// Behavioral traits and style of an agent or user
    Personality,
    /// How-to knowledge, step-by-step processes
    Procedure,
    /// Likes, dislikes, configuration choices
    Preference,
    /// A discrete statement of fact
    Fact,
    /// Conversational context with no stronger classification
    #[default]
    Thread,
    /// Actionable items, deadlines, todos
    Task,
    /// Emotional state or reaction
    Emotion,
}

impl MemoryType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Personality => "personality",
            MemoryType::Procedure => "procedure",
            MemoryType::Preference => "preference",
            MemoryType::Fact => "fact",
            MemoryType::Thread => "thread",
            MemoryType::Task => "task",
            MemoryType::Emotion => "emotion",
        }
    }

    /// All known memory types
    pub fn all() -> &'static [MemoryType] {
        &[
            MemoryType::Personality,
            MemoryType::Procedure,
            MemoryType::Preference,
            MemoryType::Fact,
            MemoryType::Thread,
            MemoryType::Task,
            MemoryType::Emotion,
        ]
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "personality" => Ok(MemoryType::Personality),
            "procedure" => Ok(MemoryType::Procedure),
            "preference" => Ok(MemoryType::Preference),
            "fact" => Ok(MemoryType::Fact),
            "thread" => Ok(MemoryType::Thread),
            "task" => Ok(MemoryType::Task),
            "emotion" => Ok(MemoryType::Emotion),
            _ => Err(format!("Unknown memory type: {}", s)),
        }
    }
}

// ============================================================================
// MEMORY RECORD
// ============================================================================

/// Importance floor applied on every write
pub const MIN_IMPORTANCE: f32 = 0.1;

/// Importance ceiling applied on every write
pub const MAX_IMPORTANCE: f32 = 1.0;

/// A single memory owned by a tenant
///
/// Records are passed by value across the engine boundary; callers never
/// hold aliases into engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Unique identifier (UUID v4), never reused or mutated
    pub id: String,
    /// Isolation key; all queries are scoped by it
    pub tenant_id: String,
    /// Optional sub-scope within a tenant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Classification of this memory
    pub memory_type: MemoryType,
    /// Non-empty, whitespace-trimmed text
    pub content: String,
    /// Dense vector of the configured dimension
    pub embedding: Vec<f32>,
    /// Provenance certainty in [0, 1]
    pub confidence: f32,
    /// Recall value in [0.1, 1.0], clamped on write
    pub importance: f32,
    /// Emotional valence in [-1, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_weight: Option<f32>,
    /// De-duplicated free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Opaque caller-supplied key/value map
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp, always >= created_at
    pub updated_at: DateTime<Utc>,
    /// Set when recall surfaces this memory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Number of times recall surfaced this memory
    #[serde(default)]
    pub access_count: u64,
    /// Absolute expiration; the memory is treated as absent once passed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<DateTime<Utc>>,
}

impl MemoryRecord {
    /// Whether the TTL, if any, has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ttl.is_some_and(|ttl| now > ttl)
    }

    /// Reference timestamp for time decay: last access if present, else creation
    pub fn decay_reference(&self) -> DateTime<Utc> {
        self.last_accessed_at.unwrap_or(self.created_at)
    }

    /// Check the persistence invariants against the configured dimension.
    ///
    /// Returns a description of the first violation, if any.
    pub fn check_invariants(&self, dimension: usize) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("memory id is empty".to_string());
        }
        if self.tenant_id.trim().is_empty() {
            return Err(format!("memory {} has an empty tenant_id", self.id));
        }
        if self.content.trim().is_empty() {
            return Err(format!("memory {} has empty content", self.id));
        }
        if self.embedding.len() != dimension {
            return Err(format!(
                "memory {} has embedding of length {}, expected {}",
                self.id,
                self.embedding.len(),
                dimension
            ));
        }
        if self.updated_at < self.created_at {
            return Err(format!("memory {} has updated_at < created_at", self.id));
        }
        Ok(())
    }

    /// Apply a resolved patch, clamping numeric fields.
    ///
    /// Identity fields (`id`, `tenant_id`, `agent_id`, `created_at`) are not
    /// touched; a patch cannot express changes to them.
    pub fn apply_patch(&mut self, patch: &MemoryPatch) {
        if let Some(content) = &patch.content {
            self.content = content.trim().to_string();
        }
        if let Some(memory_type) = patch.memory_type {
            self.memory_type = memory_type;
        }
        if let Some(importance) = patch.importance {
            self.importance = clamp_importance(importance);
        }
        if let Some(confidence) = patch.confidence {
            self.confidence = confidence.clamp(0.0, 1.0);
        }
        if let Some(weight) = patch.emotional_weight {
            self.emotional_weight = Some(weight.clamp(-1.0, 1.0));
        }
        if let Some(tags) = &patch.tags {
            self.tags = dedup_tags(tags);
        }
        if let Some(context) = &patch.context {
            self.context = context.clone();
        }
        if let Some(ttl) = patch.ttl {
            self.ttl = Some(ttl);
        }
        if let Some(embedding) = &patch.embedding {
            self.embedding = embedding.clone();
        }
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = updated_at;
        }
        if let Some(last_accessed_at) = patch.last_accessed_at {
            self.last_accessed_at = Some(last_accessed_at);
        }
        if let Some(access_count) = patch.access_count {
            self.access_count = access_count;
        }
    }
}

/// Clamp importance into its legal range, silently
pub fn clamp_importance(value: f32) -> f32 {
    value.clamp(MIN_IMPORTANCE, MAX_IMPORTANCE)
}

/// De-duplicate tags preserving first-seen order, dropping empties
pub fn dedup_tags(tags: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

// ============================================================================
// WRITE OPTIONS AND PATCHES
// ============================================================================

/// Optional fields accepted by `remember`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RememberOptions {
    /// Explicit classification; derived by the classifier when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_type: Option<MemoryType>,
    /// Explicit importance; derived heuristically when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<f32>,
    /// Emotional valence in [-1, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_weight: Option<f32>,
    /// Free-form tags, de-duplicated on write
    #[serde(default)]
    pub tags: Vec<String>,
    /// Opaque key/value context
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    /// Absolute expiration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<DateTime<Utc>>,
}

/// Partial update applied by `update`.
///
/// Identity fields are deliberately absent: a patch can never change `id`,
/// `tenant_id`, `agent_id` or `created_at`. The engine resolves `embedding`,
/// `updated_at` and the access-metadata fields itself; callers normally
/// leave them unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryPatch {
    /// Replacement content; triggers re-embedding and re-indexing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Replacement classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_type: Option<MemoryType>,
    /// Replacement importance, clamped on write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<f32>,
    /// Replacement confidence, clamped to [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Replacement emotional weight, clamped to [-1, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_weight: Option<f32>,
    /// Replacement tag set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Replacement context map
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<HashMap<String, serde_json::Value>>,
    /// Replacement expiration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<DateTime<Utc>>,
    /// Resolved by the engine when content changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Stamped by the engine on every update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Access bump, resolved by the engine after recall
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Access bump, resolved by the engine after recall
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_count: Option<u64>,
}

impl MemoryPatch {
    /// Whether the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.memory_type.is_none()
            && self.importance.is_none()
            && self.confidence.is_none()
            && self.emotional_weight.is_none()
            && self.tags.is_none()
            && self.context.is_none()
            && self.ttl.is_none()
            && self.embedding.is_none()
            && self.last_accessed_at.is_none()
            && self.access_count.is_none()
    }
}

// ============================================================================
// RECALL OPTIONS
// ============================================================================

/// Default number of results returned by `recall`
pub const DEFAULT_RECALL_LIMIT: usize = 10;

/// Upper bound on the `recall` limit
pub const MAX_RECALL_LIMIT: usize = 100;

/// Default similarity threshold for `recall`
pub const DEFAULT_RECALL_THRESHOLD: f64 = 0.7;

/// Tuning knobs accepted by `recall`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallOptions {
    /// Maximum number of results (default 10, max 100)
    pub limit: usize,
    /// Minimum final score in [0, 1]
    pub threshold: f64,
    /// Restrict to a single memory type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_type: Option<MemoryType>,
    /// Restrict to memories carrying any of these tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Down-weight older memories exponentially
    pub time_decay: bool,
    /// Include the context map in returned memories
    pub include_context: bool,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_RECALL_LIMIT,
            threshold: DEFAULT_RECALL_THRESHOLD,
            memory_type: None,
            tags: Vec::new(),
            time_decay: true,
            include_context: true,
        }
    }
}

/// A recalled memory with its final score
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallHit {
    /// The surfaced memory
    pub memory: MemoryRecord,
    /// Final score after normalization and optional decay
    pub score: f64,
}

// ============================================================================
// CONTEXT SYNTHESIS
// ============================================================================

/// Default number of memories folded into a context response
pub const DEFAULT_CONTEXT_MEMORIES: usize = 20;

/// Upper bound on `max_memories` for context synthesis
pub const MAX_CONTEXT_MEMORIES: usize = 50;

/// Request for a synthesized context window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRequest {
    /// Tenant whose memories are summarized
    pub tenant_id: String,
    /// Optional agent sub-scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Topic to recall around; empty means "most recent important"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Restrict the response to these types (empty = all)
    #[serde(default)]
    pub memory_types: Vec<MemoryType>,
    /// Maximum memories in the response (default 20, max 50)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memories: Option<usize>,
}

/// Synthesized context window over a tenant's memories
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextResponse {
    /// Selected memories, most relevant first
    pub memories: Vec<MemoryRecord>,
    /// Templated summary: type counts, top tags, time range
    pub summary: String,
    /// Mean confidence of the selected memories
    pub confidence: f64,
    /// When the response was generated
    pub generated_at: DateTime<Utc>,
    /// Matching memories before truncation to `max_memories`
    pub total_count: usize,
}

// ============================================================================
// TESTS
// ============================================================================
