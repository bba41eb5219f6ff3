//! Memory engine orchestrator
//!
//! The only externally exposed surface. Composes the storage adapter,
//! embedding provider, classifier and in-memory indices, and serializes
//! the cross-cutting invariants: index/storage consistency, tenant
//! isolation, all-or-nothing writes.
//!
//! Locking discipline:
//! - One engine-wide `RwLock` protects the indices and the initialized
//!   flag; mutations take write, recall/stats/health take read.
//! - A sharded per-id mutex serializes mutations of a single id without
//!   blocking unrelated ids.
//! - Access-metadata bumps after recall run without the write lock;
//!   they are best-effort and last-writer-wins.
//!
//! The store+index section of `remember` runs on a spawned task, so a
//! caller dropping the future mid-flight cannot leave a stored record
//! missing from the indices.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lru::LruCache;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classify::{Classifier, HeuristicClassifier};
use crate::config::{EmbeddingProviderKind, EngineConfig, StorageBackend};
use crate::embeddings::{cosine_similarity, EmbeddingProvider, HashEmbedder};
use crate::error::{EngineError, EngineResult};
use crate::index::MemoryIndex;
use crate::memory::{
    clamp_importance, dedup_tags, ContextRequest, ContextResponse, EngineStats, HealthCheck,
    HealthReport, HealthStatus, MemoryPatch, MemoryRecord, RecallHit, RecallOptions,
    RememberOptions, DEFAULT_CONTEXT_MEMORIES, MAX_CONTEXT_MEMORIES, MAX_RECALL_LIMIT,
};
use crate::search::{age_days, final_score, normalize_similarity, order_hits, time_decay_factor};
use crate::storage::{FileStore, MemoryFilter, SortField, SqliteStore, StorageAdapter};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Shards for the per-id mutation locks
const ID_LOCK_SHARDS: usize = 32;

/// Entries kept in the query-embedding cache
const QUERY_CACHE_SIZE: usize = 256;

/// Hard cap on content size
const MAX_CONTENT_BYTES: usize = 1_048_576;

// ============================================================================
// ENGINE STATE
// ============================================================================

struct EngineState {
    initialized: bool,
    index: MemoryIndex,
}

struct EngineInner {
    config: EngineConfig,
    storage: Arc<dyn StorageAdapter>,
    embedder: Arc<dyn EmbeddingProvider>,
    classifier: Box<dyn Classifier>,
    state: RwLock<EngineState>,
    id_locks: Vec<Mutex<()>>,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
    index_healthy: AtomicBool,
}

/// The memory engine. Cheap to clone; clones share one instance.
///
/// Multiple engines may coexist in a process and never share indices.
#[derive(Clone)]
pub struct MemoryEngine {
    inner: Arc<EngineInner>,
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

fn build_storage(config: &EngineConfig) -> EngineResult<Arc<dyn StorageAdapter>> {
    match config.storage.backend {
        StorageBackend::File => Ok(Arc::new(FileStore::new(config.file_root()))),
        StorageBackend::Sql => Ok(Arc::new(SqliteStore::open(config.sqlite_path())?)),
        #[cfg(feature = "kv")]
        StorageBackend::Kv => {
            let url = config.storage.connection.as_deref().unwrap_or_default();
            Ok(Arc::new(crate::storage::RedisStore::new(url)?))
        }
        #[cfg(not(feature = "kv"))]
        StorageBackend::Kv => Err(EngineError::Config(
            "the kv backend requires the `kv` feature".to_string(),
        )),
    }
}

fn build_embedder(config: &EngineConfig) -> EngineResult<Arc<dyn EmbeddingProvider>> {
    let dimension = config.vector.dimension;
    match config.embedding.provider {
        EmbeddingProviderKind::Local => Ok(Arc::new(HashEmbedder::new(dimension))),
        #[cfg(feature = "remote-embeddings")]
        EmbeddingProviderKind::OpenAi | EmbeddingProviderKind::Azure => {
            use crate::embeddings::{RemoteEmbedder, RemoteEmbedderConfig};
            let api_key = config.embedding.api_key.clone().unwrap_or_default();
            let model = config
                .embedding
                .model
                .clone()
                .unwrap_or_else(|| "text-embedding-3-small".to_string());
            let mut remote = if config.embedding.provider == EmbeddingProviderKind::Azure {
                RemoteEmbedderConfig::azure(
                    config.embedding.endpoint.clone().unwrap_or_default(),
                    api_key,
                    model,
                    dimension,
                )
            } else {
                let mut c = RemoteEmbedderConfig::openai(api_key, model, dimension);
                if let Some(endpoint) = config.embedding.endpoint.clone() {
                    c.endpoint = endpoint;
                }
                c
            };
            remote.max_retries = config.embedding.max_retries;
            remote.retry_delay = Duration::from_millis(config.embedding.retry_delay_ms);
            Ok(Arc::new(RemoteEmbedder::new(remote)?))
        }
        #[cfg(not(feature = "remote-embeddings"))]
        EmbeddingProviderKind::OpenAi | EmbeddingProviderKind::Azure => {
            Err(EngineError::Config(
                "remote providers require the `remote-embeddings` feature".to_string(),
            ))
        }
    }
}

impl MemoryEngine {
    /// Build an engine from configuration, constructing the storage
    /// adapter and embedding provider it names
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let storage = build_storage(&config)?;
        let embedder = build_embedder(&config)?;
        Self::with_parts(config, storage, embedder)
    }

    /// Build an engine around explicit components (dependency injection
    /// seam for alternate adapters, providers and tests)
    pub fn with_parts(
        config: EngineConfig,
        storage: Arc<dyn StorageAdapter>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> EngineResult<Self> {
        Self::with_classifier(config, storage, embedder, Box::new(HeuristicClassifier))
    }

    /// Build an engine with a custom classification strategy in place of
    /// the keyword heuristics
    pub fn with_classifier(
        config: EngineConfig,
        storage: Arc<dyn StorageAdapter>,
        embedder: Arc<dyn EmbeddingProvider>,
        classifier: Box<dyn Classifier>,
    ) -> EngineResult<Self> {
        config.validate()?;
        if embedder.dimension() != config.vector.dimension {
            return Err(EngineError::Config(format!(
                "embedding provider dimension ({}) does not match vector.dimension ({})",
                embedder.dimension(),
                config.vector.dimension
            )));
        }
        let cache_size = NonZeroUsize::new(QUERY_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                storage,
                embedder,
                classifier,
                state: RwLock::new(EngineState {
                    initialized: false,
                    index: MemoryIndex::new(),
                }),
                id_locks: (0..ID_LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
                query_cache: Mutex::new(LruCache::new(cache_size)),
                index_healthy: AtomicBool::new(true),
            }),
        })
    }

    /// The configuration this engine was built with
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Recall options seeded from the configured retrieval defaults
    pub fn default_recall_options(&self) -> RecallOptions {
        RecallOptions {
            limit: self.inner.config.retrieval.default_limit,
            threshold: self.inner.config.retrieval.default_threshold,
            ..Default::default()
        }
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

impl EngineInner {
    fn shard_lock(&self, id: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        &self.id_locks[(hasher.finish() as usize) % ID_LOCK_SHARDS]
    }

    async fn ensure_initialized(&self) -> EngineResult<()> {
        if self.state.read().await.initialized {
            Ok(())
        } else {
            Err(EngineError::NotInitialized)
        }
    }

    /// Run a storage call under the adapter deadline
    async fn adapter_call<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T, crate::storage::StorageError>>,
    ) -> EngineResult<T> {
        let ms = self.config.timeouts.adapter_ms;
        match tokio::time::timeout(Duration::from_millis(ms), fut).await {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => Err(EngineError::Timeout {
                operation: operation.to_string(),
                timeout_ms: ms,
            }),
        }
    }

    /// Embed under the embedding deadline and enforce the dimension
    /// invariant on the result
    async fn embed_text(&self, text: &str) -> EngineResult<Vec<f32>> {
        let ms = self.config.timeouts.embedding_ms;
        let vector = match tokio::time::timeout(Duration::from_millis(ms), self.embedder.embed(text))
            .await
        {
            Ok(result) => result.map_err(EngineError::from)?,
            Err(_) => {
                return Err(EngineError::Timeout {
                    operation: "embed".to_string(),
                    timeout_ms: ms,
                })
            }
        };
        if vector.len() != self.config.vector.dimension {
            return Err(EngineError::Embedding {
                message: format!(
                    "provider returned dimension {}, configured {}",
                    vector.len(),
                    self.config.vector.dimension
                ),
                retryable: false,
            });
        }
        Ok(vector)
    }

    /// Embed a recall query through the LRU cache; providers are
    /// deterministic per process, so entries never need invalidation
    async fn embed_query(&self, text: &str) -> EngineResult<Vec<f32>> {
        {
            let mut cache = self.query_cache.lock().await;
            if let Some(vector) = cache.get(text) {
                return Ok(vector.clone());
            }
        }
        let vector = self.embed_text(text).await?;
        self.query_cache
            .lock()
            .await
            .put(text.to_string(), vector.clone());
        Ok(vector)
    }

    /// Store-then-index section of `remember`. Runs on a spawned task so
    /// cancellation of the caller cannot separate the two steps; if the
    /// engine closed in between, the stored record is deleted again.
    async fn persist_and_index(&self, record: MemoryRecord) -> EngineResult<()> {
        let _guard = self.shard_lock(&record.id).lock().await;

        self.adapter_call("store", self.storage.store(&record)).await?;

        let mut state = self.state.write().await;
        if !state.initialized {
            drop(state);
            if let Err(e) = self.storage.delete(&record.id).await {
                // A record now sits in storage that no index knows about
                self.index_healthy.store(false, Ordering::Relaxed);
                warn!(id = %record.id, error = %e, "failed to compensate orphaned store");
            }
            return Err(EngineError::NotInitialized);
        }
        state.index.insert(&record);
        Ok(())
    }

    /// Best-effort removal used for lazily expired memories
    async fn forget_expired(&self, record: &MemoryRecord) {
        let _guard = self.shard_lock(&record.id).lock().await;
        {
            let mut state = self.state.write().await;
            state.index.remove(record);
        }
        if let Err(e) = self.storage.delete(&record.id).await {
            warn!(id = %record.id, error = %e, "failed to delete expired memory");
        } else {
            debug!(id = %record.id, "expired memory removed");
        }
    }
}

impl MemoryEngine {
    /// Apply the whole-operation deadline
    async fn with_deadline<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = EngineResult<T>>,
    ) -> EngineResult<T> {
        let ms = self.inner.config.timeouts.overall_ms;
        match tokio::time::timeout(Duration::from_millis(ms), fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout {
                operation: operation.to_string(),
                timeout_ms: ms,
            }),
        }
    }
}

fn validate_tenant(tenant_id: &str) -> EngineResult<()> {
    if tenant_id.trim().is_empty() {
        return Err(EngineError::Validation(
            "tenant_id must not be empty".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// LIFECYCLE
// ============================================================================

impl MemoryEngine {
    /// Open the adapter, load every persisted memory, verify invariants
    /// and rebuild the indices. Idempotent; a single invalid record
    /// rejects the whole initialization.
    pub async fn initialize(&self) -> EngineResult<()> {
        let inner = &self.inner;
        if inner.state.read().await.initialized {
            return Ok(());
        }

        inner
            .adapter_call("initialize", inner.storage.initialize())
            .await?;
        let all = inner
            .adapter_call("list", inner.storage.list(&MemoryFilter::default()))
            .await?;

        let dimension = inner.config.vector.dimension;
        for record in &all {
            record
                .check_invariants(dimension)
                .map_err(EngineError::Validation)?;
        }

        let mut state = inner.state.write().await;
        if state.initialized {
            return Ok(());
        }
        state.index.reindex_all(all.iter());
        state.initialized = true;
        inner.index_healthy.store(true, Ordering::Relaxed);
        info!(total = all.len(), "memory engine initialized");
        Ok(())
    }

    /// Flush the adapter, drop the indices and leave the engine
    /// uninitialized; later operations fail with `NotInitialized`
    pub async fn close(&self) -> EngineResult<()> {
        let inner = &self.inner;
        let mut state = inner.state.write().await;
        if !state.initialized {
            return Ok(());
        }
        inner
            .adapter_call("close", inner.storage.close())
            .await?;
        state.index.clear();
        state.initialized = false;
        info!("memory engine closed");
        Ok(())
    }

    /// Rebuild every index from storage. Clears a degraded-index state
    /// when it succeeds.
    pub async fn reindex(&self) -> EngineResult<()> {
        let inner = &self.inner;
        inner.ensure_initialized().await?;
        let all = inner
            .adapter_call("list", inner.storage.list(&MemoryFilter::default()))
            .await?;
        let mut state = inner.state.write().await;
        if !state.initialized {
            return Err(EngineError::NotInitialized);
        }
        state.index.reindex_all(all.iter());
        inner.index_healthy.store(true, Ordering::Relaxed);
        info!(total = all.len(), "indices rebuilt");
        Ok(())
    }
}

// ============================================================================
// WRITE PATH
// ============================================================================

impl MemoryEngine {
    /// Store a new memory and return its id.
    ///
    /// Embeds the content, classifies and scores it when the caller did
    /// not, persists the record and inserts it into every index. On an
    /// embedding or storage failure no index is touched.
    pub async fn remember(
        &self,
        content: &str,
        tenant_id: &str,
        agent_id: Option<&str>,
        opts: RememberOptions,
    ) -> EngineResult<String> {
        let correlation = Uuid::new_v4();
        debug!(correlation = %correlation, tenant = %tenant_id, "remember");
        self.with_deadline("remember", async {
            let inner = &self.inner;
            inner.ensure_initialized().await?;

            let content = content.trim();
            if content.is_empty() {
                return Err(EngineError::Validation(
                    "content must not be empty".to_string(),
                ));
            }
            if content.len() > MAX_CONTENT_BYTES {
                return Err(EngineError::Validation(format!(
                    "content exceeds {} bytes",
                    MAX_CONTENT_BYTES
                )));
            }
            validate_tenant(tenant_id)?;
            if let Some(agent) = agent_id {
                if agent.trim().is_empty() {
                    return Err(EngineError::Validation(
                        "agent_id must not be empty when provided".to_string(),
                    ));
                }
            }

            let embedding = inner.embed_text(content).await?;
            let memory_type = opts
                .memory_type
                .unwrap_or_else(|| inner.classifier.classify(content));
            let importance = clamp_importance(
                opts.importance
                    .unwrap_or_else(|| inner.classifier.score(content)),
            );

            let now = Utc::now();
            let id = Uuid::new_v4().to_string();
            let record = MemoryRecord {
                id: id.clone(),
                tenant_id: tenant_id.trim().to_string(),
                agent_id: agent_id.map(|a| a.trim().to_string()),
                memory_type,
                content: content.to_string(),
                embedding,
                confidence: 1.0,
                importance,
                emotional_weight: opts.emotional_weight.map(|w| w.clamp(-1.0, 1.0)),
                tags: dedup_tags(&opts.tags),
                context: opts.context,
                created_at: now,
                updated_at: now,
                last_accessed_at: None,
                access_count: 0,
                ttl: opts.ttl,
            };

            // Detach the store+index critical section from this future's
            // lifetime; dropping the caller cannot orphan the record.
            let task_inner = Arc::clone(&self.inner);
            let handle =
                tokio::spawn(async move { task_inner.persist_and_index(record).await });
            handle.await.map_err(|e| EngineError::Storage {
                message: format!("persist task failed: {}", e),
                retryable: false,
            })??;

            debug!(correlation = %correlation, id = %id, "memory stored");
            Ok(id)
        })
        .await
    }

    /// Remove a memory by id. Returns whether one existed; absent ids
    /// are not an error.
    pub async fn forget_by_id(&self, id: &str) -> EngineResult<bool> {
        self.with_deadline("forget", async {
            let inner = &self.inner;
            inner.ensure_initialized().await?;

            let _guard = inner.shard_lock(id).lock().await;
            let Some(record) = inner
                .adapter_call("retrieve", inner.storage.retrieve(id))
                .await?
            else {
                return Ok(false);
            };

            {
                let mut state = inner.state.write().await;
                if !state.initialized {
                    return Err(EngineError::NotInitialized);
                }
                state.index.remove(&record);
            }

            match inner.adapter_call("delete", inner.storage.delete(id)).await {
                Ok(_) => {
                    debug!(id = %id, "memory forgotten");
                    Ok(true)
                }
                Err(e) => {
                    // Undo the index removal so storage and indices agree
                    let mut state = inner.state.write().await;
                    state.index.insert(&record);
                    Err(e)
                }
            }
        })
        .await
    }

    /// Recall with a permissive threshold, then delete the matches whose
    /// similarity reaches `confirm_threshold`. Returns the number
    /// removed.
    pub async fn forget_by_query(
        &self,
        query: &str,
        tenant_id: &str,
        agent_id: Option<&str>,
        confirm_threshold: f64,
    ) -> EngineResult<u64> {
        if !(0.0..=1.0).contains(&confirm_threshold) {
            return Err(EngineError::Validation(
                "confirm_threshold must be in [0, 1]".to_string(),
            ));
        }

        let hits = self
            .recall(
                query,
                tenant_id,
                agent_id,
                RecallOptions {
                    limit: MAX_RECALL_LIMIT,
                    threshold: 0.0,
                    memory_type: None,
                    tags: Vec::new(),
                    time_decay: false,
                    include_context: false,
                },
            )
            .await?;

        let mut removed = 0;
        for hit in hits {
            if hit.score >= confirm_threshold && self.forget_by_id(&hit.memory.id).await? {
                removed += 1;
            }
        }
        info!(tenant = %tenant_id, removed, "forget by query finished");
        Ok(removed)
    }

    /// Apply a partial update. Identity fields cannot change;
    /// `updated_at` is always stamped; content changes re-embed and only
    /// the indices whose keys changed are touched.
    pub async fn update(&self, id: &str, patch: MemoryPatch) -> EngineResult<()> {
        self.with_deadline("update", async {
            let inner = &self.inner;
            inner.ensure_initialized().await?;

            if let Some(content) = &patch.content {
                if content.trim().is_empty() {
                    return Err(EngineError::Validation(
                        "content must not be empty".to_string(),
                    ));
                }
                if content.len() > MAX_CONTENT_BYTES {
                    return Err(EngineError::Validation(format!(
                        "content exceeds {} bytes",
                        MAX_CONTENT_BYTES
                    )));
                }
            }

            let _guard = inner.shard_lock(id).lock().await;
            let old = inner
                .adapter_call("retrieve", inner.storage.retrieve(id))
                .await?
                .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

            let mut resolved = patch;
            resolved.updated_at = Some(Utc::now());
            if let Some(content) = resolved.content.clone() {
                let trimmed = content.trim().to_string();
                if trimmed != old.content {
                    resolved.embedding = Some(inner.embed_text(&trimmed).await?);
                }
                resolved.content = Some(trimmed);
            }

            inner
                .adapter_call("update", inner.storage.update(id, &resolved))
                .await?;

            let mut revised = old.clone();
            revised.apply_patch(&resolved);

            let keys_changed = revised.memory_type != old.memory_type
                || revised.tags != old.tags
                || revised.content != old.content;
            if keys_changed {
                let mut state = inner.state.write().await;
                if !state.initialized {
                    return Err(EngineError::NotInitialized);
                }
                state.index.remove(&old);
                state.index.insert(&revised);
            }
            debug!(id = %id, reindexed = keys_changed, "memory updated");
            Ok(())
        })
        .await
    }
}

// ============================================================================
// READ PATH
// ============================================================================

impl MemoryEngine {
    /// Rank a tenant's memories against a natural-language query.
    ///
    /// Results are sorted by final score descending (ties: `updated_at`
    /// descending, id ascending), every score meets the threshold, and at
    /// most `limit` are returned. Surfaced memories get their access
    /// metadata bumped, written through best-effort.
    pub async fn recall(
        &self,
        query: &str,
        tenant_id: &str,
        agent_id: Option<&str>,
        opts: RecallOptions,
    ) -> EngineResult<Vec<RecallHit>> {
        let correlation = Uuid::new_v4();
        debug!(correlation = %correlation, tenant = %tenant_id, "recall");
        self.with_deadline("recall", async {
            let inner = &self.inner;
            inner.ensure_initialized().await?;
            validate_tenant(tenant_id)?;

            if opts.limit == 0 {
                return Ok(Vec::new());
            }
            if opts.limit > MAX_RECALL_LIMIT {
                return Err(EngineError::Validation(format!(
                    "limit must not exceed {}",
                    MAX_RECALL_LIMIT
                )));
            }
            if !(0.0..=1.0).contains(&opts.threshold) {
                return Err(EngineError::Validation(
                    "threshold must be in [0, 1]".to_string(),
                ));
            }

            let query_embedding = inner.embed_query(query).await?;

            let mut filter = MemoryFilter::for_tenant(tenant_id);
            filter.agent_id = agent_id.map(|a| a.to_string());
            let candidates = inner
                .adapter_call("list", inner.storage.list(&filter))
                .await?;

            let now = Utc::now();
            let half_life = inner.config.retrieval.half_life_days;
            let min_score = inner.config.retrieval.min_score;

            let mut hits = Vec::new();
            let mut expired = Vec::new();
            {
                let state = inner.state.read().await;
                if !state.initialized {
                    return Err(EngineError::NotInitialized);
                }

                let tag_candidates = if opts.tags.is_empty() {
                    None
                } else {
                    Some(state.index.ids_with_any_tag(&opts.tags))
                };

                for record in candidates {
                    if record.is_expired(now) {
                        expired.push(record);
                        continue;
                    }
                    if let Some(ty) = opts.memory_type {
                        let in_type = state
                            .index
                            .ids_with_type(ty)
                            .is_some_and(|ids| ids.contains(&record.id));
                        if !in_type {
                            continue;
                        }
                    }
                    if let Some(tagged) = &tag_candidates {
                        if !tagged.contains(&record.id) {
                            continue;
                        }
                    }

                    let embedding = state
                        .index
                        .embedding(&record.id)
                        .unwrap_or(&record.embedding);
                    let normalized =
                        normalize_similarity(cosine_similarity(&query_embedding, embedding));
                    let score = if opts.time_decay {
                        let age = age_days(record.decay_reference(), now);
                        final_score(
                            normalized,
                            Some(time_decay_factor(age, half_life)),
                            min_score,
                        )
                    } else {
                        normalized
                    };
                    if score < opts.threshold {
                        continue;
                    }
                    hits.push(RecallHit {
                        memory: record,
                        score,
                    });
                }
            }

            // Lazily drop memories whose TTL passed; never fails recall
            for record in &expired {
                inner.forget_expired(record).await;
            }

            order_hits(&mut hits);
            hits.truncate(opts.limit);

            // Access-metadata bumps: advisory, last-writer-wins
            for hit in &mut hits {
                hit.memory.access_count += 1;
                hit.memory.last_accessed_at = Some(now);
                if let Err(e) = inner
                    .adapter_call("store", inner.storage.store(&hit.memory))
                    .await
                {
                    warn!(id = %hit.memory.id, error = %e, "access metadata write-through failed");
                }
            }

            if !opts.include_context {
                for hit in &mut hits {
                    hit.memory.context.clear();
                }
            }

            debug!(correlation = %correlation, results = hits.len(), "recall finished");
            Ok(hits)
        })
        .await
    }

    /// Build a context window: recall around a topic (or take the most
    /// recent important memories when no topic is given), filter by
    /// requested types, and compose a templated summary.
    pub async fn context(&self, request: ContextRequest) -> EngineResult<ContextResponse> {
        self.with_deadline("context", async {
            let inner = &self.inner;
            inner.ensure_initialized().await?;
            validate_tenant(&request.tenant_id)?;

            let max_memories = request.max_memories.unwrap_or(DEFAULT_CONTEXT_MEMORIES);
            if max_memories > MAX_CONTEXT_MEMORIES {
                return Err(EngineError::Validation(format!(
                    "max_memories must not exceed {}",
                    MAX_CONTEXT_MEMORIES
                )));
            }

            let topic = request.topic.clone().unwrap_or_default();
            let mut memories: Vec<MemoryRecord> = if topic.trim().is_empty() {
                // No topic: most recent important memories first
                let mut filter = MemoryFilter::for_tenant(&request.tenant_id);
                filter.agent_id = request.agent_id.clone();
                filter.sort_by = SortField::Updated;
                let now = Utc::now();
                let mut listed = inner
                    .adapter_call("list", inner.storage.list(&filter))
                    .await?;
                listed.retain(|m| !m.is_expired(now));
                listed.sort_by(|a, b| {
                    b.importance
                        .partial_cmp(&a.importance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| b.updated_at.cmp(&a.updated_at))
                        .then_with(|| a.id.cmp(&b.id))
                });
                listed
            } else {
                let hits = self
                    .recall(
                        &topic,
                        &request.tenant_id,
                        request.agent_id.as_deref(),
                        RecallOptions {
                            limit: MAX_RECALL_LIMIT,
                            threshold: 0.0,
                            memory_type: None,
                            tags: Vec::new(),
                            time_decay: true,
                            include_context: true,
                        },
                    )
                    .await?;
                hits.into_iter().map(|h| h.memory).collect()
            };

            if !request.memory_types.is_empty() {
                memories.retain(|m| request.memory_types.contains(&m.memory_type));
            }

            let total_count = memories.len();
            memories.truncate(max_memories);

            let confidence = if memories.is_empty() {
                0.0
            } else {
                memories.iter().map(|m| m.confidence as f64).sum::<f64>() / memories.len() as f64
            };

            Ok(ContextResponse {
                summary: summarize(&memories),
                confidence,
                generated_at: Utc::now(),
                total_count,
                memories,
            })
        })
        .await
    }
}

/// Fixed-template summary: type counts, top tags, time range
fn summarize(memories: &[MemoryRecord]) -> String {
    if memories.is_empty() {
        return "No matching memories.".to_string();
    }

    let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_tag: BTreeMap<&str, usize> = BTreeMap::new();
    for memory in memories {
        *by_type.entry(memory.memory_type.as_str()).or_default() += 1;
        for tag in &memory.tags {
            *by_tag.entry(tag.as_str()).or_default() += 1;
        }
    }

    let types = by_type
        .iter()
        .map(|(ty, count)| format!("{} {}", count, ty))
        .collect::<Vec<_>>()
        .join(", ");

    let mut tags: Vec<(&str, usize)> = by_tag.into_iter().collect();
    tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let top_tags = tags
        .iter()
        .take(3)
        .map(|(tag, _)| *tag)
        .collect::<Vec<_>>()
        .join(", ");

    let oldest = memories.iter().map(|m| m.created_at).min();
    let newest = memories.iter().map(|m| m.created_at).max();

    let mut summary = format!("{} memories: {}", memories.len(), types);
    if !top_tags.is_empty() {
        summary.push_str(&format!("; top tags: {}", top_tags));
    }
    if let (Some(oldest), Some(newest)) = (oldest, newest) {
        summary.push_str(&format!(
            "; spanning {} to {}",
            oldest.format("%Y-%m-%d"),
            newest.format("%Y-%m-%d")
        ));
    }
    summary
}

// ============================================================================
// TELEMETRY
// ============================================================================

impl MemoryEngine {
    /// Aggregate statistics across the whole store
    pub async fn stats(&self) -> EngineResult<EngineStats> {
        let inner = &self.inner;
        inner.ensure_initialized().await?;

        let all = inner
            .adapter_call("list", inner.storage.list(&MemoryFilter::default()))
            .await?;
        let now = Utc::now();
        let live: Vec<&MemoryRecord> = all.iter().filter(|m| !m.is_expired(now)).collect();

        let mut by_type: BTreeMap<String, u64> = BTreeMap::new();
        for memory in &live {
            *by_type.entry(memory.memory_type.as_str().to_string()).or_default() += 1;
        }

        let avg_importance = if live.is_empty() {
            0.0
        } else {
            live.iter().map(|m| m.importance as f64).sum::<f64>() / live.len() as f64
        };

        let day_ago = now - chrono::Duration::hours(24);
        let recent_activity_24h = live
            .iter()
            .filter(|m| m.last_accessed_at.is_some_and(|at| at >= day_ago))
            .count() as u64;

        let index_sizes = inner.state.read().await.index.sizes();

        Ok(EngineStats {
            total: live.len() as u64,
            by_type,
            avg_importance,
            recent_activity_24h,
            index_sizes,
            oldest_memory: live.iter().map(|m| m.created_at).min(),
            newest_memory: live.iter().map(|m| m.created_at).max(),
        })
    }

    /// Probe the adapter and the embedding provider and classify the
    /// engine's overall health
    pub async fn health(&self) -> HealthReport {
        let inner = &self.inner;
        let initialized = inner.state.read().await.initialized;

        let storage_health = {
            let ms = inner.config.timeouts.adapter_ms;
            match tokio::time::timeout(Duration::from_millis(ms), inner.storage.health()).await {
                Ok(health) => health,
                Err(_) => crate::storage::AdapterHealth::failed("health probe timed out"),
            }
        };
        let storage_check = HealthCheck {
            name: "storage".to_string(),
            ok: storage_health.ok,
            detail: if storage_health.ok {
                let mut details: Vec<String> = storage_health
                    .details
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                details.sort();
                details.join(" ")
            } else {
                storage_health
                    .details
                    .get("error")
                    .cloned()
                    .unwrap_or_else(|| "probe failed".to_string())
            },
        };

        let embedding_check = match inner.embed_text("health probe").await {
            Ok(_) => HealthCheck {
                name: "embedding".to_string(),
                ok: true,
                detail: format!("dimension {}", inner.config.vector.dimension),
            },
            Err(e) => HealthCheck {
                name: "embedding".to_string(),
                ok: false,
                detail: e.to_string(),
            },
        };

        let index_ok = inner.index_healthy.load(Ordering::Relaxed);
        let index_check = HealthCheck {
            name: "index".to_string(),
            ok: index_ok,
            detail: if index_ok {
                "consistent".to_string()
            } else {
                "inconsistent; reindex required".to_string()
            },
        };

        let failures = [&storage_check, &embedding_check]
            .iter()
            .filter(|c| !c.ok)
            .count();
        let status = if !initialized || !index_ok {
            HealthStatus::Unhealthy
        } else {
            match failures {
                0 => HealthStatus::Healthy,
                1 => HealthStatus::Degraded,
                _ => HealthStatus::Unhealthy,
            }
        };

        HealthReport {
            status,
            initialized,
            checks: vec![storage_check, embedding_check, index_check],
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// MAINTENANCE
// ============================================================================

impl MemoryEngine {
    /// Eagerly delete every memory whose TTL has passed. Returns the
    /// number removed.
    pub async fn sweep_expired(&self) -> EngineResult<u64> {
        let inner = &self.inner;
        inner.ensure_initialized().await?;

        let all = inner
            .adapter_call("list", inner.storage.list(&MemoryFilter::default()))
            .await?;
        let now = Utc::now();
        let mut removed = 0;
        for record in all.iter().filter(|m| m.is_expired(now)) {
            inner.forget_expired(record).await;
            removed += 1;
        }
        if removed > 0 {
            info!(removed, "expired memories swept");
        }
        Ok(removed)
    }

    /// Remove every memory of one tenant from storage and indices.
    /// Returns the number removed.
    pub async fn forget_tenant(&self, tenant_id: &str) -> EngineResult<u64> {
        let inner = &self.inner;
        inner.ensure_initialized().await?;
        validate_tenant(tenant_id)?;

        let doomed = inner
            .adapter_call("list", inner.storage.list(&MemoryFilter::for_tenant(tenant_id)))
            .await?;
        {
            let mut state = inner.state.write().await;
            if !state.initialized {
                return Err(EngineError::NotInitialized);
            }
            for record in &doomed {
                state.index.remove(record);
            }
        }
        let removed = inner
            .adapter_call("clear", inner.storage.clear(Some(tenant_id)))
            .await?;
        info!(tenant = %tenant_id, removed, "tenant forgotten");
        Ok(removed)
    }
}

// ============================================================================
// TESTS
// ============================================================================
