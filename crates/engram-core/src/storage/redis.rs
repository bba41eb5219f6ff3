//! Redis key-value storage
//!
//! The record lives at `memory:{id}` as canonical JSON plus two reserved
//! transport fields, `_stored_at` (epoch ms) and `_version`, which readers
//! strip before returning. Secondary keys are maintained in the same
//! MULTI/EXEC transaction as the primary write:
//! - `index:agent:{agent_id}` - set of ids
//! - `index:tag:{tag}` - set of ids
//! - `index:importance` - sorted set, score = floor(importance * 100)
//! - `index:timestamp` - sorted set, score = created_at epoch ms
//!
//! A memory TTL is pushed down to the primary key with `PEXPIREAT`; index
//! entries for expired keys are cleaned lazily on read misses and eagerly
//! on explicit delete.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::memory::{MemoryPatch, MemoryRecord};

use super::{AdapterHealth, MemoryFilter, StorageAdapter, StorageError, StorageResult};

/// Wire format version written into every value
const WIRE_VERSION: &str = "1";

fn memory_key(id: &str) -> String {
    format!("memory:{}", id)
}

fn agent_key(agent_id: &str) -> String {
    format!("index:agent:{}", agent_id)
}

fn tag_key(tag: &str) -> String {
    format!("index:tag:{}", tag)
}

const IMPORTANCE_KEY: &str = "index:importance";
const TIMESTAMP_KEY: &str = "index:timestamp";

fn importance_score(memory: &MemoryRecord) -> i64 {
    (memory.importance * 100.0).floor() as i64
}

/// Serialize with the reserved transport fields injected
fn encode_value(memory: &MemoryRecord) -> StorageResult<String> {
    let mut value = serde_json::to_value(memory)?;
    if let serde_json::Value::Object(map) = &mut value {
        map.insert(
            "_stored_at".to_string(),
            serde_json::json!(chrono::Utc::now().timestamp_millis()),
        );
        map.insert("_version".to_string(), serde_json::json!(WIRE_VERSION));
    }
    Ok(value.to_string())
}

/// Deserialize, dropping any reserved transport fields
fn decode_value(raw: &str) -> StorageResult<MemoryRecord> {
    Ok(serde_json::from_str(raw)?)
}

/// Redis storage adapter
pub struct RedisStore {
    client: redis::Client,
    manager: RwLock<Option<ConnectionManager>>,
}

impl RedisStore {
    /// Create a store for a `redis://` connection URL; no connection is
    /// made until `initialize`
    pub fn new(url: &str) -> StorageResult<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            manager: RwLock::new(None),
        })
    }

    async fn connection(&self) -> StorageResult<ConnectionManager> {
        if let Some(manager) = self.manager.read().await.as_ref() {
            return Ok(manager.clone());
        }
        Err(StorageError::Init(
            "redis store is not initialized".to_string(),
        ))
    }

    /// Queue every index write for a record onto a pipeline
    fn queue_index_writes(pipe: &mut redis::Pipeline, memory: &MemoryRecord) {
        if let Some(agent) = &memory.agent_id {
            pipe.sadd(agent_key(agent), &memory.id).ignore();
        }
        for tag in &memory.tags {
            pipe.sadd(tag_key(tag), &memory.id).ignore();
        }
        pipe.zadd(IMPORTANCE_KEY, &memory.id, importance_score(memory))
            .ignore();
        pipe.zadd(TIMESTAMP_KEY, &memory.id, memory.created_at.timestamp_millis())
            .ignore();
    }

    /// Queue removal of a record's index entries onto a pipeline
    fn queue_index_removes(pipe: &mut redis::Pipeline, memory: &MemoryRecord) {
        if let Some(agent) = &memory.agent_id {
            pipe.srem(agent_key(agent), &memory.id).ignore();
        }
        for tag in &memory.tags {
            pipe.srem(tag_key(tag), &memory.id).ignore();
        }
        pipe.zrem(IMPORTANCE_KEY, &memory.id).ignore();
        pipe.zrem(TIMESTAMP_KEY, &memory.id).ignore();
    }

    /// Write a record and its index entries in one transaction,
    /// clearing index entries of a previous version first
    async fn write_record(
        &self,
        memory: &MemoryRecord,
        previous: Option<&MemoryRecord>,
    ) -> StorageResult<()> {
        let mut con = self.connection().await?;
        let value = encode_value(memory)?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        if let Some(old) = previous {
            Self::queue_index_removes(&mut pipe, old);
        }
        pipe.set(memory_key(&memory.id), value).ignore();
        Self::queue_index_writes(&mut pipe, memory);
        if let Some(ttl) = memory.ttl {
            pipe.cmd("PEXPIREAT")
                .arg(memory_key(&memory.id))
                .arg(ttl.timestamp_millis())
                .ignore();
        }
        pipe.query_async::<_, ()>(&mut con).await?;
        Ok(())
    }

    /// All ids currently in the timestamp index, oldest first
    async fn all_ids(&self) -> StorageResult<Vec<String>> {
        let mut con = self.connection().await?;
        let ids: Vec<String> = con.zrange(TIMESTAMP_KEY, 0, -1).await?;
        Ok(ids)
    }

    /// Fetch records for ids, lazily pruning index entries whose primary
    /// key has expired
    async fn fetch_records(&self, ids: &[String]) -> StorageResult<Vec<MemoryRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut con = self.connection().await?;
        let keys: Vec<String> = ids.iter().map(|id| memory_key(id)).collect();
        let values: Vec<Option<String>> = con.mget(&keys).await?;

        let mut records = Vec::with_capacity(values.len());
        let mut stale: Vec<&String> = Vec::new();
        for (id, value) in ids.iter().zip(values.iter()) {
            match value {
                Some(raw) => match decode_value(raw) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!(id = %id, error = %e, "skipping undecodable memory value"),
                },
                None => stale.push(id),
            }
        }

        if !stale.is_empty() {
            debug!(count = stale.len(), "pruning index entries for expired keys");
            let mut pipe = redis::pipe();
            for id in &stale {
                pipe.zrem(IMPORTANCE_KEY, id.as_str()).ignore();
                pipe.zrem(TIMESTAMP_KEY, id.as_str()).ignore();
            }
            pipe.query_async::<_, ()>(&mut con).await?;
        }
        Ok(records)
    }

    async fn matching_records(&self, filter: &MemoryFilter) -> StorageResult<Vec<MemoryRecord>> {
        let ids = self.all_ids().await?;
        let mut records = self.fetch_records(&ids).await?;
        records.retain(|r| filter.matches(r));
        Ok(records)
    }
}

#[async_trait::async_trait]
impl StorageAdapter for RedisStore {
    async fn initialize(&self) -> StorageResult<()> {
        let mut slot = self.manager.write().await;
        if slot.is_none() {
            let manager = self.client.get_connection_manager().await?;
            *slot = Some(manager);
            debug!("redis store connected");
        }
        Ok(())
    }

    async fn store(&self, memory: &MemoryRecord) -> StorageResult<()> {
        let previous = self.retrieve(&memory.id).await?;
        self.write_record(memory, previous.as_ref()).await
    }

    async fn retrieve(&self, id: &str) -> StorageResult<Option<MemoryRecord>> {
        let mut con = self.connection().await?;
        let value: Option<String> = con.get(memory_key(id)).await?;
        value.as_deref().map(decode_value).transpose()
    }

    async fn update(&self, id: &str, patch: &MemoryPatch) -> StorageResult<()> {
        let previous = self
            .retrieve(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        let mut revised = previous.clone();
        revised.apply_patch(patch);
        self.write_record(&revised, Some(&previous)).await
    }

    async fn delete(&self, id: &str) -> StorageResult<bool> {
        let Some(record) = self.retrieve(id).await? else {
            return Ok(false);
        };
        let mut con = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.del(memory_key(id)).ignore();
        Self::queue_index_removes(&mut pipe, &record);
        pipe.query_async::<_, ()>(&mut con).await?;
        Ok(true)
    }

    async fn list(&self, filter: &MemoryFilter) -> StorageResult<Vec<MemoryRecord>> {
        let records = self.matching_records(filter).await?;
        Ok(filter.apply_order_and_page(records))
    }

    async fn count(&self, filter: &MemoryFilter) -> StorageResult<u64> {
        Ok(self.matching_records(filter).await?.len() as u64)
    }

    async fn clear(&self, tenant_id: Option<&str>) -> StorageResult<u64> {
        let ids = self.all_ids().await?;
        let records = self.fetch_records(&ids).await?;
        let doomed: Vec<&MemoryRecord> = records
            .iter()
            .filter(|r| tenant_id.is_none_or(|t| r.tenant_id == t))
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        let mut con = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for record in &doomed {
            pipe.del(memory_key(&record.id)).ignore();
            Self::queue_index_removes(&mut pipe, record);
        }
        pipe.query_async::<_, ()>(&mut con).await?;
        Ok(doomed.len() as u64)
    }

    async fn bulk_store(&self, memories: &[MemoryRecord]) -> StorageResult<()> {
        if memories.is_empty() {
            return Ok(());
        }
        let mut con = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for memory in memories {
            pipe.set(memory_key(&memory.id), encode_value(memory)?).ignore();
            Self::queue_index_writes(&mut pipe, memory);
            if let Some(ttl) = memory.ttl {
                pipe.cmd("PEXPIREAT")
                    .arg(memory_key(&memory.id))
                    .arg(ttl.timestamp_millis())
                    .ignore();
            }
        }
        pipe.query_async::<_, ()>(&mut con).await?;
        Ok(())
    }

    async fn health(&self) -> AdapterHealth {
        match self.connection().await {
            Ok(mut con) => {
                let pong: Result<String, _> = redis::cmd("PING").query_async(&mut con).await;
                match pong {
                    Ok(_) => {
                        let mut health = AdapterHealth::ok();
                        health
                            .details
                            .insert("backend".to_string(), "kv".to_string());
                        health
                    }
                    Err(e) => AdapterHealth::failed(format!("ping failed: {}", e)),
                }
            }
            Err(e) => AdapterHealth::failed(e.to_string()),
        }
    }

    async fn close(&self) -> StorageResult<()> {
        *self.manager.write().await = None;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
