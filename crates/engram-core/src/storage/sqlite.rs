//! SQLite storage
//!
//! Single `memories` table with the record fields, JSON columns for tags
//! and context, and the embedding as a little-endian f32 blob. Tag
//! membership queries go through `json_each`; updates carry an optimistic
//! `updated_at` check. Store, update, delete, bulk and clear all run
//! inside explicit transactions.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};
use tracing::debug;

use crate::memory::{MemoryPatch, MemoryRecord, MemoryType};

use super::{AdapterHealth, MemoryFilter, SortField, StorageAdapter, StorageError, StorageResult};

// ============================================================================
// MIGRATIONS
// ============================================================================

/// A schema migration step
struct Migration {
    version: i64,
    up: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    up: "
        CREATE TABLE IF NOT EXISTS memories (
            id               TEXT PRIMARY KEY,
            tenant_id        TEXT NOT NULL,
            agent_id         TEXT,
            memory_type      TEXT NOT NULL,
            content          TEXT NOT NULL,
            embedding        BLOB NOT NULL,
            confidence       REAL NOT NULL,
            importance       REAL NOT NULL,
            emotional_weight REAL,
            tags             TEXT NOT NULL DEFAULT '[]',
            context          TEXT NOT NULL DEFAULT '{}',
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL,
            last_accessed_at TEXT,
            access_count     INTEGER NOT NULL DEFAULT 0,
            ttl              TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_memories_tenant     ON memories(tenant_id);
        CREATE INDEX IF NOT EXISTS idx_memories_agent      ON memories(tenant_id, agent_id);
        CREATE INDEX IF NOT EXISTS idx_memories_type       ON memories(memory_type);
        CREATE INDEX IF NOT EXISTS idx_memories_importance ON memories(importance);
        CREATE INDEX IF NOT EXISTS idx_memories_created    ON memories(created_at);
        CREATE INDEX IF NOT EXISTS idx_memories_updated    ON memories(updated_at);
        CREATE INDEX IF NOT EXISTS idx_memories_accessed   ON memories(last_accessed_at);
    ",
}];

fn apply_migrations(conn: &Connection) -> StorageResult<()> {
    let current: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        conn.execute_batch(migration.up)?;
        conn.pragma_update(None, "user_version", migration.version)?;
        debug!(version = migration.version, "applied schema migration");
    }
    Ok(())
}

// ============================================================================
// TIMESTAMPS AND BLOBS
// ============================================================================

/// Fixed-width UTC encoding so lexicographic string order is time order
fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode_ts(value: &str, field: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("invalid {} timestamp {:?}: {}", field, value, e),
                )),
            )
        })
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

fn blob_to_embedding(blob: &[u8]) -> rusqlite::Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Blob,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("embedding blob length {} is not a multiple of 4", blob.len()),
            )),
        ));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

// ============================================================================
// STORE
// ============================================================================

/// SQLite storage adapter.
///
/// Separate reader/writer connections behind mutexes give interior
/// mutability, so the adapter is `Send + Sync` and shareable via `Arc`.
pub struct SqliteStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and ensure the
    /// schema is current
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer = Connection::open(&path)?;
        Self::configure_connection(&writer)?;
        apply_migrations(&writer)?;

        let reader = Connection::open(&path)?;
        Self::configure_connection(&reader)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            path,
        })
    }

    fn configure_connection(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    fn lock_writer(&self) -> StorageResult<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StorageError::Backend("writer lock poisoned".to_string()))
    }

    fn lock_reader(&self) -> StorageResult<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StorageError::Backend("reader lock poisoned".to_string()))
    }

    /// Convert a row to a record
    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<MemoryRecord> {
        let memory_type: String = row.get("memory_type")?;
        let memory_type: MemoryType = memory_type.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        let embedding_blob: Vec<u8> = row.get("embedding")?;
        let tags_json: String = row.get("tags")?;
        let context_json: String = row.get("context")?;

        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let last_accessed_at: Option<String> = row.get("last_accessed_at")?;
        let ttl: Option<String> = row.get("ttl")?;

        Ok(MemoryRecord {
            id: row.get("id")?,
            tenant_id: row.get("tenant_id")?,
            agent_id: row.get("agent_id")?,
            memory_type,
            content: row.get("content")?,
            embedding: blob_to_embedding(&embedding_blob)?,
            confidence: row.get("confidence")?,
            importance: row.get("importance")?,
            emotional_weight: row.get("emotional_weight")?,
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            context: serde_json::from_str(&context_json).unwrap_or_default(),
            created_at: decode_ts(&created_at, "created_at")?,
            updated_at: decode_ts(&updated_at, "updated_at")?,
            last_accessed_at: last_accessed_at
                .map(|s| decode_ts(&s, "last_accessed_at"))
                .transpose()?,
            access_count: row.get::<_, i64>("access_count")? as u64,
            ttl: ttl.map(|s| decode_ts(&s, "ttl")).transpose()?,
        })
    }

    fn upsert_in(conn: &Connection, memory: &MemoryRecord) -> StorageResult<()> {
        conn.execute(
            "INSERT INTO memories (
                id, tenant_id, agent_id, memory_type, content, embedding,
                confidence, importance, emotional_weight, tags, context,
                created_at, updated_at, last_accessed_at, access_count, ttl
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(id) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                agent_id = excluded.agent_id,
                memory_type = excluded.memory_type,
                content = excluded.content,
                embedding = excluded.embedding,
                confidence = excluded.confidence,
                importance = excluded.importance,
                emotional_weight = excluded.emotional_weight,
                tags = excluded.tags,
                context = excluded.context,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                last_accessed_at = excluded.last_accessed_at,
                access_count = excluded.access_count,
                ttl = excluded.ttl",
            params![
                memory.id,
                memory.tenant_id,
                memory.agent_id,
                memory.memory_type.as_str(),
                memory.content,
                embedding_to_blob(&memory.embedding),
                memory.confidence,
                memory.importance,
                memory.emotional_weight,
                serde_json::to_string(&memory.tags)?,
                serde_json::to_string(&memory.context)?,
                encode_ts(memory.created_at),
                encode_ts(memory.updated_at),
                memory.last_accessed_at.map(encode_ts),
                memory.access_count as i64,
                memory.ttl.map(encode_ts),
            ],
        )?;
        Ok(())
    }

    /// WHERE clause and parameters for a filter
    fn filter_sql(filter: &MemoryFilter) -> (String, Vec<Box<dyn ToSql>>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(tenant) = &filter.tenant_id {
            params.push(Box::new(tenant.clone()));
            clauses.push(format!("tenant_id = ?{}", params.len()));
        }
        if let Some(agent) = &filter.agent_id {
            params.push(Box::new(agent.clone()));
            clauses.push(format!("agent_id = ?{}", params.len()));
        }
        if let Some(ty) = filter.memory_type {
            params.push(Box::new(ty.as_str().to_string()));
            clauses.push(format!("memory_type = ?{}", params.len()));
        }
        for tag in &filter.tags {
            params.push(Box::new(tag.clone()));
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM json_each(memories.tags) WHERE json_each.value = ?{})",
                params.len()
            ));
        }
        if let Some(min) = filter.min_importance {
            params.push(Box::new(min as f64));
            clauses.push(format!("importance >= ?{}", params.len()));
        }
        if let Some(max) = filter.max_importance {
            params.push(Box::new(max as f64));
            clauses.push(format!("importance <= ?{}", params.len()));
        }
        if let Some(start) = filter.start_date {
            params.push(Box::new(encode_ts(start)));
            clauses.push(format!("created_at >= ?{}", params.len()));
        }
        if let Some(end) = filter.end_date {
            params.push(Box::new(encode_ts(end)));
            clauses.push(format!("created_at <= ?{}", params.len()));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        (where_clause, params)
    }

    fn order_sql(sort_by: SortField) -> &'static str {
        match sort_by {
            SortField::Created => " ORDER BY created_at DESC, id ASC",
            SortField::Updated => " ORDER BY updated_at DESC, id ASC",
            SortField::Accessed => " ORDER BY last_accessed_at DESC NULLS LAST, id ASC",
            SortField::Importance => " ORDER BY importance DESC, id ASC",
        }
    }
}

#[async_trait::async_trait]
impl StorageAdapter for SqliteStore {
    async fn initialize(&self) -> StorageResult<()> {
        let conn = self.lock_writer()?;
        apply_migrations(&conn)
    }

    async fn store(&self, memory: &MemoryRecord) -> StorageResult<()> {
        let mut conn = self.lock_writer()?;
        let tx = conn.transaction()?;
        Self::upsert_in(&tx, memory)?;
        tx.commit()?;
        Ok(())
    }

    async fn retrieve(&self, id: &str) -> StorageResult<Option<MemoryRecord>> {
        let conn = self.lock_reader()?;
        let record = conn
            .query_row(
                "SELECT * FROM memories WHERE id = ?1",
                params![id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    async fn update(&self, id: &str, patch: &MemoryPatch) -> StorageResult<()> {
        let mut conn = self.lock_writer()?;
        let tx = conn.transaction()?;

        let existing = tx
            .query_row(
                "SELECT * FROM memories WHERE id = ?1",
                params![id],
                Self::row_to_record,
            )
            .optional()?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        let previous_updated_at = encode_ts(existing.updated_at);
        let mut revised = existing;
        revised.apply_patch(patch);

        let changed = tx.execute(
            "UPDATE memories SET
                memory_type = ?1, content = ?2, embedding = ?3, confidence = ?4,
                importance = ?5, emotional_weight = ?6, tags = ?7, context = ?8,
                updated_at = ?9, last_accessed_at = ?10, access_count = ?11, ttl = ?12
             WHERE id = ?13 AND updated_at = ?14",
            params![
                revised.memory_type.as_str(),
                revised.content,
                embedding_to_blob(&revised.embedding),
                revised.confidence,
                revised.importance,
                revised.emotional_weight,
                serde_json::to_string(&revised.tags)?,
                serde_json::to_string(&revised.context)?,
                encode_ts(revised.updated_at),
                revised.last_accessed_at.map(encode_ts),
                revised.access_count as i64,
                revised.ttl.map(encode_ts),
                id,
                previous_updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::Conflict(format!(
                "memory {} changed during update",
                id
            )));
        }
        tx.commit()?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> StorageResult<bool> {
        let mut conn = self.lock_writer()?;
        let tx = conn.transaction()?;
        let changed = tx.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(changed > 0)
    }

    async fn list(&self, filter: &MemoryFilter) -> StorageResult<Vec<MemoryRecord>> {
        let (where_clause, mut params) = Self::filter_sql(filter);
        let mut sql = format!("SELECT * FROM memories{}", where_clause);
        sql.push_str(Self::order_sql(filter.sort_by));
        if let Some(limit) = filter.limit {
            params.push(Box::new(limit as i64));
            sql.push_str(&format!(" LIMIT ?{}", params.len()));
            if let Some(offset) = filter.offset {
                params.push(Box::new(offset as i64));
                sql.push_str(&format!(" OFFSET ?{}", params.len()));
            }
        } else if let Some(offset) = filter.offset {
            params.push(Box::new(offset as i64));
            sql.push_str(&format!(" LIMIT -1 OFFSET ?{}", params.len()));
        }

        let conn = self.lock_reader()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(params.iter().map(|p| p.as_ref())),
            Self::row_to_record,
        )?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    async fn count(&self, filter: &MemoryFilter) -> StorageResult<u64> {
        let (where_clause, params) = Self::filter_sql(filter);
        let sql = format!("SELECT COUNT(*) FROM memories{}", where_clause);
        let conn = self.lock_reader()?;
        let count: i64 = conn.query_row(
            &sql,
            params_from_iter(params.iter().map(|p| p.as_ref())),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    async fn clear(&self, tenant_id: Option<&str>) -> StorageResult<u64> {
        let mut conn = self.lock_writer()?;
        let tx = conn.transaction()?;
        let removed = match tenant_id {
            Some(tenant) => tx.execute(
                "DELETE FROM memories WHERE tenant_id = ?1",
                params![tenant],
            )?,
            None => tx.execute("DELETE FROM memories", [])?,
        };
        tx.commit()?;
        Ok(removed as u64)
    }

    async fn bulk_store(&self, memories: &[MemoryRecord]) -> StorageResult<()> {
        let mut conn = self.lock_writer()?;
        let tx = conn.transaction()?;
        for memory in memories {
            Self::upsert_in(&tx, memory)?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn health(&self) -> AdapterHealth {
        let count = self
            .lock_reader()
            .and_then(|conn| {
                conn.query_row("SELECT COUNT(*) FROM memories", [], |row| {
                    row.get::<_, i64>(0)
                })
                .map_err(StorageError::from)
            });
        match count {
            Ok(total) => {
                let mut health = AdapterHealth::ok();
                health
                    .details
                    .insert("backend".to_string(), "sql".to_string());
                health
                    .details
                    .insert("path".to_string(), self.path.display().to_string());
                health.details.insert("records".to_string(), total.to_string());
                health
            }
            Err(e) => AdapterHealth::failed(e.to_string()),
        }
    }

    async fn close(&self) -> StorageResult<()> {
        let conn = self.lock_writer()?;
        // Fold the WAL back into the main file before shutdown
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
