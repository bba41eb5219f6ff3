//! File-backed storage
//!
//! Layout: `{root}/{tenant_id}/{id}.json`, one JSON document per memory
//! with ISO-8601 dates and the embedding as an f32 array. Writes go to a
//! dot-prefixed temp file in the same directory and are renamed into
//! place, so readers never observe torn records. `bulk_store` emulates a
//! transaction by staging the whole batch in a dot-prefixed subdirectory
//! and renaming file-by-file only after every stage succeeded.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::memory::{MemoryPatch, MemoryRecord};

use super::{AdapterHealth, MemoryFilter, StorageAdapter, StorageError, StorageResult};

/// Filesystem storage adapter
pub struct FileStore {
    root: PathBuf,
    /// Unparseable files skipped during list, kept for health reporting
    skipped: AtomicU64,
}

impl FileStore {
    /// Create a store rooted at `root`; nothing touches the disk until
    /// `initialize`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            skipped: AtomicU64::new(0),
        }
    }

    /// Tenant ids become directory names, so path metacharacters are
    /// rejected outright rather than interpreted.
    fn check_tenant_name(tenant_id: &str) -> StorageResult<()> {
        if tenant_id.is_empty()
            || tenant_id.contains('/')
            || tenant_id.contains('\\')
            || tenant_id.starts_with('.')
        {
            return Err(StorageError::Backend(format!(
                "tenant id {:?} is not usable as a directory name",
                tenant_id
            )));
        }
        Ok(())
    }

    fn memory_path(&self, tenant_id: &str, id: &str) -> PathBuf {
        self.root.join(tenant_id).join(format!("{}.json", id))
    }

    async fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
        let dir = path
            .parent()
            .ok_or_else(|| StorageError::Backend("memory path has no parent".to_string()))?;
        fs::create_dir_all(dir).await?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::Backend("memory path has no file name".to_string()))?;
        let tmp = dir.join(format!(".{}.tmp", file_name));

        fs::write(&tmp, bytes).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn read_record(&self, path: &Path) -> StorageResult<Option<MemoryRecord>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Visible (non dot-prefixed) tenant directories under the root
    async fn tenant_dirs(&self) -> StorageResult<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(dirs),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            if entry.file_type().await?.is_dir() {
                dirs.push(entry.path());
            }
        }
        Ok(dirs)
    }

    /// Find the file holding an id, across tenants
    async fn locate(&self, id: &str) -> StorageResult<Option<PathBuf>> {
        let file_name = format!("{}.json", id);
        for dir in self.tenant_dirs().await? {
            let candidate = dir.join(&file_name);
            if fs::try_exists(&candidate).await? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Stream one tenant directory into `out`, skipping and counting
    /// records that fail to parse
    async fn collect_dir(&self, dir: &Path, out: &mut Vec<MemoryRecord>) -> StorageResult<()> {
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || !name.ends_with(".json") {
                continue;
            }
            match fs::read(entry.path()).await {
                Ok(bytes) => match serde_json::from_slice::<MemoryRecord>(&bytes) {
                    Ok(record) => out.push(record),
                    Err(e) => {
                        self.skipped.fetch_add(1, Ordering::Relaxed);
                        warn!(path = %entry.path().display(), error = %e, "skipping unreadable memory file");
                    }
                },
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn collect_all(&self, filter: &MemoryFilter) -> StorageResult<Vec<MemoryRecord>> {
        let mut records = Vec::new();
        match &filter.tenant_id {
            Some(tenant) => {
                Self::check_tenant_name(tenant)?;
                let dir = self.root.join(tenant);
                if fs::try_exists(&dir).await? {
                    self.collect_dir(&dir, &mut records).await?;
                }
            }
            None => {
                for dir in self.tenant_dirs().await? {
                    self.collect_dir(&dir, &mut records).await?;
                }
            }
        }
        records.retain(|r| filter.matches(r));
        Ok(records)
    }
}

#[async_trait::async_trait]
impl StorageAdapter for FileStore {
    async fn initialize(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root).await?;
        debug!(root = %self.root.display(), "file store ready");
        Ok(())
    }

    async fn store(&self, memory: &MemoryRecord) -> StorageResult<()> {
        Self::check_tenant_name(&memory.tenant_id)?;
        let path = self.memory_path(&memory.tenant_id, &memory.id);
        let bytes = serde_json::to_vec_pretty(memory)?;
        Self::write_atomic(&path, &bytes).await
    }

    async fn retrieve(&self, id: &str) -> StorageResult<Option<MemoryRecord>> {
        match self.locate(id).await? {
            Some(path) => self.read_record(&path).await,
            None => Ok(None),
        }
    }

    async fn update(&self, id: &str, patch: &MemoryPatch) -> StorageResult<()> {
        let path = self
            .locate(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        let mut record = self
            .read_record(&path)
            .await?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        record.apply_patch(patch);
        let bytes = serde_json::to_vec_pretty(&record)?;
        Self::write_atomic(&path, &bytes).await
    }

    async fn delete(&self, id: &str) -> StorageResult<bool> {
        match self.locate(id).await? {
            Some(path) => {
                fs::remove_file(&path).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self, filter: &MemoryFilter) -> StorageResult<Vec<MemoryRecord>> {
        let records = self.collect_all(filter).await?;
        Ok(filter.apply_order_and_page(records))
    }

    async fn count(&self, filter: &MemoryFilter) -> StorageResult<u64> {
        Ok(self.collect_all(filter).await?.len() as u64)
    }

    async fn clear(&self, tenant_id: Option<&str>) -> StorageResult<u64> {
        let mut removed = 0_u64;
        match tenant_id {
            Some(tenant) => {
                Self::check_tenant_name(tenant)?;
                let dir = self.root.join(tenant);
                if fs::try_exists(&dir).await? {
                    removed += count_json_files(&dir).await?;
                    fs::remove_dir_all(&dir).await?;
                }
            }
            None => {
                for dir in self.tenant_dirs().await? {
                    removed += count_json_files(&dir).await?;
                    fs::remove_dir_all(&dir).await?;
                }
            }
        }
        Ok(removed)
    }

    async fn bulk_store(&self, memories: &[MemoryRecord]) -> StorageResult<()> {
        if memories.is_empty() {
            return Ok(());
        }
        for memory in memories {
            Self::check_tenant_name(&memory.tenant_id)?;
        }

        let staging = self.root.join(format!(".staging-{}", Uuid::new_v4()));

        let staged: StorageResult<()> = async {
            for memory in memories {
                let dir = staging.join(&memory.tenant_id);
                fs::create_dir_all(&dir).await?;
                let path = dir.join(format!("{}.json", memory.id));
                fs::write(&path, serde_json::to_vec_pretty(memory)?).await?;
            }
            Ok(())
        }
        .await;

        if let Err(e) = staged {
            let _ = fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        // The batch is fully staged; move files into place. A crash here
        // leaves a prefix of the batch visible, which is the documented
        // limit of this adapter's transactionality.
        for memory in memories {
            let from = staging
                .join(&memory.tenant_id)
                .join(format!("{}.json", memory.id));
            fs::create_dir_all(self.root.join(&memory.tenant_id)).await?;
            let to = self.memory_path(&memory.tenant_id, &memory.id);
            fs::rename(&from, &to).await?;
        }
        fs::remove_dir_all(&staging).await?;
        Ok(())
    }

    async fn health(&self) -> AdapterHealth {
        match fs::try_exists(&self.root).await {
            Ok(true) => {
                let mut health = AdapterHealth::ok();
                health
                    .details
                    .insert("backend".to_string(), "file".to_string());
                health.details.insert(
                    "skippedRecords".to_string(),
                    self.skipped.load(Ordering::Relaxed).to_string(),
                );
                health
            }
            Ok(false) => AdapterHealth::failed("root directory does not exist"),
            Err(e) => AdapterHealth::failed(format!("cannot stat root: {}", e)),
        }
    }

    async fn close(&self) -> StorageResult<()> {
        // Nothing held open between calls
        Ok(())
    }
}

async fn count_json_files(dir: &Path) -> StorageResult<u64> {
    let mut count = 0;
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with('.') && name.ends_with(".json") {
            count += 1;
        }
    }
    Ok(count)
}

// ============================================================================
// TESTS
// ============================================================================
