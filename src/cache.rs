//! Disk-backed entity cache
//!
//! Company documents are fetched at most once per id: a read-through store
//! keeps one JSON file per (kind, normalized id), written durably on the
//! first successful fetch and reused by every later lookup and run. There
//! is no TTL or invalidation; cached content is treated as permanently
//! valid. Store failures degrade to refetching from the API rather than
//! failing the record.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::ids::{self, RecordId};
use crate::models::{EntityKind, EntityRecord};

/// Key-value store holding one JSON document per (kind, id)
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Fetch the stored record, if present
    async fn get(&self, kind: EntityKind, id: &RecordId) -> Result<Option<EntityRecord>>;

    /// Persist a record; must not report success before the bytes are durable
    async fn put(&self, kind: EntityKind, id: &RecordId, record: &EntityRecord) -> Result<()>;
}

/// Store keeping one JSON file per key under a root directory
///
/// Entries are named `<kind>_<id>.json`, so different entity kinds can
/// share the directory without colliding.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_path(&self, kind: EntityKind, id: &RecordId) -> PathBuf {
        self.root.join(format!("{}_{}.json", kind.as_str(), id))
    }
}

#[async_trait]
impl EntityStore for DiskStore {
    async fn get(&self, kind: EntityKind, id: &RecordId) -> Result<Option<EntityRecord>> {
        let path = self.entry_path(kind, id);
        if !path.exists() {
            return Ok(None);
        }

        let json = tokio::fs::read_to_string(&path).await?;
        let record: EntityRecord = serde_json::from_str(&json)?;
        debug!("Cache hit for {} {}", kind.as_str(), id);
        Ok(Some(record))
    }

    async fn put(&self, kind: EntityKind, id: &RecordId, record: &EntityRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;

        let path = self.entry_path(kind, id);
        let json = serde_json::to_string_pretty(record)?;

        // A crash right after this call must not leave a truncated entry,
        // so the write is flushed and fsynced before it counts as done
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;

        debug!("Cached {} {} at {:?}", kind.as_str(), id, path);
        Ok(())
    }
}

/// In-memory store backing unit tests
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<(EntityKind, String), EntityRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get(&self, kind: EntityKind, id: &RecordId) -> Result<Option<EntityRecord>> {
        let entries = self.entries.lock().await;
        Ok(entries.get(&(kind, id.as_str().to_string())).cloned())
    }

    async fn put(&self, kind: EntityKind, id: &RecordId, record: &EntityRecord) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert((kind, id.as_str().to_string()), record.clone());
        Ok(())
    }
}

/// Read-through cache over an [`EntityStore`]
pub struct EntityCache {
    store: Box<dyn EntityStore>,
}

impl EntityCache {
    pub fn new(store: Box<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Cache backed by JSON files under `root`
    pub fn on_disk(root: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(DiskStore::new(root)))
    }

    /// Fetch the stored record, if present
    pub async fn get(&self, kind: EntityKind, id: &RecordId) -> Result<Option<EntityRecord>> {
        self.store.get(kind, id).await
    }

    /// Persist a record through the underlying store
    pub async fn put(&self, kind: EntityKind, id: &RecordId, record: &EntityRecord) -> Result<()> {
        self.store.put(kind, id, record).await
    }

    /// Look up a record by raw id, fetching and persisting on a miss
    ///
    /// An invalid id resolves to the empty record with no store or network
    /// I/O at all. A store read error is logged and treated as a miss; a
    /// store write error is logged and the freshly fetched record is still
    /// returned. Empty fetch results are returned but never persisted.
    pub async fn lookup_or_fetch<F, Fut>(
        &self,
        kind: EntityKind,
        raw_id: &Value,
        fetch: F,
    ) -> Result<EntityRecord>
    where
        F: FnOnce(RecordId) -> Fut,
        Fut: Future<Output = Result<EntityRecord>>,
    {
        let id = match ids::normalize(raw_id) {
            Ok(id) => id,
            Err(_) => {
                debug!("Skipping {} lookup for invalid id {:?}", kind.as_str(), raw_id);
                return Ok(EntityRecord::default());
            }
        };

        match self.store.get(kind, &id).await {
            Ok(Some(record)) => return Ok(record),
            Ok(None) => {}
            Err(e) => {
                warn!(
                    "Cache read failed for {} {}: {}; refetching from the API",
                    kind.as_str(),
                    id,
                    e
                );
            }
        }

        let record = fetch(id.clone()).await?;
        if record.is_empty() {
            return Ok(record);
        }

        if let Err(e) = self.store.put(kind, &id, &record).await {
            error!("Failed to cache {} {}: {}", kind.as_str(), id, e);
        }
        Ok(record)
    }
}
