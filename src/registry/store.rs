use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::models::{TargetKind, TargetRecord};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("unique constraint violated on (kind, name)")]
    Duplicate,

    #[error("{0}")]
    Backend(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Persistence substrate for the registry: one logical table per kind, keyed
/// by id, with a unique index on name.
///
/// `insert` must check uniqueness and write atomically so that concurrent
/// inserts of the same `(kind, name)` leave exactly one row.
#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn insert(&self, record: TargetRecord) -> Result<(), StoreError>;
    async fn get(&self, kind: TargetKind, id: Uuid) -> Result<Option<TargetRecord>, StoreError>;
    async fn find_by_name(
        &self,
        kind: TargetKind,
        name: &str,
    ) -> Result<Option<TargetRecord>, StoreError>;
    /// Replaces the row with the same kind and id. Returns false when absent.
    async fn update(&self, record: TargetRecord) -> Result<bool, StoreError>;
    async fn delete(&self, kind: TargetKind, id: Uuid) -> Result<bool, StoreError>;
    async fn list(&self, kind: TargetKind) -> Result<Vec<TargetRecord>, StoreError>;
}

#[derive(Default)]
struct Tables {
    rows: HashMap<TargetKind, Vec<TargetRecord>>,
}

impl Tables {
    fn table(&self, kind: TargetKind) -> &[TargetRecord] {
        self.rows.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    fn insert(&mut self, record: TargetRecord) -> Result<(), StoreError> {
        let table = self.rows.entry(record.kind).or_default();
        if table.iter().any(|r| r.name == record.name) {
            return Err(StoreError::Duplicate);
        }
        table.push(record);
        Ok(())
    }

    fn update(&mut self, record: TargetRecord) -> bool {
        let Some(table) = self.rows.get_mut(&record.kind) else {
            return false;
        };
        match table.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => {
                *existing = record;
                true
            }
            None => false,
        }
    }

    fn delete(&mut self, kind: TargetKind, id: Uuid) -> bool {
        let Some(table) = self.rows.get_mut(&kind) else {
            return false;
        };
        let before = table.len();
        table.retain(|r| r.id != id);
        table.len() != before
    }

    fn into_records(self) -> Vec<TargetRecord> {
        let mut all: Vec<TargetRecord> = self.rows.into_values().flatten().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    fn from_records(records: Vec<TargetRecord>) -> Self {
        let mut tables = Self::default();
        for record in records {
            tables.rows.entry(record.kind).or_default().push(record);
        }
        tables
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TargetStore for MemoryStore {
    async fn insert(&self, record: TargetRecord) -> Result<(), StoreError> {
        self.tables.lock().await.insert(record)
    }

    async fn get(&self, kind: TargetKind, id: Uuid) -> Result<Option<TargetRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.table(kind).iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_name(
        &self,
        kind: TargetKind,
        name: &str,
    ) -> Result<Option<TargetRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.table(kind).iter().find(|r| r.name == name).cloned())
    }

    async fn update(&self, record: TargetRecord) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.update(record))
    }

    async fn delete(&self, kind: TargetKind, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.delete(kind, id))
    }

    async fn list(&self, kind: TargetKind) -> Result<Vec<TargetRecord>, StoreError> {
        Ok(self.tables.lock().await.table(kind).to_vec())
    }
}

/// JSON file store for single-operator use. Every call re-reads the file under
/// the lock, so the file stays the source of truth between invocations.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Tables, StoreError> {
        if !self.path.exists() {
            return Ok(Tables::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Tables::default());
        }
        let records: Vec<TargetRecord> = serde_json::from_str(&contents)?;
        Ok(Tables::from_records(records))
    }

    fn save(&self, tables: Tables) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(&tables.into_records())?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl TargetStore for FileStore {
    async fn insert(&self, record: TargetRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut tables = self.load()?;
        tables.insert(record)?;
        self.save(tables)
    }

    async fn get(&self, kind: TargetKind, id: Uuid) -> Result<Option<TargetRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let tables = self.load()?;
        Ok(tables.table(kind).iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_name(
        &self,
        kind: TargetKind,
        name: &str,
    ) -> Result<Option<TargetRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let tables = self.load()?;
        Ok(tables.table(kind).iter().find(|r| r.name == name).cloned())
    }

    async fn update(&self, record: TargetRecord) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut tables = self.load()?;
        if !tables.update(record) {
            return Ok(false);
        }
        self.save(tables)?;
        Ok(true)
    }

    async fn delete(&self, kind: TargetKind, id: Uuid) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut tables = self.load()?;
        if !tables.delete(kind, id) {
            return Ok(false);
        }
        self.save(tables)?;
        Ok(true)
    }

    async fn list(&self, kind: TargetKind) -> Result<Vec<TargetRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load()?.table(kind).to_vec())
    }
}
