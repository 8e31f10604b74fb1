//! Persistence Boundary
//!
//! The organizer pushes add/delete updates to a store and consumes a full
//! snapshot on reload. `InMemoryStore` backs tests and embedded use;
//! `JsonFileStore` persists a JSON snapshot plus one self-describing file
//! per fingerprint.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::learnware::{ModelRef, StoredModelRef};
use crate::spec::{SemanticSpec, StatSpec, StatSpecLoader};

/// Snapshot form of one collection entry.
#[derive(Clone)]
pub struct LearnwareRecord {
    pub id: String,
    pub semantic: SemanticSpec,
    pub model: ModelRef,
    pub stat_specs: BTreeMap<String, Arc<dyn StatSpec>>,
    pub verified: bool,
}

#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Full snapshot, ordered by id.
    async fn load_all(&self) -> Result<Vec<LearnwareRecord>>;

    async fn upsert(&self, record: LearnwareRecord) -> Result<()>;

    /// Remove a stored entry. Unknown ids are an `Error::Store` for every
    /// implementation.
    async fn remove(&self, id: &str) -> Result<()>;
}

/// Volatile store; a reload restores whatever was pushed this process.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<BTreeMap<String, LearnwareRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MarketStore for InMemoryStore {
    async fn load_all(&self) -> Result<Vec<LearnwareRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn upsert(&self, record: LearnwareRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        if self.records.write().await.remove(id).is_none() {
            return Err(Error::Store(format!("no stored entry `{}`", id)));
        }
        Ok(())
    }
}

/// On-disk form of one entry inside `snapshot.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    id: String,
    semantic: SemanticSpec,
    /// `None` for live instances, which are process-local and cannot be
    /// persisted; such entries are skipped on reload with a warning.
    model: Option<StoredModelRef>,
    verified: bool,
    /// Fingerprint kind → file name relative to the store directory.
    stat_specs: BTreeMap<String, String>,
}

/// Directory-backed store: `snapshot.json` plus one fingerprint file per
/// entry and kind.
pub struct JsonFileStore {
    dir: PathBuf,
    loaders: BTreeMap<String, Arc<dyn StatSpecLoader>>,
    snapshot: RwLock<BTreeMap<String, StoredRecord>>,
}

impl JsonFileStore {
    const SNAPSHOT_FILE: &'static str = "snapshot.json";

    pub fn open(
        dir: impl Into<PathBuf>,
        loaders: Vec<Arc<dyn StatSpecLoader>>,
    ) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let snapshot_path = dir.join(Self::SNAPSHOT_FILE);
        let snapshot = if snapshot_path.exists() {
            let bytes = std::fs::read(&snapshot_path)?;
            serde_json::from_slice(&bytes)?
        } else {
            BTreeMap::new()
        };
        let loaders = loaders
            .into_iter()
            .map(|l| (l.kind().to_string(), l))
            .collect();
        Ok(Self {
            dir,
            loaders,
            snapshot: RwLock::new(snapshot),
        })
    }

    fn flush(&self, snapshot: &BTreeMap<String, StoredRecord>) -> Result<()> {
        let path = self.dir.join(Self::SNAPSHOT_FILE);
        std::fs::write(path, serde_json::to_vec_pretty(snapshot)?)?;
        Ok(())
    }

    fn spec_file_name(id: &str, kind: &str) -> String {
        format!("{}.{}.json", id, kind)
    }
}

#[async_trait]
impl MarketStore for JsonFileStore {
    async fn load_all(&self) -> Result<Vec<LearnwareRecord>> {
        let snapshot = self.snapshot.read().await;
        let mut records = Vec::with_capacity(snapshot.len());
        for stored in snapshot.values() {
            let Some(model) = stored.model.clone() else {
                warn!(id = %stored.id, "entry held a live model instance; skipping on reload");
                continue;
            };
            let mut stat_specs: BTreeMap<String, Arc<dyn StatSpec>> = BTreeMap::new();
            for (kind, file) in &stored.stat_specs {
                let Some(loader) = self.loaders.get(kind) else {
                    warn!(id = %stored.id, kind = %kind, "no loader for fingerprint kind; dropping it");
                    continue;
                };
                let bytes = std::fs::read(self.dir.join(file))?;
                let value: serde_json::Value = serde_json::from_slice(&bytes)?;
                stat_specs.insert(kind.clone(), loader.load(&value)?);
            }
            records.push(LearnwareRecord {
                id: stored.id.clone(),
                semantic: stored.semantic.clone(),
                model: model.into(),
                stat_specs,
                verified: stored.verified,
            });
        }
        Ok(records)
    }

    async fn upsert(&self, record: LearnwareRecord) -> Result<()> {
        let model = match &record.model {
            ModelRef::Deferred { class_path, args } => Some(StoredModelRef {
                class_path: class_path.clone(),
                args: args.clone(),
            }),
            ModelRef::Instance(_) => {
                warn!(id = %record.id, "live model instance cannot be persisted");
                None
            }
        };

        let mut stat_files = BTreeMap::new();
        for (kind, spec) in &record.stat_specs {
            let file = Self::spec_file_name(&record.id, kind);
            let value = spec.to_json()?;
            std::fs::write(self.dir.join(&file), serde_json::to_vec_pretty(&value)?)?;
            stat_files.insert(kind.clone(), file);
        }

        let stored = StoredRecord {
            id: record.id.clone(),
            semantic: record.semantic,
            model,
            verified: record.verified,
            stat_specs: stat_files,
        };

        let mut snapshot = self.snapshot.write().await;
        snapshot.insert(record.id.clone(), stored);
        self.flush(&snapshot)?;
        debug!(id = %record.id, "entry persisted");
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut snapshot = self.snapshot.write().await;
        let Some(stored) = snapshot.remove(id) else {
            return Err(Error::Store(format!("no stored entry `{}`", id)));
        };
        for file in stored.stat_specs.values() {
            // Stale fingerprint files are harmless; removal is best effort.
            let _ = std::fs::remove_file(self.dir.join(file));
        }
        self.flush(&snapshot)?;
        Ok(())
    }
}
