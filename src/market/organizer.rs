//! Base Organizer
//!
//! Owns the authoritative learnware collection behind a single lock. Ids are
//! zero-padded decimals from a monotonic counter and are never recycled, not
//! even after a delete or a rejected submission.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::learnware::{Learnware, ModelRef, ModelRegistry};
use crate::market::checker::{Checker, CheckVerdict};
use crate::market::store::{LearnwareRecord, MarketStore};
use crate::market::{AcceptStatus, AddOutcome, Organizer};
use crate::spec::Specification;

#[derive(Clone)]
struct MarketEntry {
    learnware: Arc<Learnware>,
    verified: bool,
}

#[derive(Default)]
struct MarketState {
    /// Keyed by id; zero-padded monotonic ids make map order equal insertion
    /// order.
    entries: BTreeMap<String, MarketEntry>,
    next_id: u64,
}

pub struct EasyOrganizer {
    state: RwLock<MarketState>,
    store: Arc<dyn MarketStore>,
    checker: Arc<dyn Checker>,
    registry: Arc<ModelRegistry>,
}

impl EasyOrganizer {
    pub fn new(
        store: Arc<dyn MarketStore>,
        checker: Arc<dyn Checker>,
        registry: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            state: RwLock::new(MarketState::default()),
            store,
            checker,
            registry,
        }
    }

    pub fn registry(&self) -> Arc<ModelRegistry> {
        self.registry.clone()
    }

    fn format_id(counter: u64) -> String {
        format!("{:08}", counter)
    }

    fn record_for(learnware: &Learnware, model: &ModelRef, verified: bool) -> LearnwareRecord {
        let specification = learnware.specification();
        let stat_specs = specification
            .stat_spec_kinds()
            .filter_map(|kind| {
                specification
                    .stat_spec(kind)
                    .map(|spec| (kind.to_string(), spec))
            })
            .collect();
        LearnwareRecord {
            id: learnware.id().to_string(),
            semantic: specification.semantic_spec().clone(),
            model: model.clone(),
            stat_specs,
            verified,
        }
    }

    /// Flip the verified flag of a held entry and persist the change. Used
    /// by lifecycle policies that calibrate and then promote unverified
    /// submissions.
    pub(crate) async fn set_verified(&self, id: &str, verified: bool) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .entries
            .get_mut(id)
            .ok_or_else(|| Error::NotFound { id: id.to_string() })?;
        let record = Self::record_for(&entry.learnware, entry.learnware.model_ref(), verified);
        self.store.upsert(record).await?;
        entry.verified = verified;
        Ok(())
    }

    /// Re-persist an entry's current state, picking up in-place
    /// specification updates.
    pub(crate) async fn persist(&self, id: &str) -> Result<()> {
        let state = self.state.read().await;
        let entry = state
            .entries
            .get(id)
            .ok_or_else(|| Error::NotFound { id: id.to_string() })?;
        let record = Self::record_for(&entry.learnware, entry.learnware.model_ref(), entry.verified);
        self.store.upsert(record).await
    }

    pub(crate) async fn is_verified(&self, id: &str) -> Result<bool> {
        let state = self.state.read().await;
        state
            .entries
            .get(id)
            .map(|e| e.verified)
            .ok_or_else(|| Error::NotFound { id: id.to_string() })
    }
}

#[async_trait]
impl Organizer for EasyOrganizer {
    async fn add(&self, model: ModelRef, specification: Specification) -> Result<AddOutcome> {
        // Reserve the id before the (possibly slow) check; a rejected
        // submission burns its id, keeping ids unique across history.
        let id = {
            let mut state = self.state.write().await;
            let id = Self::format_id(state.next_id);
            state.next_id += 1;
            id
        };

        let learnware = Arc::new(Learnware::new(
            id.clone(),
            specification,
            model.clone(),
            self.registry.clone(),
        ));

        let (verified, status) = match self.checker.check(&learnware) {
            CheckVerdict::Usable => (true, AcceptStatus::Accepted),
            CheckVerdict::Nonusable { reason } => {
                info!(id = %id, reason = %reason, "learnware held as unverified");
                (false, AcceptStatus::Held)
            }
            CheckVerdict::Invalid { reason } => {
                warn!(id = %id, reason = %reason, "learnware rejected");
                return Err(Error::Rejected { reason });
            }
        };

        let record = Self::record_for(&learnware, &model, verified);
        {
            // Store write happens under the collection lock; on store
            // failure the collection is unchanged and only the id is burned.
            let mut state = self.state.write().await;
            self.store.upsert(record).await?;
            state.entries.insert(
                id.clone(),
                MarketEntry {
                    learnware,
                    verified,
                },
            );
        }
        info!(id = %id, ?status, "learnware added");
        Ok(AddOutcome { id, status })
    }

    async fn delete(&self, id: &str) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if !state.entries.contains_key(id) {
                return Err(Error::NotFound { id: id.to_string() });
            }
            // Removed from memory only once the store removal went through.
            self.store.remove(id).await?;
            state.entries.remove(id);
        }
        info!(id = %id, "learnware deleted");
        Ok(())
    }

    async fn reload(&self) -> Result<usize> {
        let mut state = self.state.write().await;
        state.entries.clear();

        let records = match self.store.load_all().await {
            Ok(records) => records,
            Err(err) => {
                // Collection stays empty-but-consistent.
                warn!(error = %err, "reload failed; collection left empty");
                return Err(err);
            }
        };

        let mut max_id = 0;
        for record in records {
            if state.entries.contains_key(&record.id) {
                let id = record.id;
                state.entries.clear();
                return Err(Error::Store(format!("duplicate stored id `{}`", id)));
            }
            if let Ok(parsed) = record.id.parse::<u64>() {
                max_id = max_id.max(parsed + 1);
            }
            let mut specification = Specification::new(record.semantic);
            for (name, spec) in record.stat_specs {
                specification.update_stat_spec(&name, spec);
            }
            let learnware = Arc::new(Learnware::new(
                record.id.clone(),
                specification,
                record.model,
                self.registry.clone(),
            ));
            state.entries.insert(
                record.id,
                MarketEntry {
                    learnware,
                    verified: record.verified,
                },
            );
        }
        state.next_id = state.next_id.max(max_id);
        let restored = state.entries.len();
        info!(restored, "market reloaded");
        Ok(restored)
    }

    async fn get(&self, id: &str) -> Result<Arc<Learnware>> {
        let state = self.state.read().await;
        state
            .entries
            .get(id)
            .map(|e| e.learnware.clone())
            .ok_or_else(|| Error::NotFound { id: id.to_string() })
    }

    async fn get_many(&self, ids: &[String]) -> Vec<Option<Arc<Learnware>>> {
        let state = self.state.read().await;
        ids.iter()
            .map(|id| state.entries.get(id).map(|e| e.learnware.clone()))
            .collect()
    }

    async fn ids(&self) -> Vec<String> {
        self.state.read().await.entries.keys().cloned().collect()
    }

    async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    async fn snapshot(&self) -> Vec<Arc<Learnware>> {
        self.state
            .read()
            .await
            .entries
            .values()
            .filter(|e| e.verified)
            .map(|e| e.learnware.clone())
            .collect()
    }
}
