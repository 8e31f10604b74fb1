//! Learnware Market
//!
//! The organizer owns the authoritative learnware collection; the searcher
//! matches a user's description against it in two stages. Lifecycle variants
//! (anchored, evolving) layer policy on top of the base organizer.

mod anchor;
mod checker;
mod organizer;
mod searcher;
mod store;

pub use anchor::{AnchoredOrganizer, EvolvedAnchoredOrganizer};
pub use checker::{Checker, CheckVerdict, VocabularyChecker};
pub use organizer::EasyOrganizer;
pub use searcher::{EasySearcher, SearchConfig, SearchResult};
pub use store::{InMemoryStore, JsonFileStore, LearnwareRecord, MarketStore};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::learnware::{Learnware, ModelRef};
use crate::spec::{SemanticSpec, Specification, StatSpec};

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    pub id: String,
    pub status: AcceptStatus,
}

/// How an inserted learnware entered the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptStatus {
    /// Passed the checker as usable.
    Accepted,
    /// Loads but could not be verified as executable; inserted under policy
    /// and flagged, pending later promotion.
    Held,
}

/// Ephemeral description of a user's task. Never persisted.
#[derive(Default)]
pub struct UserInfo {
    id: Option<String>,
    semantic: Option<SemanticSpec>,
    stat_info: BTreeMap<String, Arc<dyn StatSpec>>,
}

impl UserInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// An identifier used only for logging.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_semantic(mut self, semantic: SemanticSpec) -> Self {
        self.semantic = Some(semantic);
        self
    }

    /// Attach a fingerprint of the user's held-out data, keyed by its kind.
    pub fn with_stat_spec(mut self, spec: Arc<dyn StatSpec>) -> Self {
        self.stat_info.insert(spec.kind().to_string(), spec);
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn semantic(&self) -> Option<&SemanticSpec> {
        self.semantic.as_ref()
    }

    pub fn stat_info(&self) -> &BTreeMap<String, Arc<dyn StatSpec>> {
        &self.stat_info
    }
}

/// Contract shared by every organizer variant.
#[async_trait]
pub trait Organizer: Send + Sync {
    /// Submit a learnware. Invalid submissions are rejected without mutating
    /// the collection; ids are fresh for the collection's entire history.
    async fn add(&self, model: ModelRef, specification: Specification) -> Result<AddOutcome>;

    /// Hard removal. The id stays permanently invalid afterwards.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Rebuild the collection from the persistence collaborator. On partial
    /// failure the collection is left empty-but-consistent. Returns the
    /// number of entries restored.
    async fn reload(&self) -> Result<usize>;

    async fn get(&self, id: &str) -> Result<Arc<Learnware>>;

    /// Batch lookup; `None` marks ids that are not in the collection.
    async fn get_many(&self, ids: &[String]) -> Vec<Option<Arc<Learnware>>>;

    /// Live ids in insertion order.
    async fn ids(&self) -> Vec<String>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Consistent snapshot of the verified candidates, in insertion order.
    /// Mutations after the snapshot is taken are invisible to its holder.
    async fn snapshot(&self) -> Vec<Arc<Learnware>>;
}
