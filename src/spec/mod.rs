//! Learnware Specifications
//!
//! Every learnware carries a two-part descriptor: a declarative semantic
//! specification and zero or more statistical fingerprints of its training
//! distribution, one per fingerprint kind.

mod rkme;
mod semantic;
mod stat;

pub use rkme::{RkmeBuilder, RkmeSpec, RKME_KIND};
pub use semantic::{SemanticSpec, SemanticSpecBuilder, SemanticValue};
pub use stat::{save_stat_spec, StatSpec, StatSpecBuilder, StatSpecLoader};

use std::collections::BTreeMap;
use std::sync::Arc;

/// The full descriptor attached to a learnware.
#[derive(Clone)]
pub struct Specification {
    semantic: SemanticSpec,
    /// At most one fingerprint per kind; the map key enforces it.
    stat_specs: BTreeMap<String, Arc<dyn StatSpec>>,
}

impl Specification {
    pub fn new(semantic: SemanticSpec) -> Self {
        Self {
            semantic,
            stat_specs: BTreeMap::new(),
        }
    }

    /// Attach a fingerprint, keyed by its own kind.
    pub fn with_stat_spec(mut self, spec: Arc<dyn StatSpec>) -> Self {
        self.stat_specs.insert(spec.kind().to_string(), spec);
        self
    }

    pub fn semantic_spec(&self) -> &SemanticSpec {
        &self.semantic
    }

    pub fn stat_spec(&self, kind: &str) -> Option<Arc<dyn StatSpec>> {
        self.stat_specs.get(kind).cloned()
    }

    pub fn stat_spec_kinds(&self) -> impl Iterator<Item = &str> {
        self.stat_specs.keys().map(|k| k.as_str())
    }

    /// Replace the fingerprint stored under `name`.
    pub fn update_stat_spec(&mut self, name: &str, spec: Arc<dyn StatSpec>) {
        self.stat_specs.insert(name.to_string(), spec);
    }

    /// Replace the semantic specification wholesale.
    pub fn update_semantic_spec(&mut self, semantic: SemanticSpec) {
        self.semantic = semantic;
    }
}

impl std::fmt::Debug for Specification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Specification")
            .field("semantic", &self.semantic)
            .field(
                "stat_specs",
                &self.stat_specs.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}
