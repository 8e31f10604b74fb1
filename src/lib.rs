//! Learnware Market
//!
//! A market for pre-trained models with:
//! - Two-part specifications (semantic + statistical fingerprints)
//! - Pluggable organizers with anchor-based calibration
//! - Two-stage search (semantic filter, then fingerprint ranking + mixtures)
//! - Reuse strategies (job-selector routing, prediction averaging)

pub mod capability;
pub mod config;
pub mod error;
pub mod learnware;
pub mod market;
pub mod reuse;
pub mod spec;

// Re-exports for convenience
pub use error::{Error, Result};
pub use learnware::{Learnware, Model, ModelRef, ModelRegistry, Prediction};
pub use market::{
    AcceptStatus, AddOutcome, AnchoredOrganizer, CheckVerdict, Checker, EasyOrganizer,
    EasySearcher, EvolvedAnchoredOrganizer, Organizer, SearchConfig, SearchResult, UserInfo,
};
pub use reuse::{AveragingMode, AveragingReuser, JobSelectorReuser, Reuser};
pub use spec::{RkmeBuilder, RkmeSpec, SemanticSpec, Specification, StatSpec, StatSpecBuilder};
