//! Learnware Checking Boundary
//!
//! A checker inspects a candidate before acceptance and returns a tri-state
//! verdict. Whether a packaged model actually loads and runs is validated by
//! an external collaborator; the in-crate checker covers the semantic side.

use crate::config::SemanticVocabulary;
use crate::learnware::Learnware;

/// Tri-state verdict on a submitted learnware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckVerdict {
    /// Loads and executes; insert unconditionally.
    Usable,
    /// Loads but could not be executed; may be inserted under policy,
    /// flagged as unverified.
    Nonusable { reason: String },
    /// Fails the check outright; reject without mutating the collection.
    Invalid { reason: String },
}

pub trait Checker: Send + Sync {
    fn check(&self, learnware: &Learnware) -> CheckVerdict;
}

/// Validates the semantic specification against a market vocabulary.
#[derive(Debug, Clone, Default)]
pub struct VocabularyChecker {
    vocabulary: SemanticVocabulary,
}

impl VocabularyChecker {
    pub fn new(vocabulary: SemanticVocabulary) -> Self {
        Self { vocabulary }
    }
}

impl Checker for VocabularyChecker {
    fn check(&self, learnware: &Learnware) -> CheckVerdict {
        match self.vocabulary.validate(&learnware.semantic_spec()) {
            Ok(()) => CheckVerdict::Usable,
            Err(err) => CheckVerdict::Invalid {
                reason: err.to_string(),
            },
        }
    }
}
