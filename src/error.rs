//! Error Taxonomy
//!
//! Failures are reported per-candidate wherever feasible: one learnware's
//! bad output or failed instantiation aborts only the operation that touched
//! it, never the whole collection.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A submitted learnware failed the checker. The collection is unchanged.
    #[error("learnware rejected: {reason}")]
    Rejected { reason: String },

    /// Lookup or delete by an id that is not in the collection.
    #[error("learnware `{id}` not found")]
    NotFound { id: String },

    /// A prediction output is not one of the two accepted numeric-array
    /// forms, or two outputs cannot be combined elementwise.
    #[error("prediction shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A deferred model reference could not be resolved into an instance.
    #[error("failed to instantiate model `{class_path}`: {reason}")]
    Instantiation { class_path: String, reason: String },

    /// A learnware is missing the statistical specification an operation
    /// requires.
    #[error("learnware `{id}` carries no `{kind}` statistical specification")]
    MissingFingerprint { id: String, kind: String },

    /// Two statistical specifications of different kinds were compared.
    #[error("incomparable statistical specifications: `{left}` vs `{right}`")]
    SpecMismatch { left: String, right: String },

    /// A semantic specification violates the vocabulary or its own shape
    /// invariants.
    #[error("invalid semantic specification: {0}")]
    InvalidSemantic(String),

    /// The persistence collaborator failed.
    #[error("market store failure: {0}")]
    Store(String),

    /// An intentionally abstract extension point was invoked.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
