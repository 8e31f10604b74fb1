//! Statistical Specification Boundary
//!
//! A fingerprint is a numeric summary of a training distribution. The core
//! only relies on the similarity kernel and the herding sampler; how a
//! fingerprint is computed stays behind these traits.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use ndarray::{Array2, ArrayView2};

use crate::error::Result;

/// A statistical fingerprint of a training distribution.
///
/// Fingerprints of different kinds are never comparable; implementations
/// downcast through [`StatSpec::as_any`] and signal `Error::SpecMismatch`
/// when handed a foreign kind.
pub trait StatSpec: Send + Sync {
    /// Name of the fingerprint kind, e.g. `"rkme"`.
    fn kind(&self) -> &str;

    /// Similarity kernel between two fingerprints of the same kind.
    /// Non-negative.
    fn inner_product(&self, other: &dyn StatSpec) -> Result<f64>;

    /// Draw `count` representative feature rows via deterministic greedy
    /// herding.
    fn herding(&self, count: usize) -> Result<Array2<f64>>;

    /// Number of samples the fingerprint retains.
    fn sample_count(&self) -> usize;

    /// Feature dimensionality.
    fn dim(&self) -> usize;

    /// Self-describing JSON form, suitable for a snapshot file.
    fn to_json(&self) -> Result<serde_json::Value>;

    fn as_any(&self) -> &dyn Any;
}

/// Construct a fingerprint of a fixed kind from raw feature rows.
///
/// The job selector uses this to fingerprint the user's own data with the
/// same kind (and bandwidth) as the candidates it compares against.
pub trait StatSpecBuilder: Send + Sync {
    fn kind(&self) -> &str;

    fn build(&self, data: &ArrayView2<'_, f64>) -> Result<Arc<dyn StatSpec>>;
}

/// Rehydrate a fingerprint of a known kind from its self-describing JSON.
pub trait StatSpecLoader: Send + Sync {
    fn kind(&self) -> &str;

    fn load(&self, value: &serde_json::Value) -> Result<Arc<dyn StatSpec>>;
}

/// Write a fingerprint to a self-describing JSON file.
pub fn save_stat_spec(spec: &dyn StatSpec, path: &Path) -> Result<()> {
    let value = spec.to_json()?;
    std::fs::write(path, serde_json::to_vec_pretty(&value)?)?;
    Ok(())
}
