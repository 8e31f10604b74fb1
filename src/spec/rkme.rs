//! Reduced Kernel Mean Embedding Fingerprint
//!
//! Reference fingerprint: an empirical kernel mean embedding over a capped
//! set of support points with an RBF kernel. The similarity kernel is the
//! mean pairwise RBF value; herding greedily picks support points that best
//! cover the embedding. Gradient-based reduced-set optimization is an
//! external capability and is not performed here.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::spec::stat::{StatSpec, StatSpecBuilder, StatSpecLoader};

/// Fingerprint kind name for [`RkmeSpec`].
pub const RKME_KIND: &str = "rkme";

const DEFAULT_MAX_POINTS: usize = 256;

#[derive(Debug, Clone)]
pub struct RkmeSpec {
    gamma: f64,
    points: Array2<f64>,
}

/// On-disk form. The `kind` marker makes the file self-describing.
#[derive(Serialize, Deserialize)]
struct RkmeFile {
    kind: String,
    gamma: f64,
    points: Vec<Vec<f64>>,
}

impl RkmeSpec {
    /// Build a fingerprint from raw feature rows with bandwidth `gamma`,
    /// retaining at most [`DEFAULT_MAX_POINTS`] support points.
    pub fn from_data(data: &ArrayView2<'_, f64>, gamma: f64) -> Result<Self> {
        Self::from_data_capped(data, gamma, DEFAULT_MAX_POINTS)
    }

    /// As [`RkmeSpec::from_data`] with an explicit support-point cap.
    /// Subsampling is an even deterministic stride over the input rows.
    pub fn from_data_capped(
        data: &ArrayView2<'_, f64>,
        gamma: f64,
        max_points: usize,
    ) -> Result<Self> {
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(Error::ShapeMismatch(
                "fingerprint requires a non-empty data matrix".to_string(),
            ));
        }
        if !(gamma.is_finite() && gamma > 0.0) {
            return Err(Error::ShapeMismatch(format!(
                "kernel bandwidth must be positive and finite, got {}",
                gamma
            )));
        }
        let n = data.nrows();
        let points = if n <= max_points {
            data.to_owned()
        } else {
            let indices: Vec<usize> = (0..max_points).map(|i| i * n / max_points).collect();
            data.select(Axis(0), &indices)
        };
        Ok(Self { gamma, points })
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn support_points(&self) -> &Array2<f64> {
        &self.points
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        Self::from_json(&value)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_vec_pretty(&self.to_json()?)?)?;
        Ok(())
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let file: RkmeFile = serde_json::from_value(value.clone())?;
        if file.kind != RKME_KIND {
            return Err(Error::SpecMismatch {
                left: RKME_KIND.to_string(),
                right: file.kind,
            });
        }
        let rows = file.points.len();
        let cols = file.points.first().map_or(0, |r| r.len());
        if rows == 0 || cols == 0 {
            return Err(Error::ShapeMismatch(
                "fingerprint file holds no support points".to_string(),
            ));
        }
        let flat: Vec<f64> = file.points.into_iter().flatten().collect();
        let points = Array2::from_shape_vec((rows, cols), flat)
            .map_err(|e| Error::ShapeMismatch(e.to_string()))?;
        Ok(Self {
            gamma: file.gamma,
            points,
        })
    }

    fn rbf(&self, x: &ArrayView1<'_, f64>, y: &ArrayView1<'_, f64>) -> f64 {
        let dist_sq: f64 = x
            .iter()
            .zip(y.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        (-self.gamma * dist_sq).exp()
    }

    fn mean_kernel(&self, other: &RkmeSpec) -> f64 {
        let mut total = 0.0;
        for xi in self.points.axis_iter(Axis(0)) {
            for yj in other.points.axis_iter(Axis(0)) {
                total += self.rbf(&xi, &yj);
            }
        }
        total / (self.points.nrows() * other.points.nrows()) as f64
    }
}

impl StatSpec for RkmeSpec {
    fn kind(&self) -> &str {
        RKME_KIND
    }

    fn inner_product(&self, other: &dyn StatSpec) -> Result<f64> {
        let other = other
            .as_any()
            .downcast_ref::<RkmeSpec>()
            .ok_or_else(|| Error::SpecMismatch {
                left: self.kind().to_string(),
                right: other.kind().to_string(),
            })?;
        if self.dim() != other.dim() {
            return Err(Error::ShapeMismatch(format!(
                "fingerprints span {} and {} feature dimensions",
                self.dim(),
                other.dim()
            )));
        }
        Ok(self.mean_kernel(other))
    }

    /// Greedy kernel herding over the support points. Selection is with
    /// replacement, so any requested count is served; argmax ties resolve to
    /// the lowest support-point index, making the draw deterministic.
    fn herding(&self, count: usize) -> Result<Array2<f64>> {
        let n = self.points.nrows();
        let dim = self.points.ncols();
        if count == 0 {
            return Ok(Array2::zeros((0, dim)));
        }

        // Gram matrix over support points, computed once.
        let mut gram = Array2::zeros((n, n));
        for i in 0..n {
            for j in i..n {
                let k = self.rbf(
                    &self.points.row(i),
                    &self.points.row(j),
                );
                gram[[i, j]] = k;
                gram[[j, i]] = k;
            }
        }
        // Embedding witness: mean kernel of each support point.
        let mu: Vec<f64> = (0..n)
            .map(|j| gram.row(j).sum() / n as f64)
            .collect();

        let mut selected_sum = vec![0.0_f64; n];
        let mut picks = Vec::with_capacity(count);
        for t in 0..count {
            let mut best = 0;
            let mut best_score = f64::NEG_INFINITY;
            for j in 0..n {
                let score = mu[j] - selected_sum[j] / (t as f64 + 1.0);
                if score > best_score {
                    best_score = score;
                    best = j;
                }
            }
            picks.push(best);
            for j in 0..n {
                selected_sum[j] += gram[[j, best]];
            }
        }

        Ok(self.points.select(Axis(0), &picks))
    }

    fn sample_count(&self) -> usize {
        self.points.nrows()
    }

    fn dim(&self) -> usize {
        self.points.ncols()
    }

    fn to_json(&self) -> Result<serde_json::Value> {
        let file = RkmeFile {
            kind: RKME_KIND.to_string(),
            gamma: self.gamma,
            points: self
                .points
                .axis_iter(Axis(0))
                .map(|row| row.to_vec())
                .collect(),
        };
        Ok(serde_json::to_value(file)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Builds [`RkmeSpec`] fingerprints with a fixed bandwidth.
#[derive(Debug, Clone)]
pub struct RkmeBuilder {
    gamma: f64,
    max_points: usize,
}

impl RkmeBuilder {
    pub fn new(gamma: f64) -> Self {
        Self {
            gamma,
            max_points: DEFAULT_MAX_POINTS,
        }
    }

    pub fn with_max_points(mut self, max_points: usize) -> Self {
        self.max_points = max_points;
        self
    }
}

impl StatSpecBuilder for RkmeBuilder {
    fn kind(&self) -> &str {
        RKME_KIND
    }

    fn build(&self, data: &ArrayView2<'_, f64>) -> Result<Arc<dyn StatSpec>> {
        Ok(Arc::new(RkmeSpec::from_data_capped(
            data,
            self.gamma,
            self.max_points,
        )?))
    }
}

impl StatSpecLoader for RkmeBuilder {
    fn kind(&self) -> &str {
        RKME_KIND
    }

    fn load(&self, value: &serde_json::Value) -> Result<Arc<dyn StatSpec>> {
        Ok(Arc::new(RkmeSpec::from_json(value)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    struct OtherKind;

    impl StatSpec for OtherKind {
        fn kind(&self) -> &str {
            "other"
        }
        fn inner_product(&self, _other: &dyn StatSpec) -> Result<f64> {
            Ok(0.0)
        }
        fn herding(&self, _count: usize) -> Result<Array2<f64>> {
            Ok(Array2::zeros((0, 0)))
        }
        fn sample_count(&self) -> usize {
            0
        }
        fn dim(&self) -> usize {
            0
        }
        fn to_json(&self) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn spec_of(points: Array2<f64>) -> RkmeSpec {
        RkmeSpec::from_data(&points.view(), 0.1).unwrap()
    }

    #[test]
    fn test_inner_product_symmetric_and_positive() {
        let a = spec_of(array![[0.0, 0.0], [1.0, 1.0]]);
        let b = spec_of(array![[2.0, 2.0], [3.0, 3.0]]);
        let ab = a.inner_product(&b).unwrap();
        let ba = b.inner_product(&a).unwrap();
        assert!(ab > 0.0);
        assert!((ab - ba).abs() < 1e-12);
    }

    #[test]
    fn test_self_similarity_dominates_cross_similarity() {
        let a = spec_of(array![[0.0, 0.0], [0.1, 0.1]]);
        let far = spec_of(array![[50.0, 50.0], [51.0, 51.0]]);
        let self_sim = a.inner_product(&a).unwrap();
        let cross = a.inner_product(&far).unwrap();
        assert!(self_sim > cross);
    }

    #[test]
    fn test_mismatched_feature_dimensions_fail() {
        let narrow = spec_of(Array2::zeros((4, 2)));
        let wide = spec_of(Array2::zeros((4, 5)));
        let err = narrow.inner_product(&wide).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }

    #[test]
    fn test_cross_kind_comparison_fails() {
        let a = spec_of(array![[0.0, 0.0]]);
        let err = a.inner_product(&OtherKind).unwrap_err();
        assert!(matches!(err, Error::SpecMismatch { .. }));
    }

    #[test]
    fn test_herding_deterministic_with_requested_count() {
        let a = spec_of(array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [5.0, 5.0]]);
        let first = a.herding(10).unwrap();
        let second = a.herding(10).unwrap();
        assert_eq!(first.nrows(), 10);
        assert_eq!(first.ncols(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_support_cap_is_deterministic_stride() {
        let data = Array2::from_shape_fn((100, 3), |(i, j)| (i * 3 + j) as f64);
        let spec = RkmeSpec::from_data_capped(&data.view(), 0.1, 10).unwrap();
        assert_eq!(spec.sample_count(), 10);
        let again = RkmeSpec::from_data_capped(&data.view(), 0.1, 10).unwrap();
        assert_eq!(spec.support_points(), again.support_points());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.json");
        let a = spec_of(array![[0.5, -1.5], [2.0, 3.0]]);
        a.save(&path).unwrap();
        let restored = RkmeSpec::load(&path).unwrap();
        assert_eq!(restored.support_points(), a.support_points());
        assert_eq!(restored.gamma(), a.gamma());
    }

    #[test]
    fn test_empty_data_rejected() {
        let empty = Array2::<f64>::zeros((0, 4));
        assert!(RkmeSpec::from_data(&empty.view(), 0.1).is_err());
    }
}
