//! Selector Training
//!
//! The job selector needs a multi-class classifier trained over a small
//! hyperparameter grid. Tree-ensemble training proper is an external
//! capability; the in-crate reference is a multinomial logistic regression
//! fit by batch gradient descent.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::{Error, Result};

/// One grid configuration.
#[derive(Debug, Clone, Copy)]
pub struct SelectorParams {
    pub learning_rate: f64,
    pub max_depth: usize,
}

/// Hyperparameter grid: the cross product of learning rates and depths.
#[derive(Debug, Clone)]
pub struct SelectorGrid {
    pub learning_rates: Vec<f64>,
    pub max_depths: Vec<usize>,
}

impl Default for SelectorGrid {
    fn default() -> Self {
        Self {
            learning_rates: vec![0.01],
            max_depths: vec![66],
        }
    }
}

impl SelectorGrid {
    pub fn configurations(&self) -> Vec<SelectorParams> {
        let mut configs = Vec::new();
        for &learning_rate in &self.learning_rates {
            for &max_depth in &self.max_depths {
                configs.push(SelectorParams {
                    learning_rate,
                    max_depth,
                });
            }
        }
        configs
    }
}

/// A fitted routing classifier: feature rows in, class indices out.
pub trait Selector: Send + Sync {
    fn predict(&self, x: &ArrayView2<'_, f64>) -> Result<Vec<usize>>;
}

/// Trains a [`Selector`] from labeled rows, with an eval set for early
/// stopping.
pub trait SelectorTrainer: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    fn fit(
        &self,
        train_x: &ArrayView2<'_, f64>,
        train_y: &[usize],
        eval_x: &ArrayView2<'_, f64>,
        eval_y: &[usize],
        num_classes: usize,
        params: SelectorParams,
    ) -> Result<Box<dyn Selector>>;
}

/// Fraction of correct predictions.
pub fn accuracy(pred: &[usize], truth: &[usize]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let hits = pred
        .iter()
        .zip(truth.iter())
        .filter(|(p, t)| p == t)
        .count();
    hits as f64 / truth.len() as f64
}

/// Reference trainer: multinomial logistic regression, zero-initialized and
/// fit with full-batch gradient descent, keeping the weights that score best
/// on the eval set. Depth has no analogue here and is ignored.
#[derive(Debug, Clone)]
pub struct LogisticSelectorTrainer {
    pub epochs: usize,
    /// Multiplier applied to the grid learning rate, which is scaled for
    /// boosted trees rather than gradient descent.
    pub lr_scale: f64,
    /// Eval cadence in epochs for early-stopping bookkeeping.
    pub eval_every: usize,
}

impl Default for LogisticSelectorTrainer {
    fn default() -> Self {
        Self {
            epochs: 300,
            lr_scale: 100.0,
            eval_every: 20,
        }
    }
}

struct LogisticSelector {
    /// `(num_classes, dim + 1)`; the trailing column is the bias.
    weights: Array2<f64>,
}

fn with_bias(x: &ArrayView2<'_, f64>) -> Array2<f64> {
    let mut out = Array2::ones((x.nrows(), x.ncols() + 1));
    out.slice_mut(ndarray::s![.., ..x.ncols()]).assign(x);
    out
}

fn row_softmax(logits: &mut Array2<f64>) {
    for mut row in logits.axis_iter_mut(Axis(0)) {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|z| (z - max).exp());
        let total = row.sum();
        if total > 0.0 {
            row.mapv_inplace(|z| z / total);
        }
    }
}

fn argmax_rows(logits: &Array2<f64>) -> Vec<usize> {
    logits
        .axis_iter(Axis(0))
        .map(|row| {
            let mut best = 0;
            let mut best_val = f64::NEG_INFINITY;
            for (j, &z) in row.iter().enumerate() {
                if z > best_val {
                    best_val = z;
                    best = j;
                }
            }
            best
        })
        .collect()
}

impl Selector for LogisticSelector {
    fn predict(&self, x: &ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        if x.ncols() + 1 != self.weights.ncols() {
            return Err(Error::ShapeMismatch(format!(
                "selector was trained on {} features, got {}",
                self.weights.ncols() - 1,
                x.ncols()
            )));
        }
        let logits = with_bias(x).dot(&self.weights.t());
        Ok(argmax_rows(&logits))
    }
}

impl SelectorTrainer for LogisticSelectorTrainer {
    fn fit(
        &self,
        train_x: &ArrayView2<'_, f64>,
        train_y: &[usize],
        eval_x: &ArrayView2<'_, f64>,
        eval_y: &[usize],
        num_classes: usize,
        params: SelectorParams,
    ) -> Result<Box<dyn Selector>> {
        let n = train_x.nrows();
        if n == 0 || n != train_y.len() {
            return Err(Error::ShapeMismatch(format!(
                "selector training set has {} rows but {} labels",
                n,
                train_y.len()
            )));
        }
        if let Some(&bad) = train_y.iter().find(|&&y| y >= num_classes) {
            return Err(Error::ShapeMismatch(format!(
                "label {} out of range for {} classes",
                bad, num_classes
            )));
        }

        let x = with_bias(train_x);
        let dim = x.ncols();
        let step = params.learning_rate * self.lr_scale;

        // One-hot targets.
        let mut targets = Array2::zeros((n, num_classes));
        for (i, &y) in train_y.iter().enumerate() {
            targets[[i, y]] = 1.0;
        }

        let mut weights: Array2<f64> = Array2::zeros((num_classes, dim));
        let mut best_weights = weights.clone();
        let mut best_eval = f64::NEG_INFINITY;

        for epoch in 1..=self.epochs {
            let mut probs = x.dot(&weights.t());
            row_softmax(&mut probs);
            let grad = (&probs - &targets).t().dot(&x) / n as f64;
            weights = weights - grad * step;

            if epoch % self.eval_every == 0 || epoch == self.epochs {
                let candidate = LogisticSelector {
                    weights: weights.clone(),
                };
                let score = accuracy(&candidate.predict(eval_x)?, eval_y);
                if score > best_eval {
                    best_eval = score;
                    best_weights = weights.clone();
                }
            }
        }

        Ok(Box::new(LogisticSelector {
            weights: best_weights,
        }))
    }
}
