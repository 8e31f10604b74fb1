//! Ensemble Averaging
//!
//! `Mean` averages raw predictions elementwise; `Vote` pushes each output
//! through a softmax first, for uncalibrated scores whose magnitudes differ
//! across models. Neither mode weights candidates by mixture weight.

use std::sync::Arc;

use async_trait::async_trait;
use ndarray::{Array2, Axis};

use crate::error::{Error, Result};
use crate::learnware::{Learnware, Prediction};
use crate::reuse::Reuser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AveragingMode {
    /// Arithmetic mean of raw predictions.
    Mean,
    /// Softmax-normalize each prediction before summing.
    Vote,
}

pub struct AveragingReuser {
    learnware_list: Vec<Arc<Learnware>>,
    mode: AveragingMode,
}

impl AveragingReuser {
    pub fn new(learnware_list: Vec<Arc<Learnware>>, mode: AveragingMode) -> Self {
        Self {
            learnware_list,
            mode,
        }
    }
}

fn softmax_slice(values: &mut [f64]) {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut total = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        total += *v;
    }
    if total > 0.0 {
        for v in values.iter_mut() {
            *v /= total;
        }
    }
}

/// Softmax over the sample axis, as the ensemble vote normalizer.
fn normalize(pred: Prediction) -> Prediction {
    match pred {
        Prediction::Labels(mut v) => {
            let mut buf: Vec<f64> = v.to_vec();
            softmax_slice(&mut buf);
            for (dst, src) in v.iter_mut().zip(buf) {
                *dst = src;
            }
            Prediction::Labels(v)
        }
        Prediction::Scores(mut m) => {
            for mut col in m.axis_iter_mut(Axis(1)) {
                let mut buf: Vec<f64> = col.to_vec();
                softmax_slice(&mut buf);
                for (dst, src) in col.iter_mut().zip(buf) {
                    *dst = src;
                }
            }
            Prediction::Scores(m)
        }
    }
}

fn accumulate(acc: Prediction, next: Prediction) -> Result<Prediction> {
    if !acc.same_form(&next) || acc.len() != next.len() {
        return Err(Error::ShapeMismatch(
            "ensemble members produced incompatible prediction shapes".to_string(),
        ));
    }
    Ok(match (acc, next) {
        (Prediction::Labels(a), Prediction::Labels(b)) => Prediction::Labels(a + b),
        (Prediction::Scores(a), Prediction::Scores(b)) => Prediction::Scores(a + b),
        _ => unreachable!("form checked above"),
    })
}

fn scale(pred: Prediction, factor: f64) -> Prediction {
    match pred {
        Prediction::Labels(v) => Prediction::Labels(v * factor),
        Prediction::Scores(m) => Prediction::Scores(m * factor),
    }
}

#[async_trait]
impl Reuser for AveragingReuser {
    async fn predict(&self, user_data: &Array2<f64>) -> Result<Prediction> {
        if self.learnware_list.is_empty() {
            return Err(Error::ShapeMismatch(
                "averaging over an empty learnware list".to_string(),
            ));
        }

        let mut acc: Option<Prediction> = None;
        for learnware in &self.learnware_list {
            let pred = learnware.predict(user_data).await?;
            if pred.len() != user_data.nrows() {
                return Err(Error::ShapeMismatch(format!(
                    "learnware `{}` returned {} rows for {} inputs",
                    learnware.id(),
                    pred.len(),
                    user_data.nrows()
                )));
            }
            let pred = match self.mode {
                AveragingMode::Mean => pred,
                AveragingMode::Vote => normalize(pred),
            };
            acc = Some(match acc {
                None => pred,
                Some(prev) => accumulate(prev, pred)?,
            });
        }

        let count = self.learnware_list.len() as f64;
        Ok(scale(acc.expect("list checked non-empty"), 1.0 / count))
    }
}
