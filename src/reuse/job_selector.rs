//! Job-Selector Reuse
//!
//! Routes each user row to the single most appropriate learnware. A routing
//! classifier is trained on synthetic samples herded out of each candidate's
//! fingerprint, sized by the candidate's mixture weight; at predict time the
//! user batch is partitioned by predicted candidate and reassembled in the
//! original row order.

use std::sync::Arc;

use async_trait::async_trait;
use ndarray::{concatenate, s, Array1, Array2, Axis};
use tracing::{debug, warn};

use crate::capability::{
    accuracy, FrankWolfeQp, LogisticSelectorTrainer, QpSolver, Selector, SelectorGrid,
    SelectorParams, SelectorTrainer,
};
use crate::error::{Error, Result};
use crate::learnware::{Learnware, Prediction};
use crate::reuse::Reuser;
use crate::spec::{StatSpec, StatSpecBuilder};

/// Floor on the herded sample count so small-weight candidates still
/// contribute training rows.
const MIN_HERDING_PER_CANDIDATE: usize = 5;

pub struct JobSelectorReuser {
    learnware_list: Vec<Arc<Learnware>>,
    stat_kind: String,
    builder: Arc<dyn StatSpecBuilder>,
    solver: Arc<dyn QpSolver>,
    trainer: Arc<dyn SelectorTrainer>,
    grid: SelectorGrid,
    herding_num: usize,
    use_herding: bool,
}

impl JobSelectorReuser {
    pub fn new(learnware_list: Vec<Arc<Learnware>>, builder: Arc<dyn StatSpecBuilder>) -> Self {
        let stat_kind = builder.kind().to_string();
        Self {
            learnware_list,
            stat_kind,
            builder,
            solver: Arc::new(FrankWolfeQp::default()),
            trainer: Arc::new(LogisticSelectorTrainer::default()),
            grid: SelectorGrid::default(),
            herding_num: 1000,
            use_herding: true,
        }
    }

    pub fn with_herding_num(mut self, herding_num: usize) -> Self {
        self.herding_num = herding_num;
        self
    }

    pub fn with_use_herding(mut self, use_herding: bool) -> Self {
        self.use_herding = use_herding;
        self
    }

    pub fn with_solver(mut self, solver: Arc<dyn QpSolver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_trainer(mut self, trainer: Arc<dyn SelectorTrainer>) -> Self {
        self.trainer = trainer;
        self
    }

    pub fn with_grid(mut self, grid: SelectorGrid) -> Self {
        self.grid = grid;
        self
    }

    fn candidate_specs(&self) -> Result<Vec<Arc<dyn StatSpec>>> {
        self.learnware_list
            .iter()
            .map(|lw| {
                lw.stat_spec(&self.stat_kind)
                    .ok_or_else(|| Error::MissingFingerprint {
                        id: lw.id().to_string(),
                        kind: self.stat_kind.clone(),
                    })
            })
            .collect()
    }

    /// Mixture weights of the candidates against a fingerprint of the user's
    /// own data. `None` when the solve is infeasible; callers fall back to
    /// fingerprint-sized herding.
    fn mixture_weights(
        &self,
        user_data: &Array2<f64>,
        specs: &[Arc<dyn StatSpec>],
    ) -> Result<Option<Vec<f64>>> {
        let user_spec = self.builder.build(&user_data.view())?;
        let n = specs.len();

        let mut k = Array2::zeros((n, n));
        for i in 0..n {
            for j in i..n {
                let value = specs[i].inner_product(specs[j].as_ref())?;
                k[[i, j]] = value;
                k[[j, i]] = value;
            }
        }
        let mut v = Array1::zeros(n);
        for (i, spec) in specs.iter().enumerate() {
            v[i] = user_spec.inner_product(spec.as_ref())?;
        }

        match self.solver.solve_simplex(&k, &v)? {
            Some(weights) => Ok(Some(weights)),
            None => {
                warn!("mixture solve infeasible; herding by stored sample counts");
                Ok(None)
            }
        }
    }

    /// Train the routing classifier and classify every user row.
    ///
    /// With a single candidate there is nothing to route: every row maps to
    /// index 0 and no classifier is trained.
    pub async fn job_selector(&self, user_data: &Array2<f64>) -> Result<Vec<usize>> {
        if self.learnware_list.len() == 1 {
            return Ok(vec![0; user_data.nrows()]);
        }

        let specs = self.candidate_specs()?;
        let weights = if self.use_herding {
            self.mixture_weights(user_data, &specs)?
        } else {
            None
        };

        let mut full_blocks = Vec::new();
        let mut train_blocks = Vec::new();
        let mut val_blocks = Vec::new();
        let mut full_y = Vec::new();
        let mut train_y = Vec::new();
        let mut val_y = Vec::new();

        for (i, spec) in specs.iter().enumerate() {
            let count = match &weights {
                Some(w) => {
                    ((self.herding_num as f64 * w[i]) as usize).max(MIN_HERDING_PER_CANDIDATE)
                }
                None => spec.sample_count(),
            };
            let block = spec.herding(count)?;
            let count = block.nrows();
            // Validation split is the tail fifth.
            let val_num = count / 5;
            let train_num = count - val_num;

            train_blocks.push(block.slice(s![..train_num, ..]).to_owned());
            val_blocks.push(block.slice(s![train_num.., ..]).to_owned());
            full_blocks.push(block);

            full_y.extend(std::iter::repeat(i).take(count));
            train_y.extend(std::iter::repeat(i).take(train_num));
            val_y.extend(std::iter::repeat(i).take(val_num));
        }

        let cat = |blocks: &[Array2<f64>]| -> Result<Array2<f64>> {
            let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
            concatenate(Axis(0), &views).map_err(|e| Error::ShapeMismatch(e.to_string()))
        };
        let full_x = cat(&full_blocks)?;
        let train_x = cat(&train_blocks)?;
        let val_x = cat(&val_blocks)?;

        let num_classes = self.learnware_list.len();
        let configurations = self.grid.configurations();
        if configurations.is_empty() {
            return Err(Error::Unsupported("empty selector hyperparameter grid"));
        }

        // Model selection scores every configuration against the full
        // synthetic pool, not just the validation split.
        let mut best: Option<(f64, SelectorParams)> = None;
        for params in configurations {
            let selector = self.trainer.fit(
                &train_x.view(),
                &train_y,
                &val_x.view(),
                &val_y,
                num_classes,
                params,
            )?;
            let score = accuracy(&selector.predict(&full_x.view())?, &full_y);
            debug!(
                learning_rate = params.learning_rate,
                max_depth = params.max_depth,
                score,
                "selector configuration scored"
            );
            if best.map_or(true, |(top, _)| score > top) {
                best = Some((score, params));
            }
        }
        let (_, winner) = best.expect("grid checked non-empty");

        // Final retrain on the full pool, with the pool as its own eval set.
        let selector = self.trainer.fit(
            &full_x.view(),
            &full_y,
            &full_x.view(),
            &full_y,
            num_classes,
            winner,
        )?;
        selector.predict(&user_data.view())
    }
}

#[async_trait]
impl Reuser for JobSelectorReuser {
    async fn predict(&self, user_data: &Array2<f64>) -> Result<Prediction> {
        let routes = self.job_selector(user_data).await?;

        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); self.learnware_list.len()];
        for (row, &idx) in routes.iter().enumerate() {
            let group = groups.get_mut(idx).ok_or_else(|| {
                Error::ShapeMismatch(format!(
                    "selector routed to index {} but only {} candidates exist",
                    idx,
                    self.learnware_list.len()
                ))
            })?;
            group.push(row);
        }

        let mut pieces: Vec<(Vec<usize>, Prediction)> = Vec::new();
        for (idx, rows) in groups.into_iter().enumerate() {
            if rows.is_empty() {
                continue;
            }
            let sub = user_data.select(Axis(0), &rows);
            let pred = self.learnware_list[idx].predict(&sub).await?;
            if pred.len() != rows.len() {
                return Err(Error::ShapeMismatch(format!(
                    "learnware `{}` returned {} rows for {} inputs",
                    self.learnware_list[idx].id(),
                    pred.len(),
                    rows.len()
                )));
            }
            pieces.push((rows, pred));
        }

        let total = user_data.nrows();
        let Some((_, first)) = pieces.first() else {
            return Ok(Prediction::Labels(Array1::zeros(0)));
        };

        // Reassemble each partition's outputs back into input order.
        match first {
            Prediction::Labels(_) => {
                let mut out = Array1::zeros(total);
                for (rows, pred) in &pieces {
                    let Prediction::Labels(values) = pred else {
                        return Err(Error::ShapeMismatch(
                            "candidates returned a mix of label and score outputs".to_string(),
                        ));
                    };
                    for (k, &row) in rows.iter().enumerate() {
                        out[row] = values[k];
                    }
                }
                Ok(Prediction::Labels(out))
            }
            Prediction::Scores(first_scores) => {
                let width = first_scores.ncols();
                let mut out = Array2::zeros((total, width));
                for (rows, pred) in &pieces {
                    let Prediction::Scores(scores) = pred else {
                        return Err(Error::ShapeMismatch(
                            "candidates returned a mix of label and score outputs".to_string(),
                        ));
                    };
                    if scores.ncols() != width {
                        return Err(Error::ShapeMismatch(format!(
                            "score widths differ across candidates: {} vs {}",
                            scores.ncols(),
                            width
                        )));
                    }
                    for (k, &row) in rows.iter().enumerate() {
                        out.row_mut(row).assign(&scores.row(k));
                    }
                }
                Ok(Prediction::Scores(out))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learnware::{Model, ModelRef, ModelRegistry};
    use crate::spec::{RkmeBuilder, RkmeSpec, SemanticSpec, Specification};
    use ndarray::ArrayView2;
    use ndarray_rand::rand_distr::StandardNormal;
    use ndarray_rand::RandomExt;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Labels every row with a fixed value; stands in for a candidate model.
    struct IndexModel(f64);

    impl Model for IndexModel {
        fn predict(&self, x: &ArrayView2<'_, f64>) -> Result<Prediction> {
            Ok(Prediction::Labels(Array1::from_elem(x.nrows(), self.0)))
        }
    }

    struct PanicTrainer;

    impl SelectorTrainer for PanicTrainer {
        fn fit(
            &self,
            _train_x: &ArrayView2<'_, f64>,
            _train_y: &[usize],
            _eval_x: &ArrayView2<'_, f64>,
            _eval_y: &[usize],
            _num_classes: usize,
            _params: SelectorParams,
        ) -> Result<Box<dyn Selector>> {
            panic!("no classifier may be trained for a single candidate");
        }
    }

    fn shifted_learnware(idx: usize, shift: f64, seed: u64) -> Arc<Learnware> {
        let mut rng = StdRng::seed_from_u64(seed);
        let data: Array2<f64> =
            Array2::random_using((60, 2), StandardNormal, &mut rng) * 0.3 + shift;
        let rkme: Arc<dyn StatSpec> =
            Arc::new(RkmeSpec::from_data(&data.view(), 0.5).unwrap());
        Arc::new(Learnware::new(
            format!("{:08}", idx),
            Specification::new(SemanticSpec::default()).with_stat_spec(rkme),
            ModelRef::instance(IndexModel(idx as f64)),
            Arc::new(ModelRegistry::new()),
        ))
    }

    #[tokio::test]
    async fn test_single_candidate_routes_everything_without_training() {
        let lone = shifted_learnware(0, 0.0, 1);
        let reuser = JobSelectorReuser::new(vec![lone.clone()], Arc::new(RkmeBuilder::new(0.5)))
            .with_trainer(Arc::new(PanicTrainer));

        let x = Array2::from_elem((7, 2), 0.1);
        let via_selector = reuser.predict(&x).await.unwrap();
        let direct = lone.predict(&x).await.unwrap();
        assert_eq!(via_selector, direct);
    }

    #[tokio::test]
    async fn test_reassembly_is_permutation_consistent() {
        let list = vec![
            shifted_learnware(0, 0.0, 2),
            shifted_learnware(1, 6.0, 3),
            shifted_learnware(2, 12.0, 4),
        ];
        let reuser =
            JobSelectorReuser::new(list, Arc::new(RkmeBuilder::new(0.5))).with_herding_num(150);

        // Interleave rows from all three regions.
        let mut rows = Vec::new();
        for i in 0..30 {
            let shift = (i % 3) as f64 * 6.0;
            rows.push([shift + 0.05, shift - 0.05]);
        }
        let x = Array2::from_shape_vec((30, 2), rows.concat()).unwrap();

        let routes = reuser.job_selector(&x).await.unwrap();
        let pred = reuser.predict(&x).await.unwrap();
        let Prediction::Labels(labels) = pred else {
            panic!("expected labels");
        };
        // Each output lands at its input's position and matches its route.
        for (row, &route) in routes.iter().enumerate() {
            assert_eq!(labels[row], route as f64);
        }
    }

    #[tokio::test]
    async fn test_missing_fingerprint_is_reported_per_learnware() {
        let bare = Arc::new(Learnware::new(
            "00000009",
            Specification::new(SemanticSpec::default()),
            ModelRef::instance(IndexModel(0.0)),
            Arc::new(ModelRegistry::new()),
        ));
        let list = vec![shifted_learnware(0, 0.0, 5), bare];
        let reuser = JobSelectorReuser::new(list, Arc::new(RkmeBuilder::new(0.5)));
        let x = Array2::zeros((3, 2));
        let err = reuser.predict(&x).await.unwrap_err();
        assert!(matches!(
            err,
            Error::MissingFingerprint { ref id, .. } if id == "00000009"
        ));
    }
}
