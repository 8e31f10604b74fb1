//! Two-Stage Search
//!
//! Stage A filters the candidate snapshot by semantic compatibility; stage B
//! ranks the survivors by fingerprint distance and solves for a convex
//! mixture of the closest candidates. Stage B runs only when the user and at
//! least one candidate share a fingerprint kind.

use std::cmp::Ordering;
use std::sync::Arc;

use ndarray::{Array1, Array2};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::capability::QpSolver;
use crate::error::Result;
use crate::learnware::Learnware;
use crate::market::{Organizer, UserInfo};
use crate::spec::StatSpec;

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Cap on the candidate count handed to the mixture solve.
    pub max_mixture_candidates: usize,
    /// Minimum weight for a candidate to appear in the mixture list.
    pub mixture_weight_threshold: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_mixture_candidates: 16,
            mixture_weight_threshold: 1e-3,
        }
    }
}

/// The three-part search answer.
///
/// A semantic-only search leaves `sorted_distances` and
/// `mixture_learnware_list` empty while `single_learnware_list` holds the
/// filtered candidates in insertion order.
#[derive(Default)]
pub struct SearchResult {
    pub sorted_distances: Vec<f64>,
    pub single_learnware_list: Vec<Arc<Learnware>>,
    pub mixture_learnware_list: Vec<Arc<Learnware>>,
}

pub struct EasySearcher {
    organizer: Arc<dyn Organizer>,
    solver: Arc<dyn QpSolver>,
    config: SearchConfig,
}

impl EasySearcher {
    pub fn new(organizer: Arc<dyn Organizer>, solver: Arc<dyn QpSolver>) -> Self {
        Self {
            organizer,
            solver,
            config: SearchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn search(&self, user_info: &UserInfo) -> Result<SearchResult> {
        let candidates = self.organizer.snapshot().await;
        let total = candidates.len();

        let filtered: Vec<Arc<Learnware>> = match user_info.semantic() {
            Some(query) => candidates
                .into_iter()
                .filter(|lw| lw.semantic_spec().matches(query))
                .collect(),
            None => candidates,
        };
        debug!(
            user = user_info.id().unwrap_or("-"),
            total,
            filtered = filtered.len(),
            "semantic filter applied"
        );

        if filtered.is_empty() || user_info.stat_info().is_empty() {
            return Ok(SearchResult {
                single_learnware_list: filtered,
                ..SearchResult::default()
            });
        }

        // First fingerprint kind shared by the user and any candidate.
        let mut chosen: Option<(
            &str,
            &Arc<dyn StatSpec>,
            Vec<(Arc<Learnware>, Arc<dyn StatSpec>)>,
        )> = None;
        for (kind, user_spec) in user_info.stat_info() {
            let carriers: Vec<(Arc<Learnware>, Arc<dyn StatSpec>)> = filtered
                .iter()
                .filter_map(|lw| lw.stat_spec(kind).map(|s| (lw.clone(), s)))
                .collect();
            if !carriers.is_empty() {
                chosen = Some((kind.as_str(), user_spec, carriers));
                break;
            }
        }
        let Some((kind, user_spec, carriers)) = chosen else {
            debug!("no candidate shares a fingerprint kind with the user; returning unranked");
            return Ok(SearchResult {
                single_learnware_list: filtered,
                ..SearchResult::default()
            });
        };

        let specs: Vec<Arc<dyn StatSpec>> = carriers.iter().map(|(_, s)| s.clone()).collect();
        let n = specs.len();
        let user_self = user_spec.inner_product(user_spec.as_ref())?;

        let k_rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| {
                (0..n)
                    .map(|j| specs[i].inner_product(specs[j].as_ref()))
                    .collect::<Result<Vec<f64>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        let v: Vec<f64> = specs
            .par_iter()
            .map(|s| user_spec.inner_product(s.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let distances: Vec<f64> = (0..n)
            .map(|i| (k_rows[i][i] - 2.0 * v[i] + user_self).max(0.0).sqrt())
            .collect();

        // Stable sort: equal distances keep insertion order.
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            distances[a]
                .partial_cmp(&distances[b])
                .unwrap_or(Ordering::Equal)
        });

        let sorted_distances: Vec<f64> = order.iter().map(|&i| distances[i]).collect();
        let single_learnware_list: Vec<Arc<Learnware>> =
            order.iter().map(|&i| carriers[i].0.clone()).collect();

        let mixture_learnware_list =
            self.solve_mixture(kind, &order, &k_rows, &v, &carriers)?;

        Ok(SearchResult {
            sorted_distances,
            single_learnware_list,
            mixture_learnware_list,
        })
    }

    /// Solve the convex mixture over the top-ranked candidates. Infeasible
    /// solves degrade to an empty mixture; the ranking survives.
    fn solve_mixture(
        &self,
        kind: &str,
        order: &[usize],
        k_rows: &[Vec<f64>],
        v: &[f64],
        carriers: &[(Arc<Learnware>, Arc<dyn StatSpec>)],
    ) -> Result<Vec<Arc<Learnware>>> {
        let top: Vec<usize> = order
            .iter()
            .copied()
            .take(self.config.max_mixture_candidates)
            .collect();

        if top.len() == 1 {
            return Ok(vec![carriers[top[0]].0.clone()]);
        }

        let m = top.len();
        let mut k_sub = Array2::zeros((m, m));
        let mut v_sub = Array1::zeros(m);
        for (a, &i) in top.iter().enumerate() {
            v_sub[a] = v[i];
            for (b, &j) in top.iter().enumerate() {
                k_sub[[a, b]] = k_rows[i][j];
            }
        }

        let weights = match self.solver.solve_simplex(&k_sub, &v_sub)? {
            Some(weights) => weights,
            None => {
                warn!(kind, "mixture solve infeasible; returning ranking only");
                return Ok(Vec::new());
            }
        };

        let mut weighted: Vec<(usize, f64)> = top
            .iter()
            .zip(weights.iter())
            .filter(|(_, &w)| w > self.config.mixture_weight_threshold)
            .map(|(&i, &w)| (i, w))
            .collect();
        weighted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        Ok(weighted
            .into_iter()
            .map(|(i, _)| carriers[i].0.clone())
            .collect())
    }
}
