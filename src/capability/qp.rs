//! Convex Mixture Solving
//!
//! Minimize `wᵀKw - 2vᵀw` over the probability simplex. The solver is a
//! capability boundary: `Ok(None)` signals infeasibility and callers recover
//! locally instead of failing the surrounding search.

use ndarray::{Array1, Array2};

use crate::error::{Error, Result};

pub trait QpSolver: Send + Sync {
    /// Solve for mixture weights on the probability simplex.
    ///
    /// Returns `Ok(None)` when no feasible point can be produced, e.g. for
    /// non-finite inputs or a solver that failed to converge.
    fn solve_simplex(&self, k: &Array2<f64>, v: &Array1<f64>) -> Result<Option<Vec<f64>>>;
}

/// Conditional-gradient (Frank-Wolfe) reference solver.
///
/// Every iterate is a convex combination of simplex vertices, so feasibility
/// (`w ≥ 0`, `Σw = 1`) holds by construction at every step. Deterministic:
/// gradient argmin ties resolve to the lowest index.
#[derive(Debug, Clone)]
pub struct FrankWolfeQp {
    pub max_iters: usize,
}

impl Default for FrankWolfeQp {
    fn default() -> Self {
        Self { max_iters: 500 }
    }
}

impl QpSolver for FrankWolfeQp {
    fn solve_simplex(&self, k: &Array2<f64>, v: &Array1<f64>) -> Result<Option<Vec<f64>>> {
        let n = v.len();
        if k.nrows() != n || k.ncols() != n {
            return Err(Error::ShapeMismatch(format!(
                "similarity matrix is {}x{} but the target vector has {} entries",
                k.nrows(),
                k.ncols(),
                n
            )));
        }
        if n == 0 {
            return Ok(None);
        }
        if k.iter().any(|x| !x.is_finite()) || v.iter().any(|x| !x.is_finite()) {
            return Ok(None);
        }

        let mut w = Array1::from_elem(n, 1.0 / n as f64);
        for t in 0..self.max_iters {
            // Gradient of wᵀKw - 2vᵀw.
            let grad = k.dot(&w) * 2.0 - v * 2.0;
            let mut vertex = 0;
            let mut lowest = f64::INFINITY;
            for (j, &g) in grad.iter().enumerate() {
                if g < lowest {
                    lowest = g;
                    vertex = j;
                }
            }
            let step = 2.0 / (t as f64 + 2.0);
            w *= 1.0 - step;
            w[vertex] += step;
        }

        Ok(Some(w.to_vec()))
    }
}
