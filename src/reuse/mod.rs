//! Multi-Learnware Reuse
//!
//! Given the learnware selected by a search, a reuser produces one
//! prediction function over new user data: the job selector routes each row
//! to the single best candidate, the averaging reuser blends all candidates.

mod averaging;
mod job_selector;

pub use averaging::{AveragingMode, AveragingReuser};
pub use job_selector::JobSelectorReuser;

use async_trait::async_trait;
use ndarray::Array2;

use crate::error::Result;
use crate::learnware::Prediction;

#[async_trait]
pub trait Reuser: Send + Sync {
    /// Predict over a batch of user feature rows.
    async fn predict(&self, user_data: &Array2<f64>) -> Result<Prediction>;
}
