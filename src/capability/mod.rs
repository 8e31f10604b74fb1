//! External Capability Adapters
//!
//! Seams the core calls into rather than reimplements: convex mixture
//! solving and multi-class selector training. Each trait ships with a
//! deterministic reference adapter so the market is usable out of the box;
//! production deployments can substitute heavier backends.

mod qp;
mod selector;

pub use qp::{FrankWolfeQp, QpSolver};
pub use selector::{
    accuracy, LogisticSelectorTrainer, Selector, SelectorGrid, SelectorParams, SelectorTrainer,
};
