//! Model Capability Boundary
//!
//! A model accepts a matrix of feature rows and returns either one label per
//! row or one score vector per row. Deferred references name a factory in the
//! registry instead of loading code dynamically.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// The two accepted model output forms.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// One label per input row.
    Labels(Array1<f64>),
    /// One score vector per input row.
    Scores(Array2<f64>),
}

impl Prediction {
    /// Number of rows covered by the prediction.
    pub fn len(&self) -> usize {
        match self {
            Prediction::Labels(v) => v.len(),
            Prediction::Scores(m) => m.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether two predictions share form and per-row shape.
    pub fn same_form(&self, other: &Prediction) -> bool {
        match (self, other) {
            (Prediction::Labels(_), Prediction::Labels(_)) => true,
            (Prediction::Scores(a), Prediction::Scores(b)) => a.ncols() == b.ncols(),
            _ => false,
        }
    }
}

/// A trained model: feature rows in, predictions out.
pub trait Model: Send + Sync {
    fn predict(&self, x: &ArrayView2<'_, f64>) -> Result<Prediction>;

    /// Expected feature dimensionality, when the model knows it.
    fn input_dim(&self) -> Option<usize> {
        None
    }
}

/// Reference to a model: live, or deferred until first use.
#[derive(Clone)]
pub enum ModelRef {
    /// An already-instantiated model.
    Instance(Arc<dyn Model>),
    /// A registry key plus constructor arguments, materialized lazily.
    Deferred { class_path: String, args: Value },
}

impl ModelRef {
    pub fn instance(model: impl Model + 'static) -> Self {
        ModelRef::Instance(Arc::new(model))
    }

    pub fn deferred(class_path: impl Into<String>, args: Value) -> Self {
        ModelRef::Deferred {
            class_path: class_path.into(),
            args,
        }
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelRef::Instance(_) => f.write_str("ModelRef::Instance"),
            ModelRef::Deferred { class_path, .. } => {
                write!(f, "ModelRef::Deferred({})", class_path)
            }
        }
    }
}

/// Serializable shadow of a deferred reference, used by snapshot stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredModelRef {
    pub class_path: String,
    pub args: Value,
}

impl From<StoredModelRef> for ModelRef {
    fn from(stored: StoredModelRef) -> Self {
        ModelRef::Deferred {
            class_path: stored.class_path,
            args: stored.args,
        }
    }
}

type ModelFactory = Arc<dyn Fn(&Value) -> Result<Arc<dyn Model>> + Send + Sync>;

/// Maps class-path keys to model factories.
///
/// This replaces reflective module loading: a deferred reference resolves by
/// looking its key up here at instantiation time.
#[derive(Default)]
pub struct ModelRegistry {
    factories: RwLock<HashMap<String, ModelFactory>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, class_path: &str, factory: F)
    where
        F: Fn(&Value) -> Result<Arc<dyn Model>> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .unwrap()
            .insert(class_path.to_string(), Arc::new(factory));
    }

    pub fn instantiate(&self, class_path: &str, args: &Value) -> Result<Arc<dyn Model>> {
        let factory = {
            let guard = self.factories.read().unwrap();
            guard.get(class_path).cloned()
        };
        match factory {
            Some(factory) => factory(args),
            None => Err(Error::Instantiation {
                class_path: class_path.to_string(),
                reason: "no factory registered under this key".to_string(),
            }),
        }
    }
}
