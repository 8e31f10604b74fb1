//! Learnware
//!
//! A learnware pairs a market-assigned id with a model reference and its
//! specification. Deferred model references materialize at most once; the
//! live instance is cached for every later predict call.

mod model;

pub use model::{Model, ModelRef, ModelRegistry, Prediction, StoredModelRef};

use std::sync::{Arc, RwLock};

use ndarray::Array2;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{Error, Result};
use crate::spec::{SemanticSpec, Specification, StatSpec};

pub struct Learnware {
    id: String,
    specification: RwLock<Specification>,
    model_ref: ModelRef,
    registry: Arc<ModelRegistry>,
    materialized: OnceCell<Arc<dyn Model>>,
}

impl Learnware {
    pub fn new(
        id: impl Into<String>,
        specification: Specification,
        model_ref: ModelRef,
        registry: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            id: id.into(),
            specification: RwLock::new(specification),
            model_ref,
            registry,
            materialized: OnceCell::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn specification(&self) -> Specification {
        self.specification.read().unwrap().clone()
    }

    pub fn semantic_spec(&self) -> SemanticSpec {
        self.specification.read().unwrap().semantic_spec().clone()
    }

    pub fn stat_spec(&self, kind: &str) -> Option<Arc<dyn StatSpec>> {
        self.specification.read().unwrap().stat_spec(kind)
    }

    pub fn model_ref(&self) -> &ModelRef {
        &self.model_ref
    }

    /// Replace the fingerprint stored under `name`.
    pub fn update_stat_spec(&self, name: &str, spec: Arc<dyn StatSpec>) {
        self.specification.write().unwrap().update_stat_spec(name, spec);
    }

    /// Replace the semantic specification.
    pub fn update_semantic_spec(&self, semantic: SemanticSpec) {
        self.specification
            .write()
            .unwrap()
            .update_semantic_spec(semantic);
    }

    /// Resolve the model, materializing a deferred reference exactly once.
    ///
    /// Concurrent first callers share one construction; the second caller
    /// waits on the cell instead of instantiating twice.
    pub async fn model(&self) -> Result<Arc<dyn Model>> {
        match &self.model_ref {
            ModelRef::Instance(model) => Ok(model.clone()),
            ModelRef::Deferred { class_path, args } => self
                .materialized
                .get_or_try_init(|| async {
                    debug!(id = %self.id, class_path = %class_path, "materializing deferred model");
                    self.registry.instantiate(class_path, args)
                })
                .await
                .cloned(),
        }
    }

    pub async fn predict(&self, x: &Array2<f64>) -> Result<Prediction> {
        let model = self.model().await?;
        model.predict(&x.view())
    }

    /// Model update is an intentionally abstract extension point.
    pub fn update(&self) -> Result<()> {
        Err(Error::Unsupported("learnware model update"))
    }
}

impl std::fmt::Debug for Learnware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Learnware")
            .field("id", &self.id)
            .field("model_ref", &self.model_ref)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, ArrayView2};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ZeroModel;

    impl Model for ZeroModel {
        fn predict(&self, x: &ArrayView2<'_, f64>) -> Result<Prediction> {
            Ok(Prediction::Labels(Array1::zeros(x.nrows())))
        }
    }

    fn bare_spec() -> Specification {
        Specification::new(SemanticSpec::default())
    }

    #[tokio::test]
    async fn test_deferred_model_materializes_once_under_concurrency() {
        static CONSTRUCTIONS: AtomicUsize = AtomicUsize::new(0);

        let registry = Arc::new(ModelRegistry::new());
        registry.register("zero", |_args| {
            CONSTRUCTIONS.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(ZeroModel) as Arc<dyn Model>)
        });

        let learnware = Arc::new(Learnware::new(
            "00000001",
            bare_spec(),
            ModelRef::deferred("zero", serde_json::Value::Null),
            registry,
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let lw = learnware.clone();
            handles.push(tokio::spawn(async move {
                let x = Array2::zeros((2, 2));
                lw.predict(&x).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(CONSTRUCTIONS.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unresolvable_reference_fails_that_learnware_only() {
        let registry = Arc::new(ModelRegistry::new());
        let broken = Learnware::new(
            "00000002",
            bare_spec(),
            ModelRef::deferred("gone", serde_json::Value::Null),
            registry.clone(),
        );
        let healthy = Learnware::new(
            "00000003",
            bare_spec(),
            ModelRef::instance(ZeroModel),
            registry,
        );

        let x = Array2::zeros((1, 1));
        assert!(matches!(
            broken.predict(&x).await,
            Err(Error::Instantiation { .. })
        ));
        assert!(healthy.predict(&x).await.is_ok());
    }

    #[test]
    fn test_update_is_an_unimplemented_extension_point() {
        let registry = Arc::new(ModelRegistry::new());
        let lw = Learnware::new("x", bare_spec(), ModelRef::instance(ZeroModel), registry);
        assert!(matches!(lw.update(), Err(Error::Unsupported(_))));
    }
}
