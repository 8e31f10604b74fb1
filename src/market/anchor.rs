//! Anchored Lifecycle Variants
//!
//! An anchored organizer tracks a distinguished subset of the market whose
//! fingerprints serve as stable reference points: held (not-yet-verified)
//! submissions are compared against the anchors before promotion. The
//! evolving variant re-derives anchor fingerprints as the pool grows,
//! leaving ids and semantic specs untouched.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use ndarray::Array2;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{Error, Result};
use crate::learnware::{Learnware, ModelRef};
use crate::market::organizer::EasyOrganizer;
use crate::market::{AddOutcome, Organizer};
use crate::spec::{Specification, StatSpecBuilder};

pub struct AnchoredOrganizer {
    base: EasyOrganizer,
    anchors: RwLock<BTreeSet<String>>,
}

impl AnchoredOrganizer {
    pub fn new(base: EasyOrganizer) -> Self {
        Self {
            base,
            anchors: RwLock::new(BTreeSet::new()),
        }
    }

    pub fn base(&self) -> &EasyOrganizer {
        &self.base
    }

    /// Replace the anchor set. Every id must be a live collection entry.
    pub async fn update_anchors(&self, ids: &[String]) -> Result<()> {
        for id in ids {
            self.base.get(id).await?;
        }
        let mut anchors = self.anchors.write().await;
        anchors.clear();
        anchors.extend(ids.iter().cloned());
        info!(count = anchors.len(), "anchor set updated");
        Ok(())
    }

    pub async fn anchor_ids(&self) -> Vec<String> {
        self.anchors.read().await.iter().cloned().collect()
    }

    pub async fn anchor_learnwares(&self) -> Vec<Arc<Learnware>> {
        let ids = self.anchor_ids().await;
        self.base
            .get_many(&ids)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Distances between a learnware's fingerprint and each anchor's, in
    /// anchor-id order. The calibration signal for promotion policies.
    pub async fn calibration_distances(&self, id: &str, kind: &str) -> Result<Vec<f64>> {
        let learnware = self.base.get(id).await?;
        let spec = learnware
            .stat_spec(kind)
            .ok_or_else(|| Error::MissingFingerprint {
                id: id.to_string(),
                kind: kind.to_string(),
            })?;
        let self_sim = spec.inner_product(spec.as_ref())?;

        let mut distances = Vec::new();
        for anchor in self.anchor_learnwares().await {
            let anchor_spec =
                anchor
                    .stat_spec(kind)
                    .ok_or_else(|| Error::MissingFingerprint {
                        id: anchor.id().to_string(),
                        kind: kind.to_string(),
                    })?;
            let anchor_sim = anchor_spec.inner_product(anchor_spec.as_ref())?;
            let cross = spec.inner_product(anchor_spec.as_ref())?;
            distances.push((self_sim - 2.0 * cross + anchor_sim).max(0.0).sqrt());
        }
        Ok(distances)
    }

    /// Promote a held entry into the searchable candidate set.
    pub async fn promote(&self, id: &str) -> Result<()> {
        if self.base.is_verified(id).await? {
            return Ok(());
        }
        self.base.set_verified(id, true).await?;
        info!(id = %id, "held learnware promoted");
        Ok(())
    }
}

#[async_trait]
impl Organizer for AnchoredOrganizer {
    async fn add(&self, model: ModelRef, specification: Specification) -> Result<AddOutcome> {
        self.base.add(model, specification).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.base.delete(id).await?;
        self.anchors.write().await.remove(id);
        Ok(())
    }

    async fn reload(&self) -> Result<usize> {
        let restored = self.base.reload().await?;
        // Anchors referencing entries that did not survive are dropped.
        let live: BTreeSet<String> = self.base.ids().await.into_iter().collect();
        self.anchors.write().await.retain(|id| live.contains(id));
        Ok(restored)
    }

    async fn get(&self, id: &str) -> Result<Arc<Learnware>> {
        self.base.get(id).await
    }

    async fn get_many(&self, ids: &[String]) -> Vec<Option<Arc<Learnware>>> {
        self.base.get_many(ids).await
    }

    async fn ids(&self) -> Vec<String> {
        self.base.ids().await
    }

    async fn len(&self) -> usize {
        self.base.len().await
    }

    async fn snapshot(&self) -> Vec<Arc<Learnware>> {
        self.base.snapshot().await
    }
}

/// Anchored organizer that can re-derive its anchors' fingerprints.
pub struct EvolvedAnchoredOrganizer {
    inner: AnchoredOrganizer,
}

impl EvolvedAnchoredOrganizer {
    pub fn new(inner: AnchoredOrganizer) -> Self {
        Self { inner }
    }

    pub fn anchored(&self) -> &AnchoredOrganizer {
        &self.inner
    }

    /// Re-derive the fingerprint of every anchor from fresh data supplied by
    /// `data_for`. Anchors without fresh data keep their current fingerprint;
    /// ids and semantic specs never change. Returns how many were refreshed.
    pub async fn evolve_anchors<F>(
        &self,
        builder: &dyn StatSpecBuilder,
        data_for: F,
    ) -> Result<usize>
    where
        F: Fn(&Learnware) -> Option<Array2<f64>>,
    {
        let mut refreshed = 0;
        for anchor in self.inner.anchor_learnwares().await {
            let Some(data) = data_for(&anchor) else {
                continue;
            };
            let spec = builder.build(&data.view())?;
            anchor.update_stat_spec(builder.kind(), spec);
            self.inner.base().persist(anchor.id()).await?;
            refreshed += 1;
        }
        info!(refreshed, "anchor fingerprints evolved");
        Ok(refreshed)
    }
}

#[async_trait]
impl Organizer for EvolvedAnchoredOrganizer {
    async fn add(&self, model: ModelRef, specification: Specification) -> Result<AddOutcome> {
        self.inner.add(model, specification).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.inner.delete(id).await
    }

    async fn reload(&self) -> Result<usize> {
        self.inner.reload().await
    }

    async fn get(&self, id: &str) -> Result<Arc<Learnware>> {
        self.inner.get(id).await
    }

    async fn get_many(&self, ids: &[String]) -> Vec<Option<Arc<Learnware>>> {
        self.inner.get_many(ids).await
    }

    async fn ids(&self) -> Vec<String> {
        self.inner.ids().await
    }

    async fn len(&self) -> usize {
        self.inner.len().await
    }

    async fn snapshot(&self) -> Vec<Arc<Learnware>> {
        self.inner.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learnware::{Model, ModelRegistry, Prediction};
    use crate::market::checker::{Checker, CheckVerdict};
    use crate::market::store::InMemoryStore;
    use crate::spec::{RkmeBuilder, RkmeSpec, SemanticSpec, StatSpec, RKME_KIND};
    use ndarray::{Array1, ArrayView2};

    struct StubModel;

    impl Model for StubModel {
        fn predict(&self, x: &ArrayView2<'_, f64>) -> Result<Prediction> {
            Ok(Prediction::Labels(Array1::zeros(x.nrows())))
        }
    }

    struct AlwaysNonusable;

    impl Checker for AlwaysNonusable {
        fn check(&self, _learnware: &Learnware) -> CheckVerdict {
            CheckVerdict::Nonusable {
                reason: "pending verification".to_string(),
            }
        }
    }

    struct AlwaysUsable;

    impl Checker for AlwaysUsable {
        fn check(&self, _learnware: &Learnware) -> CheckVerdict {
            CheckVerdict::Usable
        }
    }

    fn fingerprinted_spec(offset: f64) -> Specification {
        let data = Array2::from_shape_fn((20, 2), |(i, j)| offset + (i * 2 + j) as f64 * 0.01);
        let rkme: Arc<dyn StatSpec> =
            Arc::new(RkmeSpec::from_data(&data.view(), 0.1).unwrap());
        Specification::new(SemanticSpec::default()).with_stat_spec(rkme)
    }

    fn anchored(checker: Arc<dyn Checker>) -> AnchoredOrganizer {
        AnchoredOrganizer::new(EasyOrganizer::new(
            Arc::new(InMemoryStore::new()),
            checker,
            Arc::new(ModelRegistry::new()),
        ))
    }

    #[tokio::test]
    async fn test_promotion_makes_held_entry_searchable() {
        let organizer = anchored(Arc::new(AlwaysNonusable));
        let outcome = organizer
            .add(ModelRef::instance(StubModel), fingerprinted_spec(0.0))
            .await
            .unwrap();
        assert!(organizer.snapshot().await.is_empty());

        organizer.promote(&outcome.id).await.unwrap();
        assert_eq!(organizer.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_promotion_survives_a_reload() {
        let store = Arc::new(InMemoryStore::new());
        let organizer = AnchoredOrganizer::new(EasyOrganizer::new(
            store,
            Arc::new(AlwaysNonusable),
            Arc::new(ModelRegistry::new()),
        ));
        let outcome = organizer
            .add(ModelRef::instance(StubModel), fingerprinted_spec(0.0))
            .await
            .unwrap();
        organizer.promote(&outcome.id).await.unwrap();
        assert_eq!(organizer.snapshot().await.len(), 1);

        organizer.reload().await.unwrap();
        assert_eq!(organizer.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_evolved_fingerprints_survive_a_reload() {
        let store = Arc::new(InMemoryStore::new());
        let organizer = EvolvedAnchoredOrganizer::new(AnchoredOrganizer::new(
            EasyOrganizer::new(
                store,
                Arc::new(AlwaysUsable),
                Arc::new(ModelRegistry::new()),
            ),
        ));
        let outcome = organizer
            .add(ModelRef::instance(StubModel), fingerprinted_spec(0.0))
            .await
            .unwrap();
        organizer
            .anchored()
            .update_anchors(&[outcome.id.clone()])
            .await
            .unwrap();

        let builder = RkmeBuilder::new(0.1);
        organizer
            .evolve_anchors(&builder, |_| Some(Array2::from_elem((50, 2), 1.5)))
            .await
            .unwrap();
        let evolved_count = organizer
            .get(&outcome.id)
            .await
            .unwrap()
            .stat_spec(RKME_KIND)
            .unwrap()
            .sample_count();

        organizer.reload().await.unwrap();
        let restored = organizer
            .get(&outcome.id)
            .await
            .unwrap()
            .stat_spec(RKME_KIND)
            .unwrap();
        assert_eq!(restored.sample_count(), evolved_count);
    }

    #[tokio::test]
    async fn test_calibration_distances_follow_anchor_proximity() {
        let organizer = anchored(Arc::new(AlwaysUsable));
        let near = organizer
            .add(ModelRef::instance(StubModel), fingerprinted_spec(0.0))
            .await
            .unwrap();
        let far = organizer
            .add(ModelRef::instance(StubModel), fingerprinted_spec(25.0))
            .await
            .unwrap();
        let newcomer = organizer
            .add(ModelRef::instance(StubModel), fingerprinted_spec(0.1))
            .await
            .unwrap();

        organizer
            .update_anchors(&[near.id.clone(), far.id.clone()])
            .await
            .unwrap();
        let distances = organizer
            .calibration_distances(&newcomer.id, RKME_KIND)
            .await
            .unwrap();
        assert_eq!(distances.len(), 2);
        assert!(distances[0] < distances[1]);
    }

    #[tokio::test]
    async fn test_unknown_anchor_id_rejected() {
        let organizer = anchored(Arc::new(AlwaysUsable));
        let err = organizer
            .update_anchors(&["12345678".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_evolve_rederives_fingerprints_in_place() {
        let organizer = EvolvedAnchoredOrganizer::new(anchored(Arc::new(AlwaysUsable)));
        let outcome = organizer
            .add(ModelRef::instance(StubModel), fingerprinted_spec(0.0))
            .await
            .unwrap();
        organizer
            .anchored()
            .update_anchors(&[outcome.id.clone()])
            .await
            .unwrap();

        let before = organizer
            .get(&outcome.id)
            .await
            .unwrap()
            .stat_spec(RKME_KIND)
            .unwrap()
            .sample_count();

        let builder = RkmeBuilder::new(0.1);
        let refreshed = organizer
            .evolve_anchors(&builder, |_| Some(Array2::from_elem((50, 2), 1.5)))
            .await
            .unwrap();
        assert_eq!(refreshed, 1);

        let learnware = organizer.get(&outcome.id).await.unwrap();
        let after = learnware.stat_spec(RKME_KIND).unwrap();
        assert_ne!(after.sample_count(), before);
        // Identity and semantics are untouched.
        assert_eq!(learnware.id(), outcome.id);
        assert!(learnware.semantic_spec().is_empty());
    }
}
