use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::distribution::LabelDistribution;
use crate::errors::PartitionError;
use crate::pool::SamplePool;
use crate::sampler::{DrawKind, QuotaSampler};
use crate::types::{DatasetName, SampleId};

/// Identifiers drawn together in one sampling pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    ids: Vec<SampleId>,
}

impl Fold {
    /// Wrap drawn identifiers.
    pub fn new(ids: Vec<SampleId>) -> Self {
        Self { ids }
    }

    /// Identifiers in draw order.
    pub fn ids(&self) -> &[SampleId] {
        &self.ids
    }

    /// Number of identifiers.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the fold holds nothing.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Consume the fold into its identifiers.
    pub fn into_ids(self) -> Vec<SampleId> {
        self.ids
    }
}

/// Named, ordered collection of folds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Dataset name used in logs and errors.
    pub name: DatasetName,
    /// Folds in generation order.
    pub folds: Vec<Fold>,
    /// Number of folds that were requested.
    pub requested: usize,
}

impl Dataset {
    /// Number of collected folds.
    pub fn len(&self) -> usize {
        self.folds.len()
    }

    /// Whether no fold was collected.
    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }

    /// Total identifiers across all folds.
    pub fn sample_count(&self) -> usize {
        self.folds.iter().map(Fold::len).sum()
    }

    /// Every identifier across all folds, in generation order.
    pub fn ids(&self) -> impl Iterator<Item = &SampleId> + '_ {
        self.folds.iter().flat_map(|fold| fold.ids().iter())
    }
}

/// Repeatedly draws folds from a pool until enough folds are collected.
#[derive(Clone, Debug)]
pub struct FoldGenerator<'a> {
    sampler: &'a QuotaSampler,
    name: DatasetName,
    n_folds: usize,
    fold_size: usize,
}

impl<'a> FoldGenerator<'a> {
    /// Generator for `n_folds` folds of `fold_size` each.
    pub fn new(
        sampler: &'a QuotaSampler,
        name: impl Into<DatasetName>,
        n_folds: usize,
        fold_size: usize,
    ) -> Self {
        Self {
            sampler,
            name: name.into(),
            n_folds,
            fold_size,
        }
    }

    /// Draw folds from `pool`, stopping at the first empty fold.
    ///
    /// The dataset is accepted only if at least `min_fold_completion` of the
    /// requested folds were collected.
    pub fn generate(
        &self,
        pool: &mut SamplePool,
        distribution: &LabelDistribution,
    ) -> Result<Dataset, PartitionError> {
        let mut folds = Vec::with_capacity(self.n_folds);
        while folds.len() < self.n_folds {
            let ids = self.sampler.draw(
                pool,
                distribution,
                self.fold_size,
                DrawKind::Fold {
                    collected: folds.len(),
                },
            )?;
            if ids.is_empty() {
                debug!(
                    dataset = %self.name,
                    collected = folds.len(),
                    requested = self.n_folds,
                    "empty fold; stopping early"
                );
                break;
            }
            debug!(
                dataset = %self.name,
                fold = folds.len() + 1,
                size = ids.len(),
                remaining = pool.len(),
                "fold collected"
            );
            folds.push(Fold::new(ids));
        }

        let collected = folds.len();
        let required = self.sampler.policy().min_fold_completion * self.n_folds as f64;
        if (collected as f64) < required {
            warn!(
                dataset = %self.name,
                collected,
                requested = self.n_folds,
                "too few folds collected"
            );
            return Err(PartitionError::IncompleteDataset {
                dataset: self.name.clone(),
                collected,
                requested: self.n_folds,
            });
        }
        if self.n_folds > 0 {
            info!(
                dataset = %self.name,
                collected,
                requested = self.n_folds,
                samples = folds.iter().map(Fold::len).sum::<usize>(),
                "dataset generated"
            );
        }
        Ok(Dataset {
            name: self.name.clone(),
            folds,
            requested: self.n_folds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DegradationPolicy;
    use crate::labels::LabelValue;
    use crate::sampler::SamplingMode;
    use std::collections::HashSet;

    fn setup(per_label: usize) -> (SamplePool, LabelDistribution) {
        let samples: Vec<(SampleId, LabelValue)> = (1..=2)
            .flat_map(|label| {
                (0..per_label).map(move |idx| (format!("s{label}-{idx:03}"), LabelValue::bin(label)))
            })
            .collect();
        let distribution = LabelDistribution::from_labels(samples.iter().map(|(_, label)| *label));
        (SamplePool::from_labels(samples), distribution)
    }

    fn sampler() -> QuotaSampler {
        QuotaSampler::new(SamplingMode::Even, DegradationPolicy::default(), 42)
    }

    #[test]
    fn collects_requested_disjoint_folds() {
        let (mut pool, distribution) = setup(20);
        let sampler = sampler();
        let dataset = FoldGenerator::new(&sampler, "training", 4, 10)
            .generate(&mut pool, &distribution)
            .unwrap();
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.sample_count(), 40);
        let unique: HashSet<&SampleId> = dataset.ids().collect();
        assert_eq!(unique.len(), 40);
        assert!(dataset.folds.iter().all(|fold| fold.len() == 10));
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn exactly_three_quarters_of_folds_is_enough() {
        // 30 per label supports three folds of 20.
        let (mut pool, distribution) = setup(30);
        let sampler = sampler();
        let dataset = FoldGenerator::new(&sampler, "training", 4, 20)
            .generate(&mut pool, &distribution)
            .unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.requested, 4);
    }

    #[test]
    fn fewer_than_three_quarters_fails() {
        let (mut pool, distribution) = setup(20);
        let sampler = sampler();
        let err = FoldGenerator::new(&sampler, "grid_search", 4, 20)
            .generate(&mut pool, &distribution)
            .unwrap_err();
        assert!(matches!(
            err,
            PartitionError::IncompleteDataset { ref dataset, collected: 2, requested: 4 }
                if dataset == "grid_search"
        ));
    }

    #[test]
    fn zero_folds_yield_an_empty_dataset() {
        let (mut pool, distribution) = setup(5);
        let sampler = sampler();
        let dataset = FoldGenerator::new(&sampler, "grid_search", 0, 10)
            .generate(&mut pool, &distribution)
            .unwrap();
        assert!(dataset.is_empty());
        assert_eq!(pool.len(), 10);
    }
}
