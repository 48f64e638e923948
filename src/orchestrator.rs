//! End-to-end partition run.
//!
//! `DatasetOrchestrator::new` validates and resolves a [`PartitionConfig`]
//! against a corpus. `build` then runs the partition once:
//!
//! 1. draw the test set (when `test_size > 0`);
//! 2. index the training candidates, reusing the test index when both
//!    queries are identical;
//! 3. remove the test identifiers from the training pool;
//! 4. generate the training folds, then the grid-search folds, from the same
//!    shrinking pool.
//!
//! `build` consumes the orchestrator, so each run owns exactly one pool.

use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::bins::BinRanges;
use crate::config::PartitionConfig;
use crate::constants::sampling::{GRID_SEARCH_DATASET, TRAINING_DATASET};
use crate::corpus::{CorpusStore, PartitionFilter, ensure_known_groups};
use crate::distribution::{DistributionIndex, derive_bin_ranges};
use crate::errors::PartitionError;
use crate::folds::{Dataset, FoldGenerator};
use crate::holdout::{TestSetBuilder, TestSetRequest};
use crate::labels::LabelTransform;
use crate::pool::SamplePool;
use crate::sampler::QuotaSampler;
use crate::types::{GroupId, SampleId};

/// Output of one partition run.
#[derive(Clone, Debug)]
pub struct PartitionedDataset {
    /// Training folds.
    pub training: Dataset,
    /// Grid-search folds.
    pub grid_search: Dataset,
    /// Held-out test identifiers (empty when no test set was requested).
    pub test_set: Vec<SampleId>,
    /// Index the training and grid-search folds were drawn against.
    pub index: DistributionIndex,
    /// Separate test index, present only when it could not be reused as `index`.
    pub test_index: Option<DistributionIndex>,
}

impl PartitionedDataset {
    /// Index the test set was drawn against.
    pub fn test_distribution_index(&self) -> &DistributionIndex {
        self.test_index.as_ref().unwrap_or(&self.index)
    }

    /// Every partitioned identifier: training, grid search, then test.
    pub fn all_ids(&self) -> impl Iterator<Item = &SampleId> + '_ {
        self.training
            .ids()
            .chain(self.grid_search.ids())
            .chain(self.test_set.iter())
    }
}

/// Validated partition run over one corpus.
pub struct DatasetOrchestrator<'a> {
    corpus: &'a dyn CorpusStore,
    config: PartitionConfig,
    sampler: QuotaSampler,
    test_groups: Vec<GroupId>,
    train_transform: LabelTransform,
    test_transform: LabelTransform,
}

impl<'a> DatasetOrchestrator<'a> {
    /// Validate `config` against `corpus` and resolve its label transforms.
    ///
    /// When `n_bins > 0`, bin ranges are derived from the corpus here.
    pub fn new(corpus: &'a dyn CorpusStore, config: PartitionConfig) -> Result<Self, PartitionError> {
        if config.groups.is_empty() {
            return Err(PartitionError::Configuration(
                "at least one training group is required".into(),
            ));
        }
        let test_groups = config.effective_test_groups().to_vec();
        ensure_known_groups(corpus, config.groups.iter().chain(test_groups.iter()))?;
        config.degradation.validate()?;
        if config.cursor_batch_size < 1 {
            return Err(PartitionError::Configuration(
                "cursor batch size must be at least 1".into(),
            ));
        }
        check_fold_request(TRAINING_DATASET, config.n_folds, config.fold_size)?;
        check_fold_request(
            GRID_SEARCH_DATASET,
            config.n_grid_search_folds,
            config.grid_search_fold_size,
        )?;

        let mut train_transform = config.transform.resolve()?;
        let same_groups = same_group_set(&config.groups, &test_groups);
        if config.test_bin_ranges.is_some() && config.transform.bin_ranges.is_none() {
            return Err(PartitionError::Configuration(
                "test bin ranges require training bin ranges".into(),
            ));
        }
        if !same_groups {
            if config.test_size == 0 {
                return Err(PartitionError::Configuration(
                    "a positive test size is required when test groups differ from training groups"
                        .into(),
                ));
            }
            if let Some(train_bins) = &config.transform.bin_ranges {
                let test_len = config.test_bin_ranges.as_ref().map(BinRanges::len);
                if test_len != Some(train_bins.len()) {
                    return Err(PartitionError::Configuration(format!(
                        "test bin ranges with {} bins are required when test groups differ",
                        train_bins.len()
                    )));
                }
            }
        }
        let mut test_transform = match &config.test_bin_ranges {
            Some(bins) => LabelTransform::Binned(bins.clone()),
            None => train_transform.clone(),
        };

        if config.n_bins > 0 {
            if train_transform != LabelTransform::Identity {
                return Err(PartitionError::Configuration(
                    "derived bins cannot be combined with explicit bins, lognormal, or power transforms"
                        .into(),
                ));
            }
            let factor = config.bin_factor.unwrap_or(1.0);
            let train_bins = derive_bin_ranges(
                corpus,
                &config.groups,
                config.train_partition,
                config.label,
                config.n_bins,
                factor,
                config.cursor_batch_size,
            )?;
            let test_bins = if same_groups {
                train_bins.clone()
            } else {
                derive_bin_ranges(
                    corpus,
                    &test_groups,
                    config.test_partition,
                    config.label,
                    config.n_bins,
                    factor,
                    config.cursor_batch_size,
                )?
            };
            train_transform = LabelTransform::Binned(train_bins);
            test_transform = LabelTransform::Binned(test_bins);
        } else if config.bin_factor.is_some() {
            return Err(PartitionError::Configuration(
                "bin_factor requires n_bins > 0".into(),
            ));
        }

        let sampler = QuotaSampler::new(config.sampling, config.degradation, config.seed);
        debug!(
            corpus_id = %corpus.id(),
            groups = %config.groups.join(", "),
            test_groups = %test_groups.join(", "),
            label = %config.label,
            sampling = %config.sampling,
            train_transform = %train_transform.name(),
            test_transform = %test_transform.name(),
            "partition run configured"
        );
        Ok(Self {
            corpus,
            config,
            sampler,
            test_groups,
            train_transform,
            test_transform,
        })
    }

    /// Resolved configuration.
    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Transform applied to training labels.
    pub fn train_transform(&self) -> &LabelTransform {
        &self.train_transform
    }

    /// Transform applied to test labels.
    pub fn test_transform(&self) -> &LabelTransform {
        &self.test_transform
    }

    /// Run the partition.
    pub fn build(self) -> Result<PartitionedDataset, PartitionError> {
        let config = &self.config;
        let test_set = if config.test_size > 0 {
            let builder = TestSetBuilder::new(
                self.corpus,
                &self.sampler,
                config.label,
                config.limit,
                config.cursor_batch_size,
            );
            Some(builder.build(&TestSetRequest {
                groups: self.test_groups.clone(),
                partition: config.test_partition,
                label_transform: self.test_transform.clone(),
                size: config.test_size,
            })?)
        } else {
            None
        };

        let reusable = same_group_set(&config.groups, &self.test_groups)
            && config.train_partition == config.test_partition
            && self.train_transform == self.test_transform;
        let (test_ids, index, test_index) = match test_set.map(|set| set.into_parts()) {
            Some((ids, test_index)) if reusable => {
                debug!(groups = %config.groups.join(", "), "reusing test index for training");
                (ids, test_index, None)
            }
            Some((ids, test_index)) => (ids, self.training_index(config.train_partition)?, Some(test_index)),
            None => (Vec::new(), self.training_index(config.train_partition)?, None),
        };

        let mut pool = SamplePool::from_index(&index);
        let removed = pool.remove(&test_ids);
        debug!(
            removed,
            remaining = pool.len(),
            "test samples removed from training pool"
        );

        let training = FoldGenerator::new(
            &self.sampler,
            TRAINING_DATASET,
            config.n_folds,
            config.fold_size,
        )
        .generate(&mut pool, index.distribution())?;
        let grid_search = FoldGenerator::new(
            &self.sampler,
            GRID_SEARCH_DATASET,
            config.n_grid_search_folds,
            config.grid_search_fold_size,
        )
        .generate(&mut pool, index.distribution())?;

        info!(
            training_folds = training.len(),
            grid_search_folds = grid_search.len(),
            test_samples = test_ids.len(),
            unused = pool.len(),
            "partition complete"
        );
        Ok(PartitionedDataset {
            training,
            grid_search,
            test_set: test_ids,
            index,
            test_index,
        })
    }

    fn training_index(&self, partition: PartitionFilter) -> Result<DistributionIndex, PartitionError> {
        DistributionIndex::build(
            self.corpus,
            &self.config.groups,
            partition,
            self.config.label,
            &self.train_transform,
            self.config.limit,
            self.config.cursor_batch_size,
        )
    }
}

fn check_fold_request(dataset: &str, n_folds: usize, fold_size: usize) -> Result<(), PartitionError> {
    if n_folds > 0 && fold_size == 0 {
        return Err(PartitionError::Configuration(format!(
            "{dataset} fold size must be positive when folds are requested"
        )));
    }
    Ok(())
}

fn same_group_set(left: &[GroupId], right: &[GroupId]) -> bool {
    left.iter().collect::<BTreeSet<_>>() == right.iter().collect::<BTreeSet<_>>()
}
