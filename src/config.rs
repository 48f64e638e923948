use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::bins::BinRanges;
use crate::constants::corpus::DEFAULT_CURSOR_BATCH_SIZE;
use crate::constants::sampling::{
    DEFAULT_SEED, FOLD_MAX_SHRINK, MIN_FOLD_COMPLETION, TEST_SET_MAX_SHRINK,
};
use crate::corpus::PartitionFilter;
use crate::errors::PartitionError;
use crate::labels::{PredictionLabel, TransformOptions};
use crate::sampler::SamplingMode;
use crate::types::GroupId;

/// Limits on how far a draw may fall short of its target.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationPolicy {
    /// Largest shrink (`1 - factor`) allowed for the test-set draw.
    pub test_set_max_shrink: f64,
    /// Largest shrink allowed for a fold draw.
    pub fold_max_shrink: f64,
    /// Share of requested folds a dataset needs to be accepted.
    pub min_fold_completion: f64,
}

impl Default for DegradationPolicy {
    fn default() -> Self {
        Self {
            test_set_max_shrink: TEST_SET_MAX_SHRINK,
            fold_max_shrink: FOLD_MAX_SHRINK,
            min_fold_completion: MIN_FOLD_COMPLETION,
        }
    }
}

impl DegradationPolicy {
    /// Ensure every limit is a share in `[0, 1]`.
    pub fn validate(&self) -> Result<(), PartitionError> {
        let limits = [
            ("test_set_max_shrink", self.test_set_max_shrink),
            ("fold_max_shrink", self.fold_max_shrink),
            ("min_fold_completion", self.min_fold_completion),
        ];
        for (name, value) in limits {
            if !(0.0..=1.0).contains(&value) {
                return Err(PartitionError::Configuration(format!(
                    "{name} must lie in [0, 1], found {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Top-level partition configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Groups the training and grid-search folds are drawn from.
    pub groups: Vec<GroupId>,
    /// Groups the test set is drawn from; empty means `groups`.
    pub test_groups: Vec<GroupId>,
    /// Partition filter for the training query.
    pub train_partition: PartitionFilter,
    /// Partition filter for the test query.
    pub test_partition: PartitionFilter,
    /// Label used as the partitioning key.
    pub label: PredictionLabel,
    /// Label transform for the training query.
    pub transform: TransformOptions,
    /// Bin ranges for the test query; required when groups differ and
    /// `transform.bin_ranges` is set.
    pub test_bin_ranges: Option<BinRanges>,
    /// Derive bin ranges from the corpus with this many bins (0 disables).
    pub n_bins: usize,
    /// Growth factor for derived bin widths; only valid with `n_bins > 0`.
    pub bin_factor: Option<f64>,
    /// Stratified or even sampling.
    pub sampling: SamplingMode,
    /// Number of training folds requested.
    pub n_folds: usize,
    /// Target size of each training fold.
    pub fold_size: usize,
    /// Number of grid-search folds requested.
    pub n_grid_search_folds: usize,
    /// Target size of each grid-search fold.
    pub grid_search_fold_size: usize,
    /// Target test-set size (0 disables the test set).
    pub test_size: usize,
    /// Maximum documents read per corpus query (0 means no limit).
    pub limit: usize,
    /// Cursor batch size for corpus queries.
    pub cursor_batch_size: usize,
    /// Seed used to reseed every shuffle.
    pub seed: u64,
    /// Shrink ceilings and fold completion threshold.
    pub degradation: DegradationPolicy,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            test_groups: Vec::new(),
            train_partition: PartitionFilter::All,
            test_partition: PartitionFilter::All,
            label: PredictionLabel::default(),
            transform: TransformOptions::default(),
            test_bin_ranges: None,
            n_bins: 0,
            bin_factor: None,
            sampling: SamplingMode::default(),
            n_folds: 10,
            fold_size: 100,
            n_grid_search_folds: 5,
            grid_search_fold_size: 50,
            test_size: 0,
            limit: 0,
            cursor_batch_size: DEFAULT_CURSOR_BATCH_SIZE,
            seed: DEFAULT_SEED,
            degradation: DegradationPolicy::default(),
        }
    }
}

impl PartitionConfig {
    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, PartitionError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, PartitionError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Test groups, falling back to the training groups.
    pub fn effective_test_groups(&self) -> &[GroupId] {
        if self.test_groups.is_empty() {
            &self.groups
        } else {
            &self.test_groups
        }
    }
}
