#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Bin range generation, validation, and assignment.
pub mod bins;
/// Partition configuration types.
pub mod config;
/// Centralized constants used across bins, sampling, and corpus queries.
pub mod constants;
/// Corpus store interface and in-memory corpus.
pub mod corpus;
/// Label distributions and the identifier → label index.
pub mod distribution;
/// Reusable example runners shared by downstream crates.
pub mod example_apps;
/// Fold and dataset generation.
pub mod folds;
/// Held-out test set construction.
pub mod holdout;
/// Prediction labels and label transforms.
pub mod labels;
/// Aggregate metrics helpers.
pub mod metrics;
/// End-to-end partition runs.
pub mod orchestrator;
/// Consumable sample pool.
pub mod pool;
/// Quota sampler shared by the test set and folds.
pub mod sampler;
/// Shared type aliases.
pub mod types;

mod errors;

pub use bins::{BinRange, BinRanges};
pub use config::{DegradationPolicy, PartitionConfig};
pub use corpus::{
    CorpusCursor, CorpusPage, CorpusStore, InMemoryCorpus, Partition, PartitionFilter,
    SampleDocument, SampleQuery,
};
pub use distribution::{DistributionIndex, LabelDistribution, derive_bin_ranges};
pub use errors::PartitionError;
pub use folds::{Dataset, Fold, FoldGenerator};
pub use holdout::{TestSet, TestSetBuilder, TestSetRequest};
pub use labels::{LabelKind, LabelTransform, LabelValue, PredictionLabel, TransformOptions};
pub use metrics::{LabelShare, LabelSkew, label_skew};
pub use orchestrator::{DatasetOrchestrator, PartitionedDataset};
pub use pool::SamplePool;
pub use sampler::{DrawKind, QuotaSampler, SamplingMode};
pub use types::{CorpusId, DatasetName, GroupId, SampleId};
