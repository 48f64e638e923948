use std::io;

use thiserror::Error;

use crate::types::{CorpusId, GroupId, SampleId};

/// Error type for partition configuration, corpus IO, and sampling failures.
#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("unrecognized group(s): {}", .groups.join(", "))]
    UnknownGroups { groups: Vec<GroupId> },
    #[error("invalid bin ranges: {0}")]
    InvalidBinRanges(String),
    #[error("label value {value} falls outside the declared bin ranges")]
    LabelOutOfRange { value: f64 },
    #[error("label '{label}' of sample '{sample_id}' is not numeric")]
    NonNumericLabel { sample_id: SampleId, label: String },
    #[error("{transform} transform of label value {value} is undefined")]
    UndefinedTransform { value: f64, transform: String },
    #[error("no usable samples for group(s) [{}] in partition '{partition}'", .groups.join(", "))]
    EmptyResult {
        groups: Vec<GroupId>,
        partition: String,
    },
    #[error("infeasible {target}: {details}")]
    InfeasibleSampling { target: String, details: String },
    #[error("{dataset} dataset incomplete: {collected} of {requested} folds generated")]
    IncompleteDataset {
        dataset: String,
        collected: usize,
        requested: usize,
    },
    #[error("corpus '{corpus_id}' is unavailable: {reason}")]
    CorpusUnavailable { corpus_id: CorpusId, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
