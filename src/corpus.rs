//! Corpus store interface and an in-memory implementation.
//!
//! Ownership model:
//! - `CorpusStore` is the partitioner-facing interface. It knows the valid
//!   group enumeration and answers group/partition-filtered queries one
//!   bounded page at a time.
//! - `InMemoryCorpus` holds documents in memory and pages over them with an
//!   offset cursor. It backs tests and the JSON-lines demo.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::constants::corpus::JSONL_CORPUS_ID;
use crate::errors::PartitionError;
use crate::types::{CorpusId, GroupId, SampleId};

/// Partition tag stored on each corpus document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    /// Document reserved for training.
    Training,
    /// Document reserved for evaluation.
    Test,
}

/// Partition filter applied to corpus queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionFilter {
    /// Only `training` documents.
    Training,
    /// Only `test` documents.
    Test,
    /// No partition filter.
    #[default]
    All,
}

impl PartitionFilter {
    /// Whether a document tagged `partition` passes the filter.
    pub fn matches(self, partition: Option<Partition>) -> bool {
        match self {
            PartitionFilter::All => true,
            PartitionFilter::Training => partition == Some(Partition::Training),
            PartitionFilter::Test => partition == Some(Partition::Test),
        }
    }
}

impl fmt::Display for PartitionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PartitionFilter::Training => "training",
            PartitionFilter::Test => "test",
            PartitionFilter::All => "all",
        })
    }
}

impl FromStr for PartitionFilter {
    type Err = PartitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "train" | "training" => Ok(PartitionFilter::Training),
            "test" => Ok(PartitionFilter::Test),
            "all" => Ok(PartitionFilter::All),
            other => Err(PartitionError::Configuration(format!(
                "unrecognized partition '{other}' (expected training, test, or all)"
            ))),
        }
    }
}

/// One corpus entry as seen by the partitioner.
///
/// Label fields live at the top level of `fields`; some labels also appear in
/// a nested sub-document (see `PredictionLabel::nested_fallback`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleDocument {
    /// Stable sample identifier.
    pub id: SampleId,
    /// Group (game) the sample belongs to.
    pub group: GroupId,
    /// Partition tag, if the corpus assigns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<Partition>,
    /// Remaining document fields, including label values.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Group/partition-filtered query over the corpus.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleQuery {
    /// Groups whose documents are returned.
    pub groups: Vec<GroupId>,
    /// Partition filter.
    pub partition: PartitionFilter,
    /// Maximum number of documents returned across all pages.
    pub limit: Option<usize>,
}

impl SampleQuery {
    fn matches(&self, document: &SampleDocument) -> bool {
        self.partition.matches(document.partition)
            && self.groups.iter().any(|group| *group == document.group)
    }
}

/// Opaque paging position returned by [`CorpusStore::fetch`].
///
/// Pass it back unchanged to continue the same query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CorpusCursor {
    /// Store-defined scan position.
    pub offset: u64,
    /// Documents returned so far for the query.
    pub returned: u64,
}

/// One page of query results.
#[derive(Clone, Debug, Default)]
pub struct CorpusPage {
    /// Documents in this page (at most the requested batch size).
    pub documents: Vec<SampleDocument>,
    /// Cursor for the next page, `None` once the query is exhausted.
    pub next: Option<CorpusCursor>,
}

/// Partitioner-facing corpus interface.
///
/// For a fixed corpus state, paging through a query must be deterministic.
pub trait CorpusStore: Send + Sync {
    /// Stable corpus identifier used in logs and errors.
    fn id(&self) -> &str;

    /// The full enumeration of valid group identifiers.
    fn groups(&self) -> &BTreeSet<GroupId>;

    /// Fetch up to `batch_size` documents matching `query`, starting at `cursor`.
    fn fetch(
        &self,
        query: &SampleQuery,
        cursor: Option<&CorpusCursor>,
        batch_size: usize,
    ) -> Result<CorpusPage, PartitionError>;
}

/// Fail with `UnknownGroups` unless every group is part of the corpus enumeration.
pub fn ensure_known_groups<'a, I>(corpus: &dyn CorpusStore, groups: I) -> Result<(), PartitionError>
where
    I: IntoIterator<Item = &'a GroupId>,
{
    let known = corpus.groups();
    let mut unknown: Vec<GroupId> = groups
        .into_iter()
        .filter(|group| !known.contains(*group))
        .cloned()
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    unknown.sort();
    unknown.dedup();
    Err(PartitionError::UnknownGroups { groups: unknown })
}

/// In-memory corpus built from prebuilt documents.
#[derive(Clone, Debug)]
pub struct InMemoryCorpus {
    id: CorpusId,
    groups: BTreeSet<GroupId>,
    documents: Arc<Vec<SampleDocument>>,
}

impl InMemoryCorpus {
    /// Create a corpus whose valid groups are those present in `documents`.
    pub fn new(id: impl Into<CorpusId>, documents: Vec<SampleDocument>) -> Self {
        let groups = documents
            .iter()
            .map(|document| document.group.clone())
            .collect();
        Self {
            id: id.into(),
            groups,
            documents: Arc::new(documents),
        }
    }

    /// Declare additional valid groups (for example groups with no documents yet).
    pub fn with_groups<I, G>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<GroupId>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    /// Load one JSON-encoded [`SampleDocument`] per line; blank lines are skipped.
    pub fn from_jsonl_path(path: impl AsRef<Path>) -> Result<Self, PartitionError> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut documents = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            documents.push(serde_json::from_str::<SampleDocument>(&line)?);
        }
        let id = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| JSONL_CORPUS_ID.to_string());
        Ok(Self::new(id, documents))
    }

    /// Total number of documents, regardless of filters.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the corpus holds no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl CorpusStore for InMemoryCorpus {
    fn id(&self) -> &str {
        &self.id
    }

    fn groups(&self) -> &BTreeSet<GroupId> {
        &self.groups
    }

    fn fetch(
        &self,
        query: &SampleQuery,
        cursor: Option<&CorpusCursor>,
        batch_size: usize,
    ) -> Result<CorpusPage, PartitionError> {
        if batch_size == 0 {
            return Err(PartitionError::Configuration(
                "corpus batch size must be at least 1".into(),
            ));
        }
        let mut position = cursor.cloned().unwrap_or_default();
        let remaining = query
            .limit
            .map(|limit| limit.saturating_sub(position.returned as usize))
            .unwrap_or(usize::MAX);
        let max = batch_size.min(remaining);

        let documents = &*self.documents;
        let mut page = Vec::new();
        let mut offset = position.offset as usize;
        while offset < documents.len() && page.len() < max {
            let document = &documents[offset];
            offset += 1;
            if query.matches(document) {
                page.push(document.clone());
            }
        }
        position.offset = offset as u64;
        position.returned += page.len() as u64;

        let limit_reached = query
            .limit
            .is_some_and(|limit| position.returned as usize >= limit);
        let next = if offset >= documents.len() || limit_reached {
            None
        } else {
            Some(position)
        };
        Ok(CorpusPage {
            documents: page,
            next,
        })
    }
}
