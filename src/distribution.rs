use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::bins::{BinRanges, generate_with_factor};
use crate::corpus::{CorpusCursor, CorpusStore, PartitionFilter, SampleQuery, ensure_known_groups};
use crate::errors::PartitionError;
use crate::labels::{LabelTransform, LabelValue, PredictionLabel, transform};
use crate::types::{GroupId, SampleId};

/// Label value → sample count over one identifier → label mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelDistribution {
    counts: BTreeMap<LabelValue, usize>,
}

impl LabelDistribution {
    /// Count label occurrences.
    pub fn from_labels<I>(labels: I) -> Self
    where
        I: IntoIterator<Item = LabelValue>,
    {
        let mut counts = BTreeMap::new();
        for label in labels {
            *counts.entry(label).or_insert(0) += 1;
        }
        Self { counts }
    }

    /// Number of samples holding `label`.
    pub fn count(&self, label: LabelValue) -> usize {
        self.counts.get(&label).copied().unwrap_or(0)
    }

    /// Number of samples across all labels.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Number of distinct labels.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether no label has been counted.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Share of samples holding `label`, `0.0` for an empty distribution.
    pub fn proportion(&self, label: LabelValue) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.count(label) as f64 / total as f64
    }

    /// `(label, count)` pairs, rarest first; ties keep ascending label order.
    pub fn labels_by_ascending_frequency(&self) -> Vec<(LabelValue, usize)> {
        let mut ordered: Vec<(LabelValue, usize)> = self.iter().collect();
        ordered.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        ordered
    }

    /// `(label, count)` pairs in ascending label order.
    pub fn iter(&self) -> impl Iterator<Item = (LabelValue, usize)> + '_ {
        self.counts.iter().map(|(label, count)| (*label, *count))
    }
}

/// Snapshot of identifier → label plus its frequency distribution.
///
/// The two halves are always built together so they never disagree.
#[derive(Clone, Debug, Default)]
pub struct DistributionIndex {
    labels: HashMap<SampleId, LabelValue>,
    distribution: LabelDistribution,
}

impl DistributionIndex {
    /// Query `corpus` and index every sample with a usable label.
    ///
    /// `limit == 0` means no limit. Documents are streamed in pages of at
    /// most `batch_size`. Samples whose label is absent are skipped; label
    /// values that cannot be transformed are fatal.
    pub fn build(
        corpus: &dyn CorpusStore,
        groups: &[GroupId],
        partition: PartitionFilter,
        label: PredictionLabel,
        label_transform: &LabelTransform,
        limit: usize,
        batch_size: usize,
    ) -> Result<Self, PartitionError> {
        if batch_size < 1 {
            return Err(PartitionError::Configuration(
                "corpus batch size must be at least 1".into(),
            ));
        }
        if groups.is_empty() {
            return Err(PartitionError::Configuration(
                "at least one group is required to build a distribution".into(),
            ));
        }
        ensure_known_groups(corpus, groups)?;

        let query = SampleQuery {
            groups: groups.to_vec(),
            partition,
            limit: (limit > 0).then_some(limit),
        };
        let batch_size = if limit > 0 { batch_size.min(limit) } else { batch_size };

        let mut labels = HashMap::new();
        let mut fetched = 0usize;
        let mut cursor: Option<CorpusCursor> = None;
        loop {
            let page = corpus.fetch(&query, cursor.as_ref(), batch_size)?;
            for document in page.documents {
                fetched += 1;
                let raw = label.lookup(&document.id, &document.fields)?;
                if let Some(value) = transform(raw, label.kind(), label_transform)? {
                    labels.insert(document.id, value);
                }
            }
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        if labels.is_empty() {
            return Err(PartitionError::EmptyResult {
                groups: groups.to_vec(),
                partition: partition.to_string(),
            });
        }
        let index = Self::from_labels(labels);
        debug!(
            corpus_id = %corpus.id(),
            groups = %groups.join(", "),
            %partition,
            %label,
            transform = %label_transform.name(),
            fetched,
            indexed = index.len(),
            distinct_labels = index.distribution.len(),
            "distribution index built"
        );
        Ok(index)
    }

    /// Build an index from an existing identifier → label mapping.
    pub fn from_labels(labels: HashMap<SampleId, LabelValue>) -> Self {
        let distribution = LabelDistribution::from_labels(labels.values().copied());
        Self {
            labels,
            distribution,
        }
    }

    /// Identifier → label mapping.
    pub fn labels(&self) -> &HashMap<SampleId, LabelValue> {
        &self.labels
    }

    /// Label frequency distribution.
    pub fn distribution(&self) -> &LabelDistribution {
        &self.distribution
    }

    /// Label of one sample.
    pub fn label_of(&self, id: &str) -> Option<LabelValue> {
        self.labels.get(id).copied()
    }

    /// Number of indexed samples.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the index holds no samples.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Smallest and largest indexed label values.
    pub fn value_bounds(&self) -> Option<(f64, f64)> {
        let mut labels = self.distribution.iter().map(|(label, _)| label);
        let first = labels.next()?;
        let last = labels.last().unwrap_or(first);
        Some((first.get(), last.get()))
    }
}

/// Derive bin ranges from the observed spread of a label.
///
/// Raw values (after the label kind's scaling) are scanned for their bounds,
/// which are then split into `n_bins` ranges whose widths grow by `factor`.
pub fn derive_bin_ranges(
    corpus: &dyn CorpusStore,
    groups: &[GroupId],
    partition: PartitionFilter,
    label: PredictionLabel,
    n_bins: usize,
    factor: f64,
    batch_size: usize,
) -> Result<BinRanges, PartitionError> {
    let index = DistributionIndex::build(
        corpus,
        groups,
        partition,
        label,
        &LabelTransform::Identity,
        0,
        batch_size,
    )?;
    let (min, max) = index
        .value_bounds()
        .ok_or_else(|| PartitionError::EmptyResult {
            groups: groups.to_vec(),
            partition: partition.to_string(),
        })?;
    let bins = generate_with_factor(min, max, n_bins, factor)?;
    debug!(
        %label,
        min,
        max,
        n_bins,
        factor,
        ranges = ?bins.as_slice(),
        "derived bin ranges"
    );
    Ok(bins)
}
