use std::collections::BTreeMap;

use crate::distribution::DistributionIndex;
use crate::labels::LabelValue;
use crate::types::SampleId;

/// Aggregate skew metrics for the label counts of one partition.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelSkew {
    pub total: usize,
    pub labels: usize,
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    pub max_share: f64,
    pub min_share: f64,
    pub ratio: f64,
    /// Largest absolute gap between a label's share and its corpus share.
    pub max_drift: f64,
    pub per_label: Vec<LabelShare>,
}

/// Per-label share of a partition next to the label's corpus share.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelShare {
    pub label: LabelValue,
    pub count: usize,
    pub share: f64,
    pub expected_share: f64,
}

impl LabelShare {
    /// Absolute gap between observed and corpus share.
    pub fn drift(&self) -> f64 {
        (self.share - self.expected_share).abs()
    }
}

/// Compute skew metrics for `ids` against the label profile of `index`.
///
/// Identifiers missing from `index` are ignored. Every label of the index is
/// reported, including labels the partition never drew.
pub fn label_skew<'a, I>(index: &DistributionIndex, ids: I) -> Option<LabelSkew>
where
    I: IntoIterator<Item = &'a SampleId>,
{
    let distribution = index.distribution();
    if distribution.is_empty() {
        return None;
    }
    let mut counts: BTreeMap<LabelValue, usize> =
        distribution.iter().map(|(label, _)| (label, 0)).collect();
    for id in ids {
        if let Some(label) = index.label_of(id) {
            *counts.entry(label).or_insert(0) += 1;
        }
    }

    let total: usize = counts.values().sum();
    let labels = counts.len();
    let min = counts.values().copied().min().unwrap_or(0);
    let max = counts.values().copied().max().unwrap_or(0);
    let share_of = |count: usize| {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    };
    let ratio = if min == 0 {
        f64::INFINITY
    } else {
        max as f64 / min as f64
    };
    let mut per_label: Vec<LabelShare> = counts
        .iter()
        .map(|(label, count)| LabelShare {
            label: *label,
            count: *count,
            share: share_of(*count),
            expected_share: distribution.proportion(*label),
        })
        .collect();
    per_label.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    let max_drift = per_label
        .iter()
        .map(LabelShare::drift)
        .fold(0.0, f64::max);
    Some(LabelSkew {
        total,
        labels,
        min,
        max,
        mean: total as f64 / labels as f64,
        max_share: share_of(max),
        min_share: share_of(min),
        ratio,
        max_drift,
        per_label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn index() -> DistributionIndex {
        let mut labels = HashMap::new();
        for idx in 0..6 {
            labels.insert(format!("a{idx}"), LabelValue::bin(1));
        }
        for idx in 0..2 {
            labels.insert(format!("b{idx}"), LabelValue::bin(2));
        }
        DistributionIndex::from_labels(labels)
    }

    #[test]
    fn label_skew_reports_counts_shares_and_drift() {
        let index = index();
        let ids: Vec<SampleId> = ["a0", "a1", "b0", "b1", "missing"]
            .iter()
            .map(|id| id.to_string())
            .collect();
        let skew = label_skew(&index, &ids).unwrap();
        assert_eq!(skew.total, 4);
        assert_eq!(skew.labels, 2);
        assert_eq!(skew.min, 2);
        assert_eq!(skew.max, 2);
        assert_eq!(skew.ratio, 1.0);
        assert!((skew.max_drift - 0.25).abs() < 1e-12);
        assert_eq!(skew.per_label[0].label, LabelValue::bin(1));
        assert_eq!(skew.per_label[0].expected_share, 0.75);
    }

    #[test]
    fn label_skew_counts_undrawn_labels() {
        let index = index();
        let ids = vec!["a3".to_string()];
        let skew = label_skew(&index, &ids).unwrap();
        assert_eq!(skew.min, 0);
        assert!(skew.ratio.is_infinite());
        assert_eq!(skew.per_label[1].count, 0);
        assert_eq!(skew.min_share, 0.0);
    }

    #[test]
    fn label_skew_empty_index_is_none() {
        let ids: Vec<SampleId> = Vec::new();
        assert!(label_skew(&DistributionIndex::default(), &ids).is_none());
    }
}
