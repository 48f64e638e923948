//! Consumable pool of not-yet-partitioned samples.
//!
//! The pool has a single owner. Every draw takes `&mut SamplePool` and
//! removes what it returns, so identifiers drawn into the test set or a fold
//! can never be drawn again. Sharing one pool between concurrent partition
//! runs is unsupported; wrap it in your own lock if you must.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::distribution::DistributionIndex;
use crate::labels::LabelValue;
use crate::types::SampleId;

/// Surviving identifiers bucketed by label.
#[derive(Clone, Debug, Default)]
pub struct SamplePool {
    labels: HashMap<SampleId, LabelValue>,
    buckets: BTreeMap<LabelValue, BTreeSet<SampleId>>,
}

impl SamplePool {
    /// Fill a pool with every sample of `index`.
    pub fn from_index(index: &DistributionIndex) -> Self {
        Self::from_labels(
            index
                .labels()
                .iter()
                .map(|(id, label)| (id.clone(), *label)),
        )
    }

    /// Fill a pool from `(id, label)` pairs; later duplicates replace earlier ones.
    pub fn from_labels<I>(labels: I) -> Self
    where
        I: IntoIterator<Item = (SampleId, LabelValue)>,
    {
        let mut pool = Self::default();
        for (id, label) in labels {
            pool.remove_one(&id);
            pool.buckets.entry(label).or_default().insert(id.clone());
            pool.labels.insert(id, label);
        }
        pool
    }

    /// Number of surviving samples.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether every sample has been drawn.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Whether `id` is still available.
    pub fn contains(&self, id: &str) -> bool {
        self.labels.contains_key(id)
    }

    /// Label of a surviving sample.
    pub fn label_of(&self, id: &str) -> Option<LabelValue> {
        self.labels.get(id).copied()
    }

    /// Number of surviving samples holding `label`.
    pub fn available(&self, label: LabelValue) -> usize {
        self.buckets.get(&label).map_or(0, BTreeSet::len)
    }

    /// Surviving identifiers holding `label`, sorted ascending.
    pub fn bucket(&self, label: LabelValue) -> Vec<SampleId> {
        self.buckets
            .get(&label)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove `ids` from the pool, returning how many were present.
    pub fn remove<'a, I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = &'a SampleId>,
    {
        ids.into_iter().filter(|id| self.remove_one(id)).count()
    }

    fn remove_one(&mut self, id: &str) -> bool {
        let Some(label) = self.labels.remove(id) else {
            return false;
        };
        if let Some(bucket) = self.buckets.get_mut(&label) {
            bucket.remove(id);
            if bucket.is_empty() {
                self.buckets.remove(&label);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> SamplePool {
        SamplePool::from_labels([
            ("c".to_string(), LabelValue::bin(1)),
            ("a".to_string(), LabelValue::bin(1)),
            ("b".to_string(), LabelValue::bin(2)),
        ])
    }

    #[test]
    fn buckets_are_sorted_per_label() {
        let pool = pool();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.bucket(LabelValue::bin(1)), vec!["a", "c"]);
        assert_eq!(pool.available(LabelValue::bin(2)), 1);
        assert_eq!(pool.available(LabelValue::bin(3)), 0);
        assert!(pool.bucket(LabelValue::bin(3)).is_empty());
    }

    #[test]
    fn removal_is_permanent_and_counted() {
        let mut pool = pool();
        let drawn = vec!["a".to_string(), "b".to_string(), "zzz".to_string()];
        assert_eq!(pool.remove(&drawn), 2);
        assert!(!pool.contains("a"));
        assert_eq!(pool.available(LabelValue::bin(2)), 0);
        assert_eq!(pool.remove(&drawn), 0);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.label_of("c"), Some(LabelValue::bin(1)));
    }

    #[test]
    fn duplicate_ids_keep_the_latest_label() {
        let pool = SamplePool::from_labels([
            ("a".to_string(), LabelValue::bin(1)),
            ("a".to_string(), LabelValue::bin(2)),
        ]);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.available(LabelValue::bin(1)), 0);
        assert_eq!(pool.available(LabelValue::bin(2)), 1);
    }
}
