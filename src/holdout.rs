use std::collections::HashSet;
use tracing::info;

use crate::constants::sampling::TEST_SET_TARGET;
use crate::corpus::{CorpusStore, PartitionFilter};
use crate::distribution::DistributionIndex;
use crate::errors::PartitionError;
use crate::labels::{LabelTransform, PredictionLabel};
use crate::pool::SamplePool;
use crate::sampler::{DrawKind, QuotaSampler};
use crate::types::{GroupId, SampleId};

/// Which samples the test set is drawn from.
#[derive(Clone, Debug, PartialEq)]
pub struct TestSetRequest {
    /// Groups queried for test candidates.
    pub groups: Vec<GroupId>,
    /// Partition filter for the test query.
    pub partition: PartitionFilter,
    /// Transform applied to test labels.
    pub label_transform: LabelTransform,
    /// Target number of test samples.
    pub size: usize,
}

/// Held-out identifiers plus the index they were drawn against.
#[derive(Clone, Debug)]
pub struct TestSet {
    ids: Vec<SampleId>,
    index: DistributionIndex,
}

impl TestSet {
    /// Drawn identifiers in draw order.
    pub fn ids(&self) -> &[SampleId] {
        &self.ids
    }

    /// Number of held-out samples.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nothing was held out.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Index over every test candidate.
    pub fn index(&self) -> &DistributionIndex {
        &self.index
    }

    /// Identifiers as a set, for removal from a training pool.
    pub fn id_set(&self) -> HashSet<&SampleId> {
        self.ids.iter().collect()
    }

    /// Split into identifiers and index.
    pub fn into_parts(self) -> (Vec<SampleId>, DistributionIndex) {
        (self.ids, self.index)
    }
}

/// Builds the single held-out test set.
pub struct TestSetBuilder<'a> {
    corpus: &'a dyn CorpusStore,
    sampler: &'a QuotaSampler,
    label: PredictionLabel,
    limit: usize,
    batch_size: usize,
}

impl<'a> TestSetBuilder<'a> {
    /// Builder querying `corpus` for `label` with the given query bounds.
    pub fn new(
        corpus: &'a dyn CorpusStore,
        sampler: &'a QuotaSampler,
        label: PredictionLabel,
        limit: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            corpus,
            sampler,
            label,
            limit,
            batch_size,
        }
    }

    /// Index the test candidates and draw one test-set pass over them.
    pub fn build(&self, request: &TestSetRequest) -> Result<TestSet, PartitionError> {
        if request.size == 0 {
            return Err(PartitionError::Configuration(format!(
                "{TEST_SET_TARGET} size must be positive"
            )));
        }
        let index = DistributionIndex::build(
            self.corpus,
            &request.groups,
            request.partition,
            self.label,
            &request.label_transform,
            self.limit,
            self.batch_size,
        )?;
        let mut pool = SamplePool::from_index(&index);
        let ids = self.sampler.draw(
            &mut pool,
            index.distribution(),
            request.size,
            DrawKind::TestSet,
        )?;
        info!(
            groups = %request.groups.join(", "),
            partition = %request.partition,
            requested = request.size,
            drawn = ids.len(),
            candidates = index.len(),
            "test set drawn"
        );
        Ok(TestSet { ids, index })
    }
}
