//! Quota sampling shared by test-set and fold construction.
//!
//! A draw decides how many identifiers each label bucket contributes, pulls
//! them from the pool in a reproducible order, and removes them from the pool.
//!
//! - **Stratified** draws give each label `ceil(proportion * target)` slots.
//!   When some bucket cannot fill its slots, the whole target shrinks by the
//!   worst bucket's fill ratio, bounded by the [`DegradationPolicy`] ceiling.
//! - **Even** draws give each label `ceil(target / labels)` slots, capped for
//!   every label by what the rarest label could supply.
//!
//! Every shuffle reseeds a fresh RNG with the same seed, so identical pool
//! contents always yield identical draws. Successive draws do not share one
//! evolving random stream.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::config::DegradationPolicy;
use crate::constants::sampling::{QUOTA_EPSILON, TEST_SET_TARGET};
use crate::distribution::LabelDistribution;
use crate::errors::PartitionError;
use crate::labels::LabelValue;
use crate::pool::SamplePool;
use crate::types::SampleId;

#[derive(Debug, Clone)]
/// Small deterministic RNG used for reproducible shuffles.
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64_internal(&mut self) -> u64 {
        let mut z = self.state.wrapping_add(0x9E3779B97F4A7C15);
        self.state = z;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }
}

impl rand::RngCore for DeterministicRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64_internal() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_u64_internal()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut offset = 0;
        while offset < dest.len() {
            let value = self.next_u64_internal();
            let bytes = value.to_le_bytes();
            let remaining = dest.len() - offset;
            let copy_len = remaining.min(bytes.len());
            dest[offset..offset + copy_len].copy_from_slice(&bytes[..copy_len]);
            offset += copy_len;
        }
    }
}

/// Shuffle `items` with a freshly seeded RNG.
pub fn seeded_shuffle<T>(items: &mut [T], seed: u64) {
    let mut rng = DeterministicRng::new(seed);
    items.shuffle(&mut rng);
}

fn ceil_quota(value: f64) -> usize {
    (value - QUOTA_EPSILON).ceil().max(0.0) as usize
}

/// How label proportions are treated inside a draw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Preserve the corpus label proportions.
    #[default]
    Stratified,
    /// Flatten label proportions to equal per-label counts.
    Even,
}

impl fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SamplingMode::Stratified => "stratified",
            SamplingMode::Even => "even",
        })
    }
}

impl FromStr for SamplingMode {
    type Err = PartitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "stratified" => Ok(SamplingMode::Stratified),
            "even" => Ok(SamplingMode::Even),
            other => Err(PartitionError::Configuration(format!(
                "unrecognized sampling mode '{other}' (expected even or stratified)"
            ))),
        }
    }
}

/// What a draw is for; selects the shrink ceiling and failure behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawKind {
    /// The single held-out test-set draw.
    TestSet,
    /// One fold of a dataset, with the number of folds already collected.
    Fold {
        /// Non-empty folds already collected for this dataset.
        collected: usize,
    },
}

impl DrawKind {
    fn max_shrink(self, policy: &DegradationPolicy) -> f64 {
        match self {
            DrawKind::TestSet => policy.test_set_max_shrink,
            DrawKind::Fold { .. } => policy.fold_max_shrink,
        }
    }

    fn target_name(self) -> String {
        match self {
            DrawKind::TestSet => TEST_SET_TARGET.to_string(),
            DrawKind::Fold { collected } => format!("fold {}", collected + 1),
        }
    }
}

/// Per-label draw counts, or a signal that the caller should stop.
enum Plan {
    Draw(Vec<(LabelValue, usize)>),
    Stop,
}

/// Stratified/even quota sampler.
#[derive(Clone, Debug)]
pub struct QuotaSampler {
    mode: SamplingMode,
    policy: DegradationPolicy,
    seed: u64,
}

impl QuotaSampler {
    /// Create a sampler with the given mode, ceilings, and shuffle seed.
    pub fn new(mode: SamplingMode, policy: DegradationPolicy, seed: u64) -> Self {
        Self { mode, policy, seed }
    }

    /// Sampling mode.
    pub fn mode(&self) -> SamplingMode {
        self.mode
    }

    /// Degradation ceilings.
    pub fn policy(&self) -> &DegradationPolicy {
        &self.policy
    }

    /// Draw up to `target` identifiers from `pool` and remove them from it.
    ///
    /// Proportions come from `distribution`; availability comes from `pool`.
    /// An empty result asks the caller to stop requesting folds. Shrinks past
    /// the ceiling of `kind` fail with `InfeasibleSampling`.
    pub fn draw(
        &self,
        pool: &mut SamplePool,
        distribution: &LabelDistribution,
        target: usize,
        kind: DrawKind,
    ) -> Result<Vec<SampleId>, PartitionError> {
        if target == 0 || distribution.is_empty() {
            return Ok(Vec::new());
        }
        let order = distribution.labels_by_ascending_frequency();
        let plan = match self.mode {
            SamplingMode::Stratified => self.plan_stratified(pool, &order, target, kind)?,
            SamplingMode::Even => self.plan_even(pool, &order, target, kind)?,
        };
        let Plan::Draw(plan) = plan else {
            return Ok(Vec::new());
        };

        let mut drawn = Vec::with_capacity(target);
        for (label, count) in plan {
            if count == 0 {
                continue;
            }
            let mut bucket = pool.bucket(label);
            seeded_shuffle(&mut bucket, self.seed);
            bucket.truncate(count);
            drawn.extend(bucket);
        }
        drawn.sort();
        seeded_shuffle(&mut drawn, self.seed);
        drawn.truncate(target);

        let removed = pool.remove(&drawn);
        debug_assert_eq!(removed, drawn.len());
        debug!(
            target_name = %kind.target_name(),
            mode = %self.mode,
            requested = target,
            drawn = drawn.len(),
            remaining = pool.len(),
            "quota draw completed"
        );
        Ok(drawn)
    }

    fn plan_stratified(
        &self,
        pool: &SamplePool,
        order: &[(LabelValue, usize)],
        target: usize,
        kind: DrawKind,
    ) -> Result<Plan, PartitionError> {
        let total = order.iter().map(|(_, count)| count).sum::<usize>() as f64;
        let target_f = target as f64;
        let max_shrink = kind.max_shrink(&self.policy);

        let mut factor: f64 = 1.0;
        for (label, frequency) in order {
            let desired = ceil_quota(*frequency as f64 / total * target_f);
            let available = pool.available(*label);
            if desired == 0 || available >= desired {
                continue;
            }
            let shortfall = desired - available;
            factor = factor.min(1.0 - shortfall as f64 / desired as f64);
            let shrink = 1.0 - factor;
            // Rarest buckets come first, so the ceiling check fails fast.
            if shrink > max_shrink + QUOTA_EPSILON {
                return self.over_ceiling(kind, target, shrink, max_shrink, *label);
            }
        }

        let effective = factor * target_f;
        if factor < 1.0 {
            debug!(
                target_name = %kind.target_name(),
                requested = target,
                factor,
                effective_target = effective,
                "shrinking stratified draw"
            );
        }
        let plan = order
            .iter()
            .map(|(label, frequency)| {
                let quota = ceil_quota(*frequency as f64 / total * effective);
                (*label, quota.min(pool.available(*label)))
            })
            .collect();
        Ok(Plan::Draw(plan))
    }

    fn over_ceiling(
        &self,
        kind: DrawKind,
        target: usize,
        shrink: f64,
        max_shrink: f64,
        label: LabelValue,
    ) -> Result<Plan, PartitionError> {
        if kind == (DrawKind::Fold { collected: 0 }) {
            warn!(
                requested = target,
                shrink,
                %label,
                "first fold cannot be filled; returning an empty fold"
            );
            return Ok(Plan::Stop);
        }
        Err(PartitionError::InfeasibleSampling {
            target: kind.target_name(),
            details: format!(
                "label {label} requires shrinking the target of {target} by {:.1}%, above the {:.1}% ceiling",
                shrink * 100.0,
                max_shrink * 100.0
            ),
        })
    }

    fn plan_even(
        &self,
        pool: &SamplePool,
        order: &[(LabelValue, usize)],
        target: usize,
        kind: DrawKind,
    ) -> Result<Plan, PartitionError> {
        let per_label = target.div_ceil(order.len());
        let mut plan = Vec::with_capacity(order.len());
        let mut n_label_min: Option<usize> = None;
        for (label, _) in order {
            let available = pool.available(*label);
            let count = match n_label_min {
                Some(limit) => limit.min(available),
                None => {
                    let first = per_label.min(available);
                    if first == 0 {
                        return match kind {
                            DrawKind::Fold { collected } if collected > 0 => {
                                debug!(
                                    collected,
                                    %label,
                                    "rarest label exhausted; returning an empty fold"
                                );
                                Ok(Plan::Stop)
                            }
                            _ => Err(PartitionError::InfeasibleSampling {
                                target: kind.target_name(),
                                details: format!("no samples left for rarest label {label}"),
                            }),
                        };
                    }
                    n_label_min = Some(first);
                    first
                }
            };
            plan.push((*label, count));
        }
        Ok(Plan::Draw(plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn labeled(counts: &[(usize, usize)]) -> Vec<(SampleId, LabelValue)> {
        let mut samples = Vec::new();
        for (label, count) in counts {
            for idx in 0..*count {
                samples.push((format!("l{label}-{idx:04}"), LabelValue::bin(*label)));
            }
        }
        samples
    }

    fn setup(counts: &[(usize, usize)]) -> (SamplePool, LabelDistribution) {
        let samples = labeled(counts);
        let distribution = LabelDistribution::from_labels(samples.iter().map(|(_, label)| *label));
        (SamplePool::from_labels(samples), distribution)
    }

    fn label_counts(pool_labels: &HashMap<SampleId, LabelValue>, ids: &[SampleId]) -> HashMap<usize, usize> {
        let mut counts = HashMap::new();
        for id in ids {
            let label = pool_labels[id].get() as usize;
            *counts.entry(label).or_insert(0) += 1;
        }
        counts
    }

    fn sampler(mode: SamplingMode) -> QuotaSampler {
        QuotaSampler::new(mode, DegradationPolicy::default(), 42)
    }

    #[test]
    fn even_draw_is_bounded_by_the_rarest_label() {
        let (mut pool, distribution) = setup(&[(1, 90), (2, 10)]);
        let labels: HashMap<_, _> = labeled(&[(1, 90), (2, 10)]).into_iter().collect();
        let drawn = sampler(SamplingMode::Even)
            .draw(&mut pool, &distribution, 20, DrawKind::Fold { collected: 0 })
            .unwrap();
        assert_eq!(drawn.len(), 20);
        let counts = label_counts(&labels, &drawn);
        assert_eq!(counts[&1], 10);
        assert_eq!(counts[&2], 10);
        assert_eq!(pool.len(), 80);
        assert!(drawn.iter().all(|id| !pool.contains(id)));
    }

    #[test]
    fn even_draw_starves_later_labels_without_exceeding_the_first() {
        let (mut pool, distribution) = setup(&[(1, 5), (2, 10), (3, 50)]);
        // Drain label 3 to 2 survivors while it stays the most frequent in the distribution.
        let taken: Vec<SampleId> = pool.bucket(LabelValue::bin(3)).into_iter().take(48).collect();
        pool.remove(&taken);
        let labels: HashMap<_, _> = labeled(&[(1, 5), (2, 10), (3, 50)]).into_iter().collect();
        let drawn = sampler(SamplingMode::Even)
            .draw(&mut pool, &distribution, 30, DrawKind::Fold { collected: 0 })
            .unwrap();
        let counts = label_counts(&labels, &drawn);
        assert_eq!(counts[&1], 5);
        assert_eq!(counts[&2], 5);
        assert_eq!(counts[&3], 2);
    }

    #[test]
    fn even_draw_with_exhausted_first_label() {
        let (mut pool, distribution) = setup(&[(1, 2), (2, 10)]);
        let rare = pool.bucket(LabelValue::bin(1));
        pool.remove(&rare);
        let sampler = sampler(SamplingMode::Even);

        let stop = sampler
            .draw(&mut pool, &distribution, 4, DrawKind::Fold { collected: 3 })
            .unwrap();
        assert!(stop.is_empty());
        assert_eq!(pool.len(), 10);

        for kind in [DrawKind::Fold { collected: 0 }, DrawKind::TestSet] {
            let err = sampler.draw(&mut pool, &distribution, 4, kind).unwrap_err();
            assert!(matches!(err, PartitionError::InfeasibleSampling { .. }));
        }
    }

    #[test]
    fn stratified_draw_preserves_proportions() {
        let (mut pool, distribution) = setup(&[(1, 300), (2, 600), (3, 100)]);
        let labels: HashMap<_, _> = labeled(&[(1, 300), (2, 600), (3, 100)]).into_iter().collect();
        let drawn = sampler(SamplingMode::Stratified)
            .draw(&mut pool, &distribution, 100, DrawKind::Fold { collected: 0 })
            .unwrap();
        assert_eq!(drawn.len(), 100);
        let counts = label_counts(&labels, &drawn);
        assert_eq!(counts[&1], 30);
        assert_eq!(counts[&2], 60);
        assert_eq!(counts[&3], 10);
    }

    #[test]
    fn test_set_shrinks_within_ceiling() {
        // Label 1 needs 50 of a 100 target but only 40 remain: factor 0.8.
        let (mut pool, distribution) = setup(&[(1, 50), (2, 50)]);
        let scarce: Vec<SampleId> = pool.bucket(LabelValue::bin(1)).into_iter().take(10).collect();
        pool.remove(&scarce);
        let labels: HashMap<_, _> = labeled(&[(1, 50), (2, 50)]).into_iter().collect();
        let drawn = sampler(SamplingMode::Stratified)
            .draw(&mut pool, &distribution, 100, DrawKind::TestSet)
            .unwrap();
        assert_eq!(drawn.len(), 80);
        let counts = label_counts(&labels, &drawn);
        assert_eq!(counts[&1], 40);
        assert_eq!(counts[&2], 40);
    }

    #[test]
    fn test_set_fails_beyond_half_shrink() {
        let (mut pool, distribution) = setup(&[(1, 50), (2, 50)]);
        let scarce: Vec<SampleId> = pool.bucket(LabelValue::bin(1)).into_iter().take(26).collect();
        pool.remove(&scarce);
        let before = pool.len();
        let err = sampler(SamplingMode::Stratified)
            .draw(&mut pool, &distribution, 100, DrawKind::TestSet)
            .unwrap_err();
        assert!(matches!(err, PartitionError::InfeasibleSampling { .. }));
        assert_eq!(pool.len(), before);
    }

    #[test]
    fn test_set_at_exactly_half_shrink_succeeds() {
        let (mut pool, distribution) = setup(&[(1, 50), (2, 50)]);
        let scarce: Vec<SampleId> = pool.bucket(LabelValue::bin(1)).into_iter().take(25).collect();
        pool.remove(&scarce);
        let drawn = sampler(SamplingMode::Stratified)
            .draw(&mut pool, &distribution, 100, DrawKind::TestSet)
            .unwrap();
        assert_eq!(drawn.len(), 50);
    }

    #[test]
    fn fold_shrink_ceiling_depends_on_collected_folds() {
        let sampler = sampler(SamplingMode::Stratified);
        // 9 of 10 needed: 10% shrink is allowed.
        let (mut pool, distribution) = setup(&[(1, 10), (2, 10)]);
        let one: Vec<SampleId> = pool.bucket(LabelValue::bin(1)).into_iter().take(1).collect();
        pool.remove(&one);
        let drawn = sampler
            .draw(&mut pool, &distribution, 20, DrawKind::Fold { collected: 2 })
            .unwrap();
        assert_eq!(drawn.len(), 18);

        // 8 of 10 needed: 20% shrink fails once folds exist, stops otherwise.
        let (mut pool, distribution) = setup(&[(1, 10), (2, 10)]);
        let two: Vec<SampleId> = pool.bucket(LabelValue::bin(1)).into_iter().take(2).collect();
        pool.remove(&two);
        let err = sampler
            .draw(&mut pool, &distribution, 20, DrawKind::Fold { collected: 1 })
            .unwrap_err();
        assert!(matches!(err, PartitionError::InfeasibleSampling { .. }));
        let stop = sampler
            .draw(&mut pool, &distribution, 20, DrawKind::Fold { collected: 0 })
            .unwrap();
        assert!(stop.is_empty());
        assert_eq!(pool.len(), 18);
    }

    #[test]
    fn draws_are_reproducible_for_identical_pools() {
        let sampler = sampler(SamplingMode::Stratified);
        let (mut first_pool, distribution) = setup(&[(1, 40), (2, 60)]);
        let (mut second_pool, _) = setup(&[(1, 40), (2, 60)]);
        let first = sampler
            .draw(&mut first_pool, &distribution, 25, DrawKind::TestSet)
            .unwrap();
        let second = sampler
            .draw(&mut second_pool, &distribution, 25, DrawKind::TestSet)
            .unwrap();
        assert_eq!(first, second);
        let mut sorted = first.clone();
        sorted.sort();
        assert_ne!(first, sorted, "draw order should be shuffled");
    }

    #[test]
    fn zero_target_draws_nothing() {
        let (mut pool, distribution) = setup(&[(1, 4)]);
        let drawn = sampler(SamplingMode::Even)
            .draw(&mut pool, &distribution, 0, DrawKind::TestSet)
            .unwrap();
        assert!(drawn.is_empty());
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn sampling_modes_parse() {
        assert_eq!("even".parse::<SamplingMode>().unwrap(), SamplingMode::Even);
        assert_eq!(
            "stratified".parse::<SamplingMode>().unwrap(),
            SamplingMode::Stratified
        );
        assert!(matches!(
            "random".parse::<SamplingMode>(),
            Err(PartitionError::Configuration(_))
        ));
    }
}
