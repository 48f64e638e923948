//! Contiguous one-decimal bin ranges used to discretize continuous labels.
//!
//! A bin set is an ordered list of `(low, high]` intervals. Consecutive ranges
//! share a bound, so every value inside the overall coverage lands in exactly
//! one bin. Values outside the coverage are reported as `None` by [`assign`]
//! and callers must treat that as a hard error.

use serde::{Deserialize, Serialize};

use crate::constants::bins::{BOUND_EPSILON, DECIMAL_SCALE, EDGE_MARGIN, MIN_BIN_COUNT};
use crate::errors::PartitionError;

/// One half-open `(low, high]` bin interval.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinRange {
    /// Exclusive lower bound.
    pub low: f64,
    /// Inclusive upper bound.
    pub high: f64,
}

impl BinRange {
    /// Create a range from its bounds without validation.
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Whether `value > low && value <= high`.
    pub fn contains(&self, value: f64) -> bool {
        value > self.low && value <= self.high
    }

    fn width(&self) -> f64 {
        self.high - self.low
    }
}

impl From<(f64, f64)> for BinRange {
    fn from((low, high): (f64, f64)) -> Self {
        Self::new(low, high)
    }
}

/// Ordered, contiguous bin set.
///
/// Caller-supplied sets go through [`validate`] (at least two ranges);
/// generated sets may hold a single range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct BinRanges {
    ranges: Vec<BinRange>,
}

impl BinRanges {
    /// Validate and wrap caller-supplied ranges.
    pub fn new<I, R>(ranges: I) -> Result<Self, PartitionError>
    where
        I: IntoIterator<Item = R>,
        R: Into<BinRange>,
    {
        let ranges: Vec<BinRange> = ranges.into_iter().map(Into::into).collect();
        validate(&ranges)?;
        Ok(Self { ranges })
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether the set holds no bins (never true for a constructed set).
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Ranges in ascending order.
    pub fn as_slice(&self) -> &[BinRange] {
        &self.ranges
    }

    /// Iterate ranges in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &BinRange> {
        self.ranges.iter()
    }

    /// Overall `(low, high]` coverage of the set.
    pub fn coverage(&self) -> Option<(f64, f64)> {
        let first = self.ranges.first()?;
        let last = self.ranges.last()?;
        Some((first.low, last.high))
    }

    /// 1-based index of the bin holding `value`, `None` outside the coverage.
    pub fn assign(&self, value: f64) -> Option<usize> {
        assign(&self.ranges, value)
    }
}

impl TryFrom<Vec<(f64, f64)>> for BinRanges {
    type Error = PartitionError;

    fn try_from(value: Vec<(f64, f64)>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BinRanges> for Vec<(f64, f64)> {
    fn from(value: BinRanges) -> Self {
        value
            .ranges
            .into_iter()
            .map(|range| (range.low, range.high))
            .collect()
    }
}

/// Round to the one-decimal precision used for bin bounds.
pub fn round_bound(value: f64) -> f64 {
    (value * DECIMAL_SCALE).round() / DECIMAL_SCALE
}

fn is_one_decimal(value: f64) -> bool {
    value.is_finite() && (round_bound(value) - value).abs() < BOUND_EPSILON
}

/// Check that caller-supplied ranges form a usable bin set.
///
/// Requirements: at least two ranges, every bound finite and at one-decimal
/// precision, `low < high` per range, and each range starting exactly where
/// the previous one ends.
pub fn validate(ranges: &[BinRange]) -> Result<(), PartitionError> {
    if ranges.len() < MIN_BIN_COUNT {
        return Err(PartitionError::InvalidBinRanges(format!(
            "expected at least {MIN_BIN_COUNT} ranges, found {}",
            ranges.len()
        )));
    }
    for range in ranges {
        if !is_one_decimal(range.low) || !is_one_decimal(range.high) {
            return Err(PartitionError::InvalidBinRanges(format!(
                "bounds of ({}, {}) must be finite and rounded to one decimal",
                range.low, range.high
            )));
        }
    }
    check_contiguous(ranges)
}

fn check_contiguous(ranges: &[BinRange]) -> Result<(), PartitionError> {
    for range in ranges {
        if range.width() <= BOUND_EPSILON {
            return Err(PartitionError::InvalidBinRanges(format!(
                "range ({}, {}) is not strictly ascending",
                range.low, range.high
            )));
        }
    }
    for pair in ranges.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        if (prev.high - next.low).abs() >= BOUND_EPSILON {
            return Err(PartitionError::InvalidBinRanges(format!(
                "range ({}, {}) does not start where ({}, {}) ends",
                next.low, next.high, prev.low, prev.high
            )));
        }
    }
    Ok(())
}

/// Split `[min, max]` into `n_bins` equal-width one-decimal ranges.
///
/// The first low bound is lowered and the last high bound raised by
/// [`EDGE_MARGIN`] so both observed extremes fall inside the coverage.
pub fn generate(min_value: f64, max_value: f64, n_bins: usize) -> Result<BinRanges, PartitionError> {
    generate_with_factor(min_value, max_value, n_bins, 1.0)
}

/// Split `[min, max]` into `n_bins` ranges whose widths grow by `factor`.
///
/// Each range is `factor` times as wide as the one before it, so `factor > 1`
/// gives finer resolution near `min`. `factor == 1.0` is [`generate`].
pub fn generate_with_factor(
    min_value: f64,
    max_value: f64,
    n_bins: usize,
    factor: f64,
) -> Result<BinRanges, PartitionError> {
    if n_bins < 1 {
        return Err(PartitionError::InvalidBinRanges(
            "at least one bin is required".into(),
        ));
    }
    if !min_value.is_finite() || !max_value.is_finite() {
        return Err(PartitionError::InvalidBinRanges(format!(
            "cannot generate bins over non-finite bounds ({min_value}, {max_value})"
        )));
    }
    if min_value > max_value {
        return Err(PartitionError::InvalidBinRanges(format!(
            "minimum {min_value} exceeds maximum {max_value}"
        )));
    }
    if !factor.is_finite() || factor <= 0.0 {
        return Err(PartitionError::InvalidBinRanges(format!(
            "bin growth factor must be positive, found {factor}"
        )));
    }

    let mut parts = Vec::with_capacity(n_bins);
    let mut part = 1.0;
    for _ in 0..n_bins {
        parts.push(part);
        part *= factor;
    }
    let unit = (max_value - min_value) / parts.iter().sum::<f64>();

    let mut ranges = Vec::with_capacity(n_bins);
    let mut low = min_value;
    for (idx, part) in parts.iter().enumerate() {
        // Pin the final bound to `max` so accumulated error cannot leave it short.
        let high = if idx + 1 == n_bins {
            max_value
        } else {
            low + unit * part
        };
        ranges.push(BinRange::new(round_bound(low), round_bound(high)));
        low = high;
    }
    if let Some(first) = ranges.first_mut() {
        first.low = round_bound(first.low - EDGE_MARGIN);
    }
    if let Some(last) = ranges.last_mut() {
        last.high = round_bound(last.high + EDGE_MARGIN);
    }

    check_contiguous(&ranges).map_err(|_| {
        PartitionError::InvalidBinRanges(format!(
            "span ({min_value}, {max_value}) is too narrow for {n_bins} one-decimal bins"
        ))
    })?;
    Ok(BinRanges { ranges })
}

/// 1-based index of the first range with `value > low && value <= high`.
///
/// `None` means the value lies outside the declared coverage.
pub fn assign(ranges: &[BinRange], value: f64) -> Option<usize> {
    ranges
        .iter()
        .position(|range| range.contains(value))
        .map(|idx| idx + 1)
}
