//! Min/max extraction over parts of a trace.
use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::align::AlignedRange;
use crate::trace::{Sample, Trace};

/// Smallest and largest value seen in a non-empty set of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinMax {
    pub min: u64,
    pub max: u64,
}

impl MinMax {
    fn new(value: u64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    fn include(self, value: u64) -> Self {
        Self {
            min: self.min.min(value),
            max: self.max.max(value),
        }
    }

    /// Usage above the baseline of the range
    #[must_use]
    pub fn used(&self) -> u64 {
        self.max - self.min
    }

    fn from_samples(samples: &[Sample]) -> Option<Self> {
        let (first, rest) = samples.split_first()?;
        Some(
            rest.iter()
                .fold(Self::new(first.value), |acc, s| acc.include(s.value)),
        )
    }
}

/// Statistics of a range which may turn out to contain no samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RangeStats {
    Values(MinMax),
    NoData,
}

impl RangeStats {
    #[must_use]
    pub fn values(&self) -> Option<MinMax> {
        match self {
            RangeStats::Values(minmax) => Some(*minmax),
            RangeStats::NoData => None,
        }
    }
}

/// Scan `samples[range]`. The range must lie within the trace; an inverted
/// range is empty.
#[must_use]
pub fn range_min_max(trace: &Trace, range: Range<usize>) -> RangeStats {
    let samples = trace.samples();
    debug_assert!(
        range.end <= samples.len(),
        "range {range:?} exceeds trace of {} samples",
        samples.len()
    );
    let end = range.end.min(samples.len());
    let start = range.start.min(end);
    MinMax::from_samples(&samples[start..end]).map_or(RangeStats::NoData, RangeStats::Values)
}

#[must_use]
pub fn aligned_min_max(trace: &Trace, range: AlignedRange) -> RangeStats {
    range_min_max(trace, range.as_half_open())
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Trace contains no samples")]
pub struct EmptyTrace;

/// Baseline, maximum and growth over a whole capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalPeak {
    pub max: u64,
    pub min: u64,
    /// `max - min`, the growth above the baseline
    pub peak: u64,
}

impl From<MinMax> for GlobalPeak {
    fn from(minmax: MinMax) -> Self {
        Self {
            max: minmax.max,
            min: minmax.min,
            peak: minmax.used(),
        }
    }
}

/// The whole trace as a single interval, no alignment involved.
pub fn global_peak(trace: &Trace) -> Result<GlobalPeak, EmptyTrace> {
    MinMax::from_samples(trace.samples())
        .map(GlobalPeak::from)
        .ok_or(EmptyTrace)
}
