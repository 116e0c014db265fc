//! Per-interval memory statistics for a trace.
use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::align::{AlignedRange, AlignmentError, align_interval};
use crate::stats::{RangeStats, aligned_min_max};
use crate::timestamp::format_timestamp;
use crate::trace::{Interval, Trace};

/// What to do with an interval whose boundaries lie outside the trace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentPolicy {
    /// Report the interval as unaligned and continue with the next one
    #[default]
    #[display("skip")]
    Skip,
    /// Fail the whole run on the first unaligned interval
    #[display("abort")]
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Stats {
        low: usize,
        high: usize,
        min: u64,
        max: u64,
        used: u64,
    },
    /// The interval is covered by the trace but no sample falls inside it
    NoData { low: usize, high: usize },
    Unaligned { error: AlignmentError },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntervalReport {
    pub index: usize,
    pub label: String,
    pub start: String,
    pub end: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl IntervalReport {
    fn new(index: usize, interval: &Interval, outcome: Outcome) -> Self {
        Self {
            index,
            label: interval.label().to_string(),
            start: format_timestamp(&interval.start()),
            end: format_timestamp(&interval.end()),
            outcome,
        }
    }
}

fn outcome_for(range: AlignedRange, stats: RangeStats) -> Outcome {
    let AlignedRange { low, high } = range;
    match stats {
        RangeStats::Values(minmax) => Outcome::Stats {
            low,
            high,
            min: minmax.min,
            max: minmax.max,
            used: minmax.used(),
        },
        RangeStats::NoData => Outcome::NoData { low, high },
    }
}

/// Align every interval to the trace and extract its statistics.
///
/// Reports come back in the order of `intervals`. With
/// [`AlignmentPolicy::Abort`] the first unaligned interval is returned as the
/// error instead.
pub fn correlate(
    trace: &Trace,
    intervals: &[Interval],
    policy: AlignmentPolicy,
) -> Result<Vec<IntervalReport>, AlignmentError> {
    info!(
        "Correlating {} intervals with {} samples",
        intervals.len(),
        trace.len()
    );

    let mut reports = Vec::with_capacity(intervals.len());
    for (index, interval) in intervals.iter().enumerate() {
        let outcome = match align_interval(interval, trace) {
            Ok(range) => {
                debug!("[{index}] {} -> {range:?}", interval.label());
                let outcome = outcome_for(range, aligned_min_max(trace, range));
                if matches!(outcome, Outcome::NoData { .. }) {
                    warn!(
                        "[{index}] {}: no samples inside the interval",
                        interval.label()
                    );
                }
                outcome
            }
            Err(error) => {
                if policy == AlignmentPolicy::Abort {
                    return Err(error);
                }
                warn!("[{index}] {error}");
                Outcome::Unaligned { error }
            }
        };
        reports.push(IntervalReport::new(index, interval, outcome));
    }

    Ok(reports)
}
