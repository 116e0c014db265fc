//! Mapping interval boundaries onto trace indices.
//!
//! The search looks for two consecutive samples that straddle a timestamp and
//! returns one of them. When the timestamp equals a sample exactly, more than
//! one pair straddles it, and the pair the bisection reaches first wins.
use chrono::NaiveDateTime;
use derive_more::Display;
use serde::Serialize;
use thiserror::Error;

use crate::timestamp::format_timestamp;
use crate::trace::{Interval, Trace};

/// Anything that can hand out sorted timestamps by index.
pub trait Timeline {
    fn len(&self) -> usize;
    fn timestamp_at(&self, index: usize) -> NaiveDateTime;
}

impl Timeline for Trace {
    fn len(&self) -> usize {
        Trace::len(self)
    }

    fn timestamp_at(&self, index: usize) -> NaiveDateTime {
        self.samples()[index].timestamp
    }
}

impl Timeline for [NaiveDateTime] {
    fn len(&self) -> usize {
        <[NaiveDateTime]>::len(self)
    }

    fn timestamp_at(&self, index: usize) -> NaiveDateTime {
        self[index]
    }
}

/// Which sample of the straddling pair to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The earlier sample, at or before the timestamp
    Left,
    /// The later sample, at or after the timestamp
    Right,
}

/// Find `m` with `d[m] <= v <= d[m + 1]` by bisection and return `m` or
/// `m + 1` depending on `side`.
///
/// Returns `None` if `v` is not covered by the timeline or the timeline has
/// fewer than two samples.
pub fn find_nearest<T>(v: NaiveDateTime, d: &T, side: Side) -> Option<usize>
where
    T: Timeline + ?Sized,
{
    let n = d.len();
    if n < 2 {
        return None;
    }

    // `hi` may drop to -1, hence signed bounds
    let mut lo: isize = 0;
    let mut hi: isize = n as isize - 2;

    while lo <= hi {
        let mid = ((lo + hi) / 2) as usize;
        let left = d.timestamp_at(mid);
        let right = d.timestamp_at(mid + 1);
        if left <= v && v <= right {
            return Some(match side {
                Side::Left => mid,
                Side::Right => mid + 1,
            });
        } else if right <= v {
            lo = mid as isize + 1;
        } else {
            hi = mid as isize - 1;
        }
    }

    None
}

/// Inclusive index range of the samples that belong to an interval.
///
/// `low > high` means no sample falls inside the interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlignedRange {
    pub low: usize,
    pub high: usize,
}

impl AlignedRange {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.low > self.high
    }

    /// The same samples as a half-open range; empty when inverted.
    #[must_use]
    pub fn as_half_open(&self) -> std::ops::Range<usize> {
        if self.is_empty() {
            self.low..self.low
        } else {
            self.low..self.high + 1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    #[display("start")]
    Start,
    #[display("end")]
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("Interval '{label}' {boundary} {timestamp} is not covered by the trace ({coverage})")]
pub struct AlignmentError {
    pub label: String,
    pub boundary: Boundary,
    pub timestamp: String,
    /// Human readable coverage of the trace
    pub coverage: String,
}

impl AlignmentError {
    fn new(interval: &Interval, boundary: Boundary, trace: &Trace) -> Self {
        let timestamp = match boundary {
            Boundary::Start => interval.start(),
            Boundary::End => interval.end(),
        };
        let coverage = match trace.time_range() {
            Some((first, last)) if trace.len() >= 2 => {
                format!("{} to {}", format_timestamp(&first), format_timestamp(&last))
            }
            _ => format!("{} samples, at least 2 needed", trace.len()),
        };
        Self {
            label: interval.label().to_string(),
            boundary,
            timestamp: format_timestamp(&timestamp),
            coverage,
        }
    }
}

/// Map an interval to the samples inside it.
///
/// The start uses the later sample of its straddling pair and the end the
/// earlier one. Samples stamped exactly at a boundary count as inside.
pub fn align_interval(interval: &Interval, trace: &Trace) -> Result<AlignedRange, AlignmentError> {
    let samples = trace.samples();

    let mut low = find_nearest(interval.start(), trace, Side::Right)
        .ok_or_else(|| AlignmentError::new(interval, Boundary::Start, trace))?;
    let mut high = find_nearest(interval.end(), trace, Side::Left)
        .ok_or_else(|| AlignmentError::new(interval, Boundary::End, trace))?;

    while low > 0 && samples[low - 1].timestamp == interval.start() {
        low -= 1;
    }
    while high + 1 < samples.len() && samples[high + 1].timestamp == interval.end() {
        high += 1;
    }

    Ok(AlignedRange { low, high })
}
