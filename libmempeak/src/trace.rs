//! Memory traces and named intervals.
use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::timestamp::format_timestamp;

/// One memory sample. Values are mebibytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: NaiveDateTime,
    pub value: u64,
}

impl Sample {
    #[must_use]
    pub fn new(timestamp: NaiveDateTime, value: u64) -> Self {
        Self { timestamp, value }
    }
}

/// A parsed row of a trace table, before it becomes part of a [`Trace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRow {
    pub timestamp: NaiveDateTime,
    /// Device or label column of the table
    pub category: String,
    pub value: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TraceError {
    #[error(
        "Trace is not sorted: sample {index} ({current}) is earlier than the sample before it ({previous})"
    )]
    Unsorted {
        index: usize,
        previous: String,
        current: String,
    },

    #[error("Interval '{label}' ends ({end}) before it starts ({start})")]
    InvertedInterval {
        label: String,
        start: String,
        end: String,
    },
}

/// Samples sorted ascending by timestamp.
///
/// Created once from a recording and never mutated afterwards. Duplicate
/// timestamps are allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    samples: Vec<Sample>,
}

impl Trace {
    /// Build a trace, rejecting samples that go back in time.
    pub fn new(samples: Vec<Sample>) -> Result<Self, TraceError> {
        if let Some(index) = samples
            .windows(2)
            .position(|pair| pair[1].timestamp < pair[0].timestamp)
        {
            return Err(TraceError::Unsorted {
                index: index + 1,
                previous: format_timestamp(&samples[index].timestamp),
                current: format_timestamp(&samples[index + 1].timestamp),
            });
        }
        Ok(Self { samples })
    }

    /// Build a trace from loader rows. Rows from more than one category are
    /// accepted but reported, since they cannot be told apart afterwards.
    pub fn from_rows(rows: Vec<TraceRow>) -> Result<Self, TraceError> {
        let categories = rows
            .iter()
            .map(|row| row.category.as_str())
            .collect::<BTreeSet<_>>();
        if categories.len() > 1 {
            warn!(
                "Trace mixes {} categories ({}); samples will be treated as one series",
                categories.len(),
                categories.into_iter().collect::<Vec<_>>().join(", ")
            );
        }
        Self::new(
            rows.into_iter()
                .map(|row| Sample::new(row.timestamp, row.value))
                .collect(),
        )
    }

    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// First and last timestamp, if there are any samples
    #[must_use]
    pub fn time_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }
}

/// A named span of time, usually one experiment of a benchmark run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interval {
    label: String,
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl Interval {
    pub fn new(
        label: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Self, TraceError> {
        let label = label.into();
        if end < start {
            return Err(TraceError::InvertedInterval {
                label,
                start: format_timestamp(&start),
                end: format_timestamp(&end),
            });
        }
        Ok(Self { label, start, end })
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> NaiveDateTime {
        self.end
    }
}
