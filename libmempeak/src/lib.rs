#![deny(unused_crate_dependencies)]
//! Memory usage profiling against labelled time intervals.
//!
//! A memory [`trace::Trace`] is recorded by an external sampler while a
//! program marks the work it does as named [`trace::Interval`]s. Each
//! interval is aligned to the trace by binary search and reduced to the
//! minimum and maximum memory observed inside it.

pub mod align;
pub mod config;
pub mod correlate;
pub mod error;
pub mod intervals;
pub mod logs;
pub mod report;
pub mod sampler;
pub mod stats;
pub mod table;
pub mod timestamp;
pub mod trace;

pub use align::{AlignedRange, AlignmentError, Side, align_interval, find_nearest};
pub use correlate::{AlignmentPolicy, IntervalReport, Outcome, correlate};
pub use error::ParseError;
pub use stats::{GlobalPeak, MinMax, RangeStats, global_peak};
pub use trace::{Interval, Sample, Trace, TraceError};
