//! Interval files: three lines per interval, holding the label, the start
//! timestamp and the end timestamp.
//!
//! ```text
//! multiply cubool
//! 2021/03/25 12:00:00.000000
//! 2021/03/25 12:00:02.500000
//! ```
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};

use camino::Utf8Path;
use chrono::{Local, NaiveDateTime};
use tracing::info;

use crate::error::ParseError;
use crate::timestamp::{TIMESTAMP_WRITE_FORMAT, parse_timestamp};
use crate::trace::Interval;

/// Parse interval records. Blank lines are ignored.
pub fn parse_intervals(content: &str, timestamp_format: &str) -> Result<Vec<Interval>, ParseError> {
    let lines = content
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line))
        .filter(|(_, line)| !line.trim().is_empty())
        .collect::<Vec<_>>();

    let parse_line_timestamp = |(line, content): (usize, &str)| {
        parse_timestamp(content, timestamp_format)
            .map_err(|e| ParseError::line(line, content, format!("Invalid timestamp: {e}")))
    };

    lines
        .chunks(3)
        .map(|record| {
            let &[(label_line, label), start, end] = record else {
                return Err(ParseError::IncompleteRecord {
                    line: record[0].0,
                });
            };
            let start_time = parse_line_timestamp(start)?;
            let end_time = parse_line_timestamp(end)?;
            Interval::new(label.trim(), start_time, end_time)
                .map_err(|e| ParseError::line(label_line, label, e.to_string()))
        })
        .collect()
}

pub fn load_intervals(path: &Utf8Path, timestamp_format: &str) -> Result<Vec<Interval>, ParseError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|e| ParseError::from(e).in_file(path.as_str()))?;
    let intervals = parse_intervals(&content, timestamp_format).map_err(|e| e.in_file(path.as_str()))?;
    info!("Loaded {} intervals from {path}", intervals.len());
    Ok(intervals)
}

/// Appends intervals in the format read by [`parse_intervals`].
pub struct IntervalWriter<W: Write> {
    out: W,
}

impl IntervalWriter<BufWriter<File>> {
    /// Open `path` for appending, creating it if needed
    pub fn append_to(path: &Utf8Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_std_path())?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> IntervalWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write(&mut self, interval: &Interval) -> io::Result<()> {
        let label = interval.label();
        if label.trim().is_empty() || label.contains(['\n', '\r']) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Interval label {label:?} must be a single non-empty line"),
            ));
        }
        writeln!(self.out, "{label}")?;
        writeln!(self.out, "{}", interval.start().format(TIMESTAMP_WRITE_FORMAT))?;
        writeln!(self.out, "{}", interval.end().format(TIMESTAMP_WRITE_FORMAT))?;
        self.out.flush()
    }

    /// Run `f`, stamping its start and end with local time, and write the
    /// resulting interval.
    pub fn record<T>(&mut self, label: &str, f: impl FnOnce() -> T) -> io::Result<(T, Interval)> {
        let start = now();
        let result = f();
        let end = now();
        let interval = Interval::new(label, start, end)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.write(&interval)?;
        Ok((result, interval))
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Local wall clock time, which is what `nvidia-smi` stamps its rows with
#[must_use]
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}
