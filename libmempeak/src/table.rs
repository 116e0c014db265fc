//! Loading memory traces from delimited tables such as the output of
//! `nvidia-smi --query-gpu=timestamp,name,memory.total,memory.used --format=csv`.
use std::fs;

use camino::Utf8Path;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ParseError;
use crate::timestamp::{TIMESTAMP_FORMAT, parse_timestamp};
use crate::trace::{Trace, TraceRow};

/// Column layout of a trace table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TraceFormat {
    pub delimiter: char,
    /// Skip the first non-empty line
    pub has_header: bool,
    pub timestamp_column: usize,
    /// Column used as category, `None` if the table has no such column
    #[serde(default)]
    pub category_column: Option<usize>,
    pub value_column: usize,
    /// Unit suffix stripped from values, e.g. `MiB`
    pub unit: String,
    pub timestamp_format: String,
}

impl Default for TraceFormat {
    fn default() -> Self {
        Self {
            delimiter: ',',
            has_header: true,
            timestamp_column: 0,
            category_column: Some(1),
            value_column: 3,
            unit: "MiB".to_string(),
            timestamp_format: TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl TraceFormat {
    fn parse_value(&self, field: &str) -> Result<u64, String> {
        let number = field
            .strip_suffix(self.unit.as_str())
            .unwrap_or(field)
            .trim();
        number
            .parse::<u64>()
            .map_err(|e| format!("Invalid memory value '{field}': {e}"))
    }

    fn parse_row(&self, line: &str) -> Result<TraceRow, String> {
        let fields: Vec<&str> = line.split(self.delimiter).map(str::trim).collect();
        let field = |index: usize, what: &str| {
            fields.get(index).copied().ok_or_else(|| {
                format!(
                    "Missing {what} column {index}, row has {} columns",
                    fields.len()
                )
            })
        };

        let raw_timestamp = field(self.timestamp_column, "timestamp")?;
        let timestamp = parse_timestamp(raw_timestamp, &self.timestamp_format)
            .map_err(|e| format!("Invalid timestamp '{raw_timestamp}': {e}"))?;
        let category = match self.category_column {
            Some(column) => field(column, "category")?.to_string(),
            None => String::new(),
        };
        let value = self.parse_value(field(self.value_column, "value")?)?;

        Ok(TraceRow {
            timestamp,
            category,
            value,
        })
    }
}

/// Parse the rows of a trace table. Empty lines are skipped.
pub fn parse_trace_rows(content: &str, format: &TraceFormat) -> Result<Vec<TraceRow>, ParseError> {
    let mut rows = Vec::new();
    let mut header_pending = format.has_header;

    for (line_num, line_str) in content.lines().enumerate() {
        let processed = line_str.trim();
        if processed.is_empty() {
            continue;
        }
        if header_pending {
            debug!("Skipping trace header: {processed}");
            header_pending = false;
            continue;
        }
        let row = format
            .parse_row(processed)
            .map_err(|message| ParseError::line(line_num + 1, line_str, message))?;
        rows.push(row);
    }

    Ok(rows)
}

pub fn parse_trace(content: &str, format: &TraceFormat) -> Result<Trace, ParseError> {
    Ok(Trace::from_rows(parse_trace_rows(content, format)?)?)
}

pub fn load_trace(path: &Utf8Path, format: &TraceFormat) -> Result<Trace, ParseError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|e| ParseError::from(e).in_file(path.as_str()))?;
    let trace = parse_trace(&content, format).map_err(|e| e.in_file(path.as_str()))?;
    info!("Loaded {} samples from {path}", trace.len());
    Ok(trace)
}
