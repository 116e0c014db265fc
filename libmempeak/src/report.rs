//! Rendering of correlation results and global peaks.
use std::io::{self, Write};

use serde::Serialize;

use crate::correlate::{IntervalReport, Outcome};
use crate::stats::GlobalPeak;

const UNIT: &str = "MiB";

/// One block per interval:
///
/// ```text
/// [0] multiply cubool
/// min= 100 MiB max= 200 MiB used= 100 MiB
///
/// ```
#[must_use]
pub fn render_text(reports: &[IntervalReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let body = match &report.outcome {
            Outcome::Stats { min, max, used, .. } => {
                format!("min= {min} {UNIT} max= {max} {UNIT} used= {used} {UNIT}")
            }
            Outcome::NoData { .. } => format!(
                "no data: no samples between {} and {}",
                report.start, report.end
            ),
            Outcome::Unaligned { error } => format!("error: {error}"),
        };
        out.push_str(&format!("[{}] {}\n{body}\n\n", report.index, report.label));
    }
    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    intervals: &'a [IntervalReport],
}

pub fn render_json(reports: &[IntervalReport]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonReport { intervals: reports })
}

#[must_use]
pub fn render_peak(peak: &GlobalPeak) -> String {
    format!(
        "max= {} {UNIT} min= {} {UNIT} peak= {} {UNIT}",
        peak.max, peak.min, peak.peak
    )
}

pub fn write_report(out: &mut impl Write, rendered: &str) -> io::Result<()> {
    out.write_all(rendered.as_bytes())?;
    out.flush()
}

/// True if any interval could not be given statistics
#[must_use]
pub fn has_failures(reports: &[IntervalReport]) -> bool {
    reports
        .iter()
        .any(|r| !matches!(r.outcome, Outcome::Stats { .. }))
}
