#![deny(unused_crate_dependencies)]
//! Code for the `mempeak` executable.
use std::fs::File;
use std::io::{BufWriter, stdout};
use std::process::Command;

use camino::Utf8PathBuf;
use clap::Parser;
use eyre::{Context, Result, bail, eyre};
use libmempeak::config::{MempeakConfig, ReportFormat};
use libmempeak::intervals::{IntervalWriter, load_intervals, now};
use libmempeak::report::{has_failures, render_json, render_peak, render_text, write_report};
use libmempeak::sampler::Sampler;
use libmempeak::table::load_trace;
use libmempeak::{AlignmentPolicy, Interval, correlate, global_peak, logs};
use tracing::{info, warn};

#[derive(clap::Subcommand)]
enum Commands {
    /// Minimum and maximum memory usage of every interval in an interval file
    Correlate {
        /// Memory trace recorded by the sampler
        #[clap(long)]
        trace: Option<Utf8PathBuf>,
        /// Interval file, three lines per interval: label, start, end
        #[clap(long)]
        intervals: Option<Utf8PathBuf>,
        /// Report destination, `-` for stdout
        #[clap(long, short)]
        output: Option<String>,
        /// Write the report as JSON
        #[clap(long)]
        json: bool,
        /// Fail on the first interval outside the trace instead of skipping it
        #[clap(long)]
        strict: bool,
    },
    /// Peak memory usage over a whole trace
    Peak {
        /// Memory trace recorded by the sampler
        trace: Option<Utf8PathBuf>,
    },
    /// Run a command while sampling memory usage and print its peak
    Record {
        /// Sampling period in milliseconds
        #[clap(long)]
        period_ms: Option<u64>,
        /// Label of the recorded interval, the command line by default
        #[clap(long)]
        label: Option<String>,
        /// Append the interval covering the command to this file
        #[clap(long)]
        intervals_out: Option<Utf8PathBuf>,
        /// Command to run, after `--`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

#[derive(clap::Parser)]
#[command(version, about)]
struct Args {
    /// Ignore configuration files and environment variables
    #[clap(long)]
    default_config: bool,

    #[command(subcommand)]
    command: Commands,
}

fn run_correlate(
    config: &MempeakConfig,
    trace: Option<Utf8PathBuf>,
    intervals: Option<Utf8PathBuf>,
    output: Option<String>,
    json: bool,
    strict: bool,
) -> Result<()> {
    let trace_path = trace.unwrap_or_else(|| config.trace.path.clone());
    let intervals_path = intervals.unwrap_or_else(|| config.intervals.path.clone());
    let output = output.unwrap_or_else(|| config.report.output.clone());
    let policy = if strict {
        AlignmentPolicy::Abort
    } else {
        config.report.alignment
    };
    let format = if json {
        ReportFormat::Json
    } else {
        config.report.format
    };

    let trace = load_trace(&trace_path, &config.trace.format)?;
    let intervals = load_intervals(&intervals_path, &config.intervals.timestamp_format)?;
    let reports = correlate(&trace, &intervals, policy)
        .with_context(|| format!("Failed to correlate {intervals_path} with {trace_path}"))?;

    let rendered = match format {
        ReportFormat::Text => render_text(&reports),
        ReportFormat::Json => render_json(&reports)? + "\n",
    };
    if output == "-" {
        write_report(&mut stdout().lock(), &rendered)?;
    } else {
        let file =
            File::create(&output).with_context(|| format!("Failed to create report {output}"))?;
        write_report(&mut BufWriter::new(file), &rendered)
            .with_context(|| format!("Failed to write report {output}"))?;
        info!("Wrote {format} report for {} intervals to {output}", reports.len());
    }

    if has_failures(&reports) {
        warn!("Some intervals have no statistics, see the report");
    }
    Ok(())
}

fn run_peak(config: &MempeakConfig, trace: Option<Utf8PathBuf>) -> Result<()> {
    let trace_path = trace.unwrap_or_else(|| config.trace.path.clone());
    let trace = load_trace(&trace_path, &config.trace.format)?;
    let peak = global_peak(&trace).with_context(|| format!("No peak for {trace_path}"))?;
    println!("{}", render_peak(&peak));
    Ok(())
}

fn run_record(
    config: &MempeakConfig,
    period_ms: Option<u64>,
    label: Option<String>,
    intervals_out: Option<Utf8PathBuf>,
    command: Vec<String>,
) -> Result<()> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| eyre!("No command to record"))?;
    let label = label.unwrap_or_else(|| command.join(" "));

    let mut sampler_config = config.sampler.clone();
    if let Some(period_ms) = period_ms {
        sampler_config.period_ms = period_ms;
    }
    let mut sampler = Sampler::new(sampler_config, config.trace.format.clone());

    // The sampler is stopped before the command's outcome is looked at
    let ((start, end, status), peak) = sampler.profile(|| {
        let start = now();
        let status = Command::new(program).args(args).status();
        (start, now(), status)
    })?;
    println!("{}", render_peak(&peak));

    let status = status.with_context(|| format!("Failed to run `{program}`"))?;

    if let Some(path) = intervals_out {
        let interval = Interval::new(label, start, end)?;
        IntervalWriter::append_to(&path)
            .and_then(|mut writer| writer.write(&interval))
            .with_context(|| format!("Failed to append interval to {path}"))?;
        info!("Appended interval '{}' to {path}", interval.label());
    }

    if !status.success() {
        bail!("`{program}` exited with {status}");
    }
    Ok(())
}

fn main() -> Result<()> {
    logs::start_logging()?;

    let args = Args::parse();
    let config = MempeakConfig::new(args.default_config)?;

    match args.command {
        Commands::Correlate {
            trace,
            intervals,
            output,
            json,
            strict,
        } => run_correlate(&config, trace, intervals, output, json, strict),
        Commands::Peak { trace } => run_peak(&config, trace),
        Commands::Record {
            period_ms,
            label,
            intervals_out,
            command,
        } => run_record(&config, period_ms, label, intervals_out, command),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::Utf8Path;
    use clap::CommandFactory;
    use libmempeak::sampler::SamplerConfig;
    use libmempeak::timestamp::TIMESTAMP_FORMAT;

    use super::*;

    fn data(name: &str) -> Utf8PathBuf {
        Utf8Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../libmempeak/tests/data")
            .join(name)
    }

    fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, path)
    }

    /// Recorded fixtures, and a sampler that replays the fixture trace
    fn fixture_config(dir: &Utf8Path) -> MempeakConfig {
        let captures = dir.join("captures");
        fs::create_dir(&captures).unwrap();

        let mut config = MempeakConfig::new(true).unwrap();
        config.trace.path = data("Profiling.csv");
        config.intervals.path = data("Profiling-Time.txt");
        config.sampler = SamplerConfig {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "cat \"$0\"; exec sleep 30".to_string(),
                data("Profiling.csv").to_string(),
            ],
            period_ms: 1,
            warmup_ms: 200,
            stop_grace_ms: 500,
            capture_dir: Some(captures),
        };
        config
    }

    fn chain_mentions(err: &eyre::Report, text: &str) -> bool {
        err.chain().any(|cause| cause.to_string().contains(text))
    }

    #[test]
    fn correlate_writes_text_report() {
        let (_guard, dir) = scratch();
        let config = fixture_config(&dir);
        let output = dir.join("stats.txt");

        run_correlate(&config, None, None, Some(output.to_string()), false, false).unwrap();

        let report = fs::read_to_string(&output).unwrap();
        assert!(
            report.starts_with("[0] multiply cubool\nmin= 842 MiB max= 1290 MiB used= 448 MiB\n\n"),
            "{report}"
        );
        assert!(report.contains("[3] teardown\nerror: "));
    }

    #[test]
    fn correlate_writes_json_report() {
        let (_guard, dir) = scratch();
        let config = fixture_config(&dir);
        let output = dir.join("stats.json");

        run_correlate(&config, None, None, Some(output.to_string()), true, false).unwrap();

        let report = fs::read_to_string(&output).unwrap();
        assert!(report.contains("\"status\": \"no_data\""));
        assert!(report.contains("\"boundary\": \"end\""));
    }

    #[test]
    fn strict_correlate_fails_without_writing_a_report() {
        let (_guard, dir) = scratch();
        let config = fixture_config(&dir);
        let output = dir.join("stats.txt");

        let err = run_correlate(&config, None, None, Some(output.to_string()), false, true)
            .unwrap_err();

        assert!(chain_mentions(&err, "teardown"), "{err:?}");
        assert!(!output.exists());
    }

    #[cfg(unix)]
    #[test]
    fn record_stops_sampler_when_command_cannot_launch() {
        let (_guard, dir) = scratch();
        let config = fixture_config(&dir);
        let intervals_out = dir.join("times.txt");

        let err = run_record(
            &config,
            None,
            None,
            Some(intervals_out.clone()),
            vec!["/nonexistent/benchmark".to_string()],
        )
        .unwrap_err();

        assert!(chain_mentions(&err, "Failed to run"), "{err:?}");
        assert_eq!(fs::read_dir(dir.join("captures")).unwrap().count(), 0);
        assert!(!intervals_out.exists());
    }

    #[cfg(unix)]
    #[test]
    fn record_appends_interval_of_command() {
        let (_guard, dir) = scratch();
        let config = fixture_config(&dir);
        let intervals_out = dir.join("times.txt");

        run_record(
            &config,
            Some(5),
            Some("noop".to_string()),
            Some(intervals_out.clone()),
            vec!["true".to_string()],
        )
        .unwrap();

        let intervals = load_intervals(&intervals_out, TIMESTAMP_FORMAT).unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].label(), "noop");
        assert_eq!(fs::read_dir(dir.join("captures")).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn record_fails_when_command_fails() {
        let (_guard, dir) = scratch();
        let config = fixture_config(&dir);
        let intervals_out = dir.join("times.txt");

        let err = run_record(
            &config,
            None,
            None,
            Some(intervals_out.clone()),
            vec!["sh".to_string(), "-c".to_string(), "exit 2".to_string()],
        )
        .unwrap_err();

        assert!(chain_mentions(&err, "exited with"), "{err:?}");
        let intervals = load_intervals(&intervals_out, TIMESTAMP_FORMAT).unwrap();
        assert_eq!(intervals[0].label(), "sh -c exit 2");
    }

    #[test]
    fn cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn record_takes_command_after_separator() {
        let args = Args::try_parse_from([
            "mempeak",
            "record",
            "--period-ms",
            "10",
            "--",
            "python",
            "bench.py",
            "--size",
            "4",
        ])
        .unwrap();
        match args.command {
            Commands::Record {
                period_ms, command, ..
            } => {
                assert_eq!(period_ms, Some(10));
                assert_eq!(command, vec!["python", "bench.py", "--size", "4"]);
            }
            _ => panic!("expected record"),
        }
    }

    #[test]
    fn record_requires_a_command() {
        assert!(Args::try_parse_from(["mempeak", "record"]).is_err());
    }

    #[test]
    fn correlate_defaults_come_from_config() {
        let args = Args::try_parse_from(["mempeak", "correlate", "--strict", "-o", "-"]).unwrap();
        match args.command {
            Commands::Correlate {
                trace,
                output,
                strict,
                json,
                ..
            } => {
                assert_eq!(trace, None);
                assert_eq!(output.as_deref(), Some("-"));
                assert!(strict);
                assert!(!json);
            }
            _ => panic!("expected correlate"),
        }
    }
}
