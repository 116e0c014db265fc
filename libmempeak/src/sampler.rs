//! Live memory sampling through an external process.
//!
//! The sampler program (by default `nvidia-smi`) writes one table row per
//! period to a temporary file. Stopping the sampler asks the process to
//! terminate, kills it if it does not within a grace period, and reaps it
//! before the file is read, so the file is complete when parsed.
use std::fs;
use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use derive_more::Display;
use serde::Deserialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::ParseError;
use crate::stats::{GlobalPeak, global_peak};
use crate::table::{TraceFormat, parse_trace};
use crate::trace::Trace;

const PERIOD_PLACEHOLDER: &str = "{period_ms}";
const EXIT_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SamplerConfig {
    pub program: String,
    /// Arguments, `{period_ms}` is replaced by the sampling period
    pub args: Vec<String>,
    pub period_ms: u64,
    /// Time given to the sampler to produce its first rows after launch
    pub warmup_ms: u64,
    /// Time the sampler gets to flush and exit after SIGTERM before it is
    /// killed
    pub stop_grace_ms: u64,
    /// Directory for capture files, the system temporary directory if unset
    #[serde(default)]
    pub capture_dir: Option<Utf8PathBuf>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            program: "nvidia-smi".to_string(),
            args: vec![
                "--query-gpu=timestamp,name,memory.total,memory.used".to_string(),
                "--format=csv".to_string(),
                "-lms".to_string(),
                PERIOD_PLACEHOLDER.to_string(),
            ],
            period_ms: 1,
            warmup_ms: 1000,
            stop_grace_ms: 500,
            capture_dir: None,
        }
    }
}

impl SamplerConfig {
    #[must_use]
    pub fn command_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(PERIOD_PLACEHOLDER, &self.period_ms.to_string()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Phase {
    #[display("created")]
    Created,
    #[display("started")]
    Started,
    #[display("stopped")]
    Stopped,
}

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("Sampler is {phase}, cannot {action} it")]
    InvalidState { phase: Phase, action: &'static str },

    #[error("Sampling period must be positive")]
    ZeroPeriod,

    #[error("Failed to launch sampler `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Sampler exited before it was stopped ({status})")]
    ExitedEarly { status: ExitStatus },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read captured trace: {0}")]
    Parse(#[from] ParseError),

    #[error("Sampler captured no samples")]
    EmptyTrace,
}

/// A running sampler process and the file it writes to.
///
/// Dropping it kills and reaps the process and removes the file.
struct Running {
    child: Child,
    file: NamedTempFile,
}

/// Send SIGTERM. False if the signal could not be delivered.
#[cfg(unix)]
fn terminate(child: &Child) -> bool {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(child.id()) else {
        return false;
    };
    kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok()
}

#[cfg(not(unix))]
fn terminate(_child: &Child) -> bool {
    false
}

impl Running {
    /// Terminate the process, giving it `grace` to exit on SIGTERM before it
    /// is killed. Returns its status if it had already exited by itself.
    fn halt(&mut self, grace: Duration) -> io::Result<Option<ExitStatus>> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(Some(status));
        }

        if terminate(&self.child) {
            let deadline = Instant::now() + grace;
            loop {
                if let Some(status) = self.child.try_wait()? {
                    debug!("Sampler terminated with {status}");
                    return Ok(None);
                }
                if Instant::now() >= deadline {
                    break;
                }
                thread::sleep(EXIT_POLL);
            }
            warn!("Sampler ignored SIGTERM for {grace:?}, killing it");
        }

        if let Err(e) = self.child.kill() {
            // InvalidInput: exited between try_wait and kill
            if e.kind() != io::ErrorKind::InvalidInput {
                return Err(e);
            }
        }
        self.child.wait()?;
        Ok(None)
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            debug!("Killing sampler process {}", self.child.id());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

struct Capture {
    trace: Trace,
    peak: GlobalPeak,
}

enum State {
    Created,
    Started(Running),
    /// `None` when stopping failed
    Stopped(Option<Capture>),
}

impl State {
    fn phase(&self) -> Phase {
        match self {
            State::Created => Phase::Created,
            State::Started(_) => Phase::Started,
            State::Stopped(_) => Phase::Stopped,
        }
    }
}

/// Samples memory usage between [`Sampler::start`] and [`Sampler::stop`] and
/// reports the peak usage above the baseline.
///
/// ```no_run
/// # use libmempeak::sampler::{Sampler, SamplerConfig};
/// # use libmempeak::table::TraceFormat;
/// let mut sampler = Sampler::new(SamplerConfig::default(), TraceFormat::default());
/// sampler.start()?;
/// // run the computation to profile
/// let peak = sampler.stop()?;
/// println!("{} MiB", peak.peak);
/// # Ok::<(), libmempeak::sampler::SamplerError>(())
/// ```
pub struct Sampler {
    config: SamplerConfig,
    format: TraceFormat,
    state: State,
}

impl Sampler {
    #[must_use]
    pub fn new(config: SamplerConfig, format: TraceFormat) -> Self {
        Self {
            config,
            format,
            state: State::Created,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    fn invalid(&self, action: &'static str) -> SamplerError {
        SamplerError::InvalidState {
            phase: self.phase(),
            action,
        }
    }

    /// Launch the sampler process and wait for its warm-up period.
    pub fn start(&mut self) -> Result<(), SamplerError> {
        if !matches!(self.state, State::Created) {
            return Err(self.invalid("start"));
        }
        if self.config.period_ms == 0 {
            return Err(SamplerError::ZeroPeriod);
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("mempeak-").suffix(".csv");
        let file = match &self.config.capture_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let stdout = file.as_file().try_clone()?;
        let args = self.config.command_args();
        info!(
            "Starting sampler: {} {} > {}",
            self.config.program,
            args.join(" "),
            file.path().display()
        );

        let child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .spawn()
            .map_err(|source| SamplerError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;
        self.state = State::Started(Running { child, file });

        if self.config.warmup_ms > 0 {
            thread::sleep(Duration::from_millis(self.config.warmup_ms));
        }
        Ok(())
    }

    /// Stop the sampler and compute the peak over everything it captured.
    ///
    /// The process is reaped and the temporary file removed whether or not
    /// the capture can be analysed.
    pub fn stop(&mut self) -> Result<GlobalPeak, SamplerError> {
        let mut running = match std::mem::replace(&mut self.state, State::Stopped(None)) {
            State::Started(running) => running,
            other => {
                self.state = other;
                return Err(self.invalid("stop"));
            }
        };

        let halted = running.halt(Duration::from_millis(self.config.stop_grace_ms));
        let content = fs::read_to_string(running.file.path());
        drop(running);

        if let Some(status) = halted? {
            warn!("Sampler exited on its own with {status}");
            return Err(SamplerError::ExitedEarly { status });
        }
        let trace = parse_trace(&content?, &self.format)?;
        let peak = global_peak(&trace).map_err(|_| SamplerError::EmptyTrace)?;
        info!(
            "Sampler captured {} samples, peak usage {} MiB",
            trace.len(),
            peak.peak
        );

        self.state = State::Stopped(Some(Capture { trace, peak }));
        Ok(peak)
    }

    /// Run `f` while sampling. The sampler is stopped even if `f` reports
    /// failure through its return value.
    pub fn profile<T>(&mut self, f: impl FnOnce() -> T) -> Result<(T, GlobalPeak), SamplerError> {
        self.start()?;
        let result = f();
        let peak = self.stop()?;
        Ok((result, peak))
    }

    fn capture(&self) -> Option<&Capture> {
        match &self.state {
            State::Stopped(Some(capture)) => Some(capture),
            _ => None,
        }
    }

    /// Peak usage above the baseline, available after a successful stop
    #[must_use]
    pub fn usage_peak(&self) -> Option<u64> {
        self.capture().map(|c| c.peak.peak)
    }

    /// Maximum, minimum and peak, available after a successful stop
    #[must_use]
    pub fn memory_stat(&self) -> Option<GlobalPeak> {
        self.capture().map(|c| c.peak)
    }

    #[must_use]
    pub fn trace(&self) -> Option<&Trace> {
        self.capture().map(|c| &c.trace)
    }

    /// Location of the capture file while the sampler runs
    #[must_use]
    pub fn trace_path(&self) -> Option<&Path> {
        match &self.state {
            State::Started(running) => Some(running.file.path()),
            _ => None,
        }
    }
}
