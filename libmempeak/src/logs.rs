use std::io::stderr;

use eyre::{Context, Result};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt};

/// Install the global subscriber. Log lines go to stderr so that reports
/// written to stdout stay clean. `RUST_LOG` overrides the `info` default.
pub fn start_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let subscriber = Registry::default().with(
        fmt::layer()
            .without_time()
            .with_writer(stderr)
            .with_filter(filter),
    );

    tracing::subscriber::set_global_default(subscriber)
        .context("unable to set global subscriber")?;

    Ok(())
}
