//! Tracing initialization (fmt subscriber with an env filter).
//!
//! `RUST_LOG` wins when set. Otherwise the level is `info`, or `debug` for this crate when
//! the client runs with `debug: true`.

use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn default_directives(verbose: bool) -> &'static str {
    if verbose { "info,suprsend=debug" } else { "info" }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_telemetry(verbose: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    info!(verbose, "Telemetry initialized");
    Ok(())
}
