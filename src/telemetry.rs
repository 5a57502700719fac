// Log output for binaries embedding the gateway.

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Installs a fmt subscriber. RUST_LOG wins over `default_level` when it is
// set and parses.
pub fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    let filter = build_filter(default_level)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init()
        .context("a global tracing subscriber is already installed")
}

fn build_filter(default_level: &str) -> anyhow::Result<EnvFilter> {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
    }
    EnvFilter::try_new(default_level)
        .with_context(|| format!("invalid log filter {default_level:?}"))
}
