//! Diagnostics for the CLI: `tracing` to stderr.
//!
//! `RUST_LOG` wins over `--log-level` when set, e.g.
//! `RUST_LOG=drover_core::coord=debug drover run`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
