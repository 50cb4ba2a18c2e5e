//! Tracing subscriber setup.
//!
//! Log level comes from `RUST_LOG` (default `info`). Scan progress is emitted at
//! `debug`, so `RUST_LOG=dm_decay_scan=debug` prints every grid cell.

use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

static INITIALISED: OnceLock<()> = OnceLock::new();

/// Install the global subscriber. Calling this more than once is a no-op.
pub fn init_tracing() {
    if INITIALISED.set(()).is_err() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr so stdout stays clean for the report.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);

    // Another subscriber may already be installed (e.g. by a test harness).
    let _ = Registry::default().with(filter).with(fmt_layer).try_init();
}
