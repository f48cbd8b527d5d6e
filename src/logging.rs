//! Subscriber set-up for binaries.
//!
//! The library itself only emits `tracing` events; call [`init`] once from `main`
//! to print them.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber writing to stderr.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` (e.g. `"info"` or
/// `"toolflow=debug"`) is used. Returns `false` if a global subscriber was already
/// installed.
pub fn init(default_directive: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}
