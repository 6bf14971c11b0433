//! Development-time tracing for debugging the engine.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Dev diagnostics via `RUST_LOG`, output to stderr.
//!   Not persisted, not part of the program's product output.
//!
//! - **Session journal (`io/journal`)**: Product output on stdout and in
//!   `<log dir>/<root id>.log`. Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Journal records are mirrored
/// under the `graybox::journal` target, so `RUST_LOG=graybox::journal=info`
/// shows them on stderr as well.
///
/// # Example
/// ```bash
/// RUST_LOG=graybox=debug graybox -s . plant.toml
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
