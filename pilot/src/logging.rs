//! Development-time tracing for debugging the pilot.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Dev diagnostics via `RUST_LOG`, output to
//!   stderr. Not persisted, not part of pilot product output.
//!
//! - **Episode traces (`io/trace`)**: Product artifacts under
//!   `.pilot/episodes/`. Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter: the pilot's own spans at info, dependencies at warn.
const DEFAULT_FILTER: &str = "warn,pilot=info";

/// Initialize the tracing subscriber for the process.
///
/// `RUST_LOG` overrides the default filter wholesale. Output goes to
/// stderr in compact format so stdout stays parseable (`scan` prints
/// JSON there).
///
/// # Example
/// ```bash
/// RUST_LOG=pilot=debug cargo run -- run-once
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
