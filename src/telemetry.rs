//! Tracing setup shared by the binaries.

use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over `verbosity` when set.
///
/// Logs go to stderr so that stdout carries only answers.
pub fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "askdb=info",
        1 => "askdb=debug",
        _ => "askdb=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
