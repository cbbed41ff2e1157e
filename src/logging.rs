//! Diagnostic logging setup

use tracing_subscriber::EnvFilter;

/// Default filter directive for a given `-v` count
fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "tablesync=info",
        1 => "tablesync=debug",
        _ => "tablesync=trace",
    }
}

/// Installs the global subscriber, writing to stderr so command output on
/// stdout stays clean. `RUST_LOG` takes precedence over `verbosity`.
///
/// Calling this more than once is harmless.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
