//! Subscriber setup for the `xeda` binary.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Level selected by the global verbosity flags.
pub fn level_for(debug: bool, quiet: bool) -> Level {
    if debug {
        Level::DEBUG
    } else if quiet {
        Level::WARN
    } else {
        Level::INFO
    }
}

/// Installs the fmt subscriber on stderr. `RUST_LOG` takes precedence over
/// `level`.
pub fn init(level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
