//! `tracing` subscriber setup.
//!
//! `RUST_LOG` takes precedence over the configured level. Output goes to
//! stderr, either compact human-readable lines or JSON lines.

use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber.
///
/// Call once at startup. Later calls are no-ops.
///
/// * `level` - default filter directive when `RUST_LOG` is unset
/// * `json` - emit JSON lines instead of compact text
pub fn init_subscriber(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init fails if a global subscriber is already installed
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_does_not_panic() {
        init_subscriber("warn", false);
        init_subscriber("debug", true);
    }
}
