// src/logging.rs

//! Logging bootstrap for binaries and tests

use tracing_subscriber::EnvFilter;

/// Install a stderr fmt subscriber filtered by `RUST_LOG`, or
/// `default_filter` when the variable is unset or invalid
///
/// Returns false if a global subscriber was already installed.
pub fn init(default_filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        init("debug");
        assert!(!init("debug"));
    }
}
