//! Tracing subscriber setup for binaries and tests using the adapter.

use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

fn parse_level() -> tracing::Level {
    match std::env::var("SFTPFS_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .to_ascii_lowercase()
        .as_str()
    {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

/// Installs a fmt subscriber at the level named by `SFTPFS_LOG` (default `info`).
///
/// Only the first call has an effect, and an already installed global subscriber
/// is left in place.
pub fn init() {
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(parse_level())
            .with_target(false)
            .try_init();
    });
}
