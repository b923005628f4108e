use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use tracing_subscriber::{EnvFilter, fmt};

/// `RUST_LOG` wins over `default_level` when set.
fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Logs to stderr.
pub fn init(default_level: &str) {
    let _ = fmt()
        .with_env_filter(filter(default_level))
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Appends plain-text logs to `path`.
pub fn init_to_file(path: &Path, default_level: &str) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let _ = fmt()
        .with_env_filter(filter(default_level))
        .with_writer(file)
        .with_target(false)
        .with_ansi(false)
        .try_init();
    Ok(())
}

/// Captured by the test harness.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
