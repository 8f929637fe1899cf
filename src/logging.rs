use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "scalper=info,trade=info,signal=info";

/// Target for executed fills
pub const TRADE_TARGET: &str = "trade";

/// Target for per-tick signals
pub const SIGNAL_TARGET: &str = "signal";

/// Install console logging plus, when `log_file` opens, an append-only file sink
///
/// Calling it twice is harmless; the second subscriber is dropped.
pub fn setup_logging(log_file: Option<&Path>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (file, file_error) = match log_file.map(open_log_file) {
        Some(Ok(file)) => (Some(file), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    let file_layer = file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .ok();

    if let (Some(path), Some(e)) = (log_file, file_error) {
        tracing::warn!(
            "Could not open log file {} ({}), logging to console only",
            path.display(),
            e
        );
    }
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
