//! Tracing and logging (shared setup).

/// Initialize process-wide tracing with JSON output and `RUST_LOG` filtering.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(&tracing::LogConfig::default());
}

/// Tracing configuration (filters, formats).
pub mod tracing;

pub use self::tracing::{LogConfig, LogFormat};
