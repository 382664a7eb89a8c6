//! Tracing and logging setup shared by binaries and tests.

/// Initialize process-wide tracing with the default [`LogConfig`].
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init_with(&LogConfig::default());
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use tracing::{LogConfig, LogFormat, init_for_tests, init_with};
