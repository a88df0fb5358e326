//! Process-wide tracing/logging setup.

/// Initialize observability for the process.
///
/// Safe to call multiple times; subsequent calls become no-ops. Broker,
/// channel, and dispatcher logs all flow through the subscriber installed
/// here.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;
