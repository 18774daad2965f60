//! Tracing initialisation helpers for tests.
//!
//! Call [`init_test_tracing`] at the top of any test that emits tracing events
//! and wants them captured by the test harness. Use [`recording_dispatch`]
//! when a test needs to assert on what was logged.

use iscsi_command_core::logging::{LogCollector, LogReader};
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;

/// Initialise a tracing subscriber that writes to the test-harness writer
/// and respects the `RUST_LOG` environment variable.
///
/// Safe to call multiple times; subsequent calls are silently ignored.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// A dispatch that records up to `capacity` events, plus a reader for them.
/// Nothing global is touched; hand the dispatch to the component under test.
pub fn recording_dispatch(capacity: usize) -> (Dispatch, LogReader) {
    let collector = LogCollector::new(capacity);
    let reader = collector.reader();
    let dispatch = Dispatch::new(tracing_subscriber::registry().with(collector));
    (dispatch, reader)
}
