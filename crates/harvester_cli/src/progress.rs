//! Progress reporting for sync runs.
//!
//! Library progress events are turned into structured `tracing` events, so
//! the same output works on a terminal, under systemd and in CI.

mod logging;

use std::sync::Arc;

use harvester::sync::ProgressCallback;

pub(crate) use logging::LoggingReporter;

/// Callback that forwards every event to a [`LoggingReporter`].
pub(crate) fn reporter_callback() -> Arc<ProgressCallback> {
    let reporter = LoggingReporter::new();
    let callback: ProgressCallback = Box::new(move |event| reporter.handle(event));
    Arc::new(callback)
}
