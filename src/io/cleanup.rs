//! Best-effort sequential teardown.

use tracing::{debug, trace, warn};

use crate::error::{ReaderResult, TeardownFailure, TeardownReport};

/// Runs teardown steps in order, each one independently.
///
/// A failing step is recorded and the next step still runs. A step ending in
/// `PeerClosedBenignly` is noted as benign, not as a failure.
#[derive(Debug)]
pub struct Teardown {
    report: TeardownReport,
}

impl Teardown {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            report: TeardownReport::new(target),
        }
    }

    /// Run one step.
    pub fn step<F>(&mut self, name: &'static str, f: F) -> &mut Self
    where
        F: FnOnce() -> ReaderResult<()>,
    {
        self.report.steps.push(name);
        match f() {
            Ok(()) => trace!(target_uri = %self.report.target, step = name, "teardown step done"),
            Err(e) if e.is_peer_closed() => {
                debug!(target_uri = %self.report.target, step = name, "peer already closed: {e}");
                self.report.benign.push(name);
            }
            Err(error) => {
                warn!(target_uri = %self.report.target, step = name, "teardown step failed: {error}");
                self.report.failures.push(TeardownFailure { step: name, error });
            }
        }
        self
    }

    pub fn finish(self) -> TeardownReport {
        self.report
    }
}
