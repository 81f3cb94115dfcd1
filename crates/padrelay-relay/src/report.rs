//! Failure reports.
//!
//! A report is a multi-line block: header, the error, each source in its
//! chain, footer. Reports from all relays serialize on one lock so blocks
//! never interleave.

use std::error::Error;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

/// Lock shared by every reporter of a process.
pub type ReportLock = Arc<Mutex<()>>;

#[derive(Clone)]
pub struct FailureReporter {
    relay: Arc<str>,
    suppress: bool,
    lock: ReportLock,
}

impl FailureReporter {
    pub fn new(relay: &str, suppress: bool, lock: ReportLock) -> Self {
        Self {
            relay: Arc::from(relay),
            suppress,
            lock,
        }
    }

    /// Emit a report block for `err`, unless suppressed.
    pub fn report(&self, what: &str, error_type: &str, err: &(dyn Error + 'static)) {
        if self.suppress {
            return;
        }
        let _guard = self.lock.lock();
        error!(relay = %self.relay, error_type, "---- {what} ----");
        error!(relay = %self.relay, "{err}");
        let mut source = err.source();
        while let Some(cause) = source {
            error!(relay = %self.relay, "caused by: {cause}");
            source = cause.source();
        }
        error!(relay = %self.relay, "---- end of report ----");
    }
}
