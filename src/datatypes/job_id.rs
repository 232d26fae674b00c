use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identity of a queued job.
///
/// Unique within the process; used to correlate log lines and completions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Source of fresh job ids, shared by both queues of a modem.
#[derive(Debug)]
pub struct JobIds {
    next: AtomicU64,
}

impl JobIds {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> JobId {
        JobId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for JobIds {
    fn default() -> Self {
        Self::new()
    }
}
