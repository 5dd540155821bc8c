use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::wake::WakeReason;

/// The platform facility that wakes the process later.
///
/// The OS may deliver a wake late or not at all; nothing here retries.
pub trait BackgroundJobs: Send + Sync {
    /// Ask to be woken no earlier than `not_before`. Replaces any earlier request.
    fn request_wake(&self, not_before: DateTime<Utc>, reason: WakeReason);

    /// Signal that the work started by a wake has finished.
    fn complete(&self, success: bool);
}

/// For processes that stay resident and time their own wakes: requests and
/// completions are only logged.
#[derive(Debug, Default)]
pub struct LoggingJobs;

impl BackgroundJobs for LoggingJobs {
    fn request_wake(&self, not_before: DateTime<Utc>, reason: WakeReason) {
        info!(at = %not_before, %reason, "next wake planned");
    }

    fn complete(&self, success: bool) {
        debug!(success, "wake work complete");
    }
}
