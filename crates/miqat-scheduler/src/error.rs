use miqat_provider::ProviderError;
use thiserror::Error;

/// Errors that can occur within the refresh scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Failure reported by the schedule provider.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A lock guarding scheduler state was poisoned by a panicking task.
    #[error("Scheduler state poisoned: {0}")]
    Poisoned(&'static str),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
