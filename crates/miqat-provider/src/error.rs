use miqat_core::Coordinate;
use miqat_store::StoreError;
use thiserror::Error;

/// Failures of [`crate::ScheduleProvider::get_schedule`].
///
/// `Clone` so every caller joined on one in-flight calculation receives the
/// same outcome.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Coordinate outside -90..=90 / -180..=180. Not retried.
    #[error("Invalid location: {0}")]
    InvalidLocation(Coordinate),

    /// Calculator error, timeout, or an out-of-order result.
    #[error("Calculation failed: {0}")]
    CalculationFailed(String),

    /// Persistence failure reported by the store.
    #[error("Cache error: {0}")]
    CacheError(String),
}

impl ProviderError {
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::InvalidLocation(_) => "INVALID_LOCATION",
            ProviderError::CalculationFailed(_) => "CALCULATION_FAILED",
            ProviderError::CacheError(_) => "CACHE_ERROR",
        }
    }

    /// Whether a caller may reasonably try the same request again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::CalculationFailed(_))
    }
}

impl From<StoreError> for ProviderError {
    fn from(e: StoreError) -> Self {
        ProviderError::CacheError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
