pub mod clock;
pub mod events;
pub mod identity;
pub mod inventory;
pub mod lease;
pub mod policy;
pub mod repository;
pub mod reservation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::{Caller, Role, UserDirectory};
pub use inventory::{InventoryKeeper, TicketInfo};
pub use lease::{LocalSweepLease, SweepLease};
pub use events::{EventPublisher, LogPublisher, PublishError};
pub use policy::{ReservationPolicy, RetryPolicy};
pub use repository::{LedgerStore, StatusChange, StoreError, StoreResult};
pub use reservation::{Reservation, ReservationStatus};

/// Failure talking to a remote collaborator (user directory or inventory keeper).
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("{service} unavailable: {message}")]
    Unavailable { service: &'static str, message: String },
    #[error("{service} did not answer within {after_ms}ms")]
    Timeout { service: &'static str, after_ms: u64 },
    #[error("{service} rejected the request (status {status}): {message}")]
    Rejected {
        service: &'static str,
        status: u16,
        message: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Conflict: {0}")]
    ConflictError(String),
    #[error("Illegal state transition: {0}")]
    StateError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Upstream failure: {0}")]
    UpstreamError(#[from] UpstreamError),
    #[error("Storage failure: {0}")]
    StorageError(String),
}

impl CoreError {
    /// Whether the caller may safely retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::UpstreamError(_) | CoreError::StorageError(_))
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(msg) | StoreError::CapacityExceeded(msg) => {
                CoreError::ConflictError(msg)
            }
            StoreError::Backend(msg) => CoreError::StorageError(msg),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
