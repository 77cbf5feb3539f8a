use clubpulse_core::error::CoreError;
use clubpulse_core::slot::SlotError;
use clubpulse_kv::KvError;
use serde::Serialize;

/// Why a booking commit was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictReason {
    BadRange,
    Overlap,
    Maintenance,
}

impl ConflictReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadRange => "bad-range",
            Self::Overlap => "overlap",
            Self::Maintenance => "maintenance",
        }
    }
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcomes of engine operations other than success.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Slot is already locked")]
    AlreadyLocked,

    #[error("Lock is held by another owner")]
    NotOwner,

    #[error("Lock has expired")]
    LockExpired,

    /// The lock presented at commit does not describe this booking.
    #[error("Lock does not match the requested booking")]
    InvalidLock,

    #[error("Booking conflict: {0}")]
    Conflict(ConflictReason),

    #[error("Facility is under maintenance for the requested range")]
    MaintenanceBusy,

    /// A state transition was refused.
    #[error("{0}")]
    InvalidState(String),

    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<KvError> for EngineError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::Unavailable(msg) => Self::Unavailable(msg),
            KvError::Command(msg) => Self::Internal(msg),
        }
    }
}

impl From<SlotError> for EngineError {
    fn from(err: SlotError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<EngineError> for CoreError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::AlreadyLocked
            | EngineError::NotOwner
            | EngineError::LockExpired
            | EngineError::InvalidLock
            | EngineError::Conflict(_)
            | EngineError::MaintenanceBusy
            | EngineError::InvalidState(_) => CoreError::Conflict(err.to_string()),
            EngineError::NotFound { entity, id } => CoreError::NotFound { entity, id },
            EngineError::Forbidden(msg) => CoreError::Forbidden(msg),
            EngineError::Validation(msg) => CoreError::Validation(msg),
            EngineError::Unavailable(msg) => CoreError::Unavailable(msg),
            EngineError::Cancelled => CoreError::Unavailable(err.to_string()),
            EngineError::Internal(msg) => CoreError::Internal(msg),
        }
    }
}
