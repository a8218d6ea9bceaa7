use ulid::Ulid;

use crate::model::ConflictInfo;

/// Every rejection is terminal: nothing here is retried internally, and the
/// HTTP layer maps each variant straight to a status code (400 InvalidInput,
/// 403 Forbidden, 404 NotFound, 409 Conflict/CapacityExceeded).
#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    InvalidInput(&'static str),
    Forbidden(&'static str),
    /// The day is already occupied. Carries the occupying reservation(s)
    /// so the caller can render a corrective message.
    Conflict(Vec<ConflictInfo>),
    /// Quantity beyond the remaining room for the day.
    CapacityExceeded { available: u32 },
    HasReservations(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::Conflict(existing) => match existing.first() {
                Some(c) => write!(
                    f,
                    "day already reserved by \"{}\" ({} people) at {}",
                    c.event_name, c.quantity, c.date
                ),
                None => write!(f, "day already reserved"),
            },
            EngineError::CapacityExceeded { available } => {
                write!(f, "capacity exceeded: {available} places available")
            }
            EngineError::HasReservations(id) => {
                write!(f, "cannot delete space {id}: reservations exist")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
