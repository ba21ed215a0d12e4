use ulid::Ulid;

use crate::model::ConflictingBooking;

#[derive(Debug)]
pub enum EngineError {
    /// Bad or missing input field. No write occurred.
    Validation(&'static str),
    /// The requested date range overlaps existing bookings. No write occurred.
    Conflict(Vec<ConflictingBooking>),
    /// Unknown unit/booking/source id. Cross-tenant lookups surface the same
    /// way, so existence never leaks across companies.
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Malformed calendar feed. Reported per (unit, source); never partial.
    Parse(String),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation: {msg}"),
            EngineError::Conflict(conflicts) => {
                write!(f, "date range conflicts with {} booking(s)", conflicts.len())
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Parse(msg) => write!(f, "calendar parse error: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
