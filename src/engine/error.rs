use thiserror::Error;

use crate::model::{EnrollmentStatus, Id};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0} {1} not found")]
    NotFound(&'static str, Id),
    #[error("{0} {1} already exists")]
    AlreadyExists(&'static str, Id),
    #[error("authentication required")]
    Unauthorized,
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: EnrollmentStatus,
        to: EnrollmentStatus,
    },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}
