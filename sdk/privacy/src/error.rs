//! Errors raised by note primitives

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoteError {
    #[error("invalid amount: notes must carry a positive value")]
    InvalidAmount,

    #[error("entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("invalid hex value: {0}")]
    InvalidHex(String),

    #[error("value is not a canonical field element")]
    NonCanonical,
}
