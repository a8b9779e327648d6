use std::fmt::{self, Display};

/// Errors produced by model constructors and validation routines.
#[derive(Debug)]
pub enum ModelError {
    InvalidTimestamp(String),
    InvalidFingerprint(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidTimestamp(msg) => {
                write!(f, "invalid timestamp: {msg}")
            }
            ModelError::InvalidFingerprint(msg) => {
                write!(f, "invalid fingerprint: {msg}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
