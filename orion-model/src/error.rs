use std::fmt::{self, Display};

/// Errors produced by model constructors and validation routines.
#[derive(Debug)]
pub enum ModelError {
    /// A payload field was present but could not be interpreted.
    InvalidField { field: &'static str, message: String },
    /// A location string did not name a known storage location.
    UnknownLocation(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidField { field, message } => {
                write!(f, "invalid field `{field}`: {message}")
            }
            ModelError::UnknownLocation(loc) => {
                write!(f, "unknown storage location: {loc}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
