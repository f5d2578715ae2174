use thiserror::Error;

/// Why a data line was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseFailure {
    #[error("expected 6 fields, found {found}")]
    FieldCount { found: usize },

    #[error("invalid postal code '{0}'")]
    InvalidCode(String),

    #[error("invalid latitude '{0}'")]
    InvalidLatitude(String),

    #[error("invalid longitude '{0}'")]
    InvalidLongitude(String),
}

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line_number}: {reason} in '{line}'")]
    Parse {
        line_number: usize,
        line: String,
        reason: ParseFailure,
    },
}

pub type Result<T> = std::result::Result<T, ReaderError>;
