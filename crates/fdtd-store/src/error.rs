use std::fmt;

use fdtd_core::SimulationError;

#[derive(Debug)]
pub enum CodecError {
    /// A nested entry held a map where an array was expected.
    NotAnArray { key: String },
    /// A key contained the flattening separator.
    SeparatorInKey { key: String },
    Shape { key: String, message: String },
    Label { key: String },
    Archive(bincode::Error),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::NotAnArray { key } => write!(f, "value at {key:?} is not an array"),
            CodecError::SeparatorInKey { key } => {
                write!(f, "key {key:?} contains the reserved separator")
            }
            CodecError::Shape { key, message } => write!(f, "bad shape for {key:?}: {message}"),
            CodecError::Label { key } => write!(f, "key {key:?} is not a numeric label"),
            CodecError::Archive(e) => write!(f, "array archive error: {e}"),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<bincode::Error> for CodecError {
    fn from(e: bincode::Error) -> Self {
        CodecError::Archive(e)
    }
}

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Codec(CodecError),
    InvalidData(String),
    DuplicateFingerprint(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            StoreError::Codec(e) => write!(f, "codec error: {e}"),
            StoreError::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            StoreError::DuplicateFingerprint(fp) => {
                write!(f, "a record with fingerprint {fp} already exists")
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<CodecError> for StoreError {
    fn from(e: CodecError) -> Self {
        StoreError::Codec(e)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Failure of one cached run.
#[derive(Debug)]
pub enum CacheError {
    Simulation(SimulationError),
    Store(StoreError),
    /// Every allowed attempt failed. Nothing was persisted.
    Aborted {
        attempts: u32,
        last_error: SimulationError,
    },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Simulation(e) => write!(f, "{e}"),
            CacheError::Store(e) => write!(f, "{e}"),
            CacheError::Aborted {
                attempts,
                last_error,
            } => write!(f, "run aborted after {attempts} attempt(s): {last_error}"),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<SimulationError> for CacheError {
    fn from(e: SimulationError) -> Self {
        CacheError::Simulation(e)
    }
}

impl From<StoreError> for CacheError {
    fn from(e: StoreError) -> Self {
        CacheError::Store(e)
    }
}
