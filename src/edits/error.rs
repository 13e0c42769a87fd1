use std::path::PathBuf;
use thiserror::Error;

/// Structural failures of a persisted edit log
#[derive(Error, Debug)]
pub enum EditLogError {
    /// Underlying file access failed
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// File does not start with a known version header
    #[error("Bad edit log header in {path:?}: {found:?}")]
    BadHeader { path: PathBuf, found: String },

    /// File ends in the middle of a record
    #[error("Edit log {path:?} truncated at byte {offset}")]
    Truncated { path: PathBuf, offset: u64 },
}
