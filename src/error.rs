use crate::edits::error::EditLogError;
use crate::gridding::grid::GridError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SwathEditError {
    /// Edit log could not be read or written
    #[error("{0}")]
    EditLog(#[from] EditLogError),

    /// Grid could not be set up
    #[error("{0}")]
    Grid(#[from] GridError),

    /// Growing a buffer failed, nothing was changed
    #[error("Unable to allocate memory for {0}")]
    AllocationFailed(String),

    /// No file at this index
    #[error("No file with index {0}")]
    FileIndex(usize),

    /// File is known but its pings are not in memory
    #[error("File {0} is not loaded")]
    FileUnloaded(usize),

    /// No ping at this index
    #[error("No ping {ping} in file {file}")]
    PingIndex { file: usize, ping: usize },

    /// No beam at this index
    #[error("No beam {beam} in ping {ping} of file {file}")]
    BeamIndex { file: usize, ping: usize, beam: usize },

    /// Projection setup failed
    #[error("{0}")]
    Projection(String),

    /// Operation needs a grid
    #[error("Grid has not been set up")]
    NoGrid,

    /// Operation needs an active selection
    #[error("No soundings are selected")]
    NoSelection,

    /// Decoded input could not be read
    #[error("{0}")]
    Input(String),

    /// Decoded input is not valid CSV
    #[error("{0}")]
    Csv(#[from] csv::Error),
}
