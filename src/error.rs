//! Buffer pool error types.

use thiserror::Error;

/// Errors that can occur in the buffer pool and its disk layer.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("buffer pool is full: every frame is pinned")]
    PoolExhausted,

    #[error("page buffer must be {expected} bytes, got {got}")]
    InvalidBufferLength { expected: usize, got: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for buffer pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
