//! Error types for the result cache

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    /// Backend could not be reached or refused the operation
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;
