use thiserror::Error;

/// Error taxonomy for the cache I/O engine.
///
/// Every fallible operation the engine exposes resolves to one of these variants;
/// there is no panic path for ordinary failures and nothing is ever thrown across the
/// worker/caller thread boundary.
#[derive(Error, Debug)]
pub enum CacheIoError {
    #[error("cache engine is not initialized, or is shutting down")]
    NotInitialized,

    #[error("cache entry is not available")]
    NotAvailable,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cache root path is not set")]
    InvalidPath,

    #[error("cache I/O failure: {0}")]
    Failure(#[from] std::io::Error),

    #[error("file not found")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, CacheIoError>;

impl CacheIoError {
    /// True for the `std::io::ErrorKind::NotFound` case, used by the doom/open paths
    /// that need to distinguish "vanished out from under us" from other I/O failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            CacheIoError::NotFound => true,
            CacheIoError::Failure(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
