//! # Engine Error Types
//!
//! All errors that can surface from the cache, the stores and the world façade.
//!
//! Nothing here is retried internally. Bounds and range errors are programming
//! or caller mistakes; storage and upstream failures are handed back so the
//! caller can apply its own retry policy.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading, caching or persisting world data.
#[derive(Error, Debug)]
pub enum WorldError {
    /// A local coordinate fell outside a fixed-size buffer or region grid.
    #[error("coordinate {coord:?} out of bounds for extent {extent:?}")]
    OutOfBounds {
        /// The offending coordinate, one entry per axis.
        coord: Vec<i64>,
        /// The exclusive upper bound per axis.
        extent: Vec<i64>,
    },

    /// A coordinate fell outside the configured world domain.
    #[error("coordinate {coord:?} outside world domain {min:?}..={max:?}")]
    OutOfRange {
        /// The offending coordinate, one entry per axis.
        coord: Vec<i64>,
        /// Inclusive domain minimum per axis.
        min: Vec<i64>,
        /// Inclusive domain maximum per axis.
        max: Vec<i64>,
    },

    /// A spatial index already holds a value for this coordinate.
    #[error("duplicate key {0:?} in spatial index")]
    DuplicateKey(Vec<i64>),

    /// The caller abandoned the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Reading or writing a region file failed.
    #[error("storage failure at {path}: {source}")]
    StorageFailure {
        /// File the operation was acting on.
        path: PathBuf,
        /// Underlying I/O or decompression error.
        #[source]
        source: std::io::Error,
    },

    /// The remote transport failed to deliver a chunk.
    #[error("upstream failure for chunk {coord:?}: {source}")]
    UpstreamFailure {
        /// Requested chunk coordinate.
        coord: Vec<i64>,
        /// Transport error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Invalid configuration file or layout.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl WorldError {
    /// Builds a [`WorldError::StorageFailure`] for `path`.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StorageFailure {
            path: path.into(),
            source,
        }
    }

    /// Returns true if this is a caller-initiated cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type for engine operations.
pub type WorldResult<T> = Result<T, WorldError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_coordinate() {
        let err = WorldError::DuplicateKey(vec![1, -2]);
        assert_eq!(err.to_string(), "duplicate key [1, -2] in spatial index");

        let err = WorldError::OutOfBounds {
            coord: vec![16, 0, 0],
            extent: vec![16, 16, 256],
        };
        assert!(err.to_string().contains("[16, 0, 0]"));
    }

    #[test]
    fn test_storage_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad frame");
        let err = WorldError::storage("0_0.region", io);
        assert!(err.to_string().contains("0_0.region"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_cancelled());
        assert!(WorldError::Cancelled.is_cancelled());
    }
}
