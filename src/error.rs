//! Error types for the devstat collector.

use std::path::PathBuf;

/// Errors raised by the collector and its statistics providers.
///
/// A poll fails with [`DevstatError::EnumerationFailed`] or
/// [`DevstatError::DuplicateDevice`]; the remaining variants are
/// construction-time errors.
#[derive(Debug, thiserror::Error)]
pub enum DevstatError {
    #[error("stat enumeration failed")]
    EnumerationFailed,

    #[error("device id '{0}' reported more than once in one poll")]
    DuplicateDevice(String),

    #[error("invalid metric namespace '{0}'")]
    InvalidNamespace(String),

    #[error("devstat is not available on this platform ({0})")]
    Unsupported(&'static str),

    #[error("devstat version mismatch: {0}")]
    VersionMismatch(String),

    #[error("failed to read test data file {path}: {source}")]
    FixtureIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse test data file {path}: {source}")]
    FixtureFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid test data: {0}")]
    InvalidFixture(String),
}
