//! Error types for MDR V2 operations

use thiserror::Error;

/// Protocol result type
pub type Result<T> = std::result::Result<T, MdrError>;

/// Errors surfaced at the MDR V2 protocol boundary
///
/// These are the only kinds a remote agent ever sees. None of them mutates
/// directory state: a verb either validates and succeeds, or fails with one
/// of these before touching anything.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MdrError {
    /// Malformed or out-of-range caller input
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Unknown or malformed 16-byte data identity
    #[error("Invalid data id")]
    InvalidId,

    /// The region is mid-transition or locked; retry later
    #[error("Update in progress")]
    UpdateInProgress,
}

impl MdrError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        MdrError::InvalidParameter(reason.into())
    }
}

/// Internal synchronization failures
///
/// Never crosses the protocol boundary as its own kind. `agent_synchronize_data`
/// logs these and reports a plain `false`, keeping the last good directory state.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Backing store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backing store holds {len} bytes, smaller than the {expected}-byte header")]
    HeaderTruncated { len: usize, expected: usize },

    #[error("Declared data size {declared} exceeds table capacity {capacity}")]
    DataTooLarge { declared: u32, capacity: usize },

    #[error("Neither SMBIOS 2.1 nor 3.0 anchor string found")]
    AnchorNotFound,

    #[error("Entry point at offset {offset} needs {needed} bytes, {available} available")]
    EntryPointTruncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Unsupported SMBIOS version: {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}
