//! Error taxonomy for repository operations.
//!
//! Every fallible operation in this crate returns [`Result`]. Native errors
//! (filesystem, JSON/YAML, HTTP, reference parsing) are translated at the
//! seam where they occur.

use ll_schema::{ConfigError, ReferenceError};
use thiserror::Error;

/// Error returned by store, sync, resolver and layer operations.
#[derive(Error, Debug)]
pub enum RepoError {
    /// A ref, version, object or file does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed JSON, version, architecture or archive data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store rejected a commit, pull or checkout.
    #[error("transaction failed ({code}): {message}")]
    Transaction {
        /// Store diagnostic.
        message: String,
        /// Store error code, `-1` if none.
        code: i32,
    },

    /// The server answered with a failure.
    #[error("remote error ({code}): {message}")]
    Remote {
        /// Server message.
        message: String,
        /// HTTP status or envelope code, `-1` if none.
        code: i32,
    },

    /// An upload task ended in the `failed` state.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl RepoError {
    /// Build a [`RepoError::Transaction`] without a native code.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            code: -1,
        }
    }

    /// Build a [`RepoError::Remote`].
    pub fn remote(message: impl Into<String>, code: i32) -> Self {
        Self::Remote {
            message: message.into(),
            code,
        }
    }

    /// Numeric code for display: the wrapped code for `Transaction` and
    /// `Remote`, the OS error for `Io`, `-1` otherwise.
    pub fn code(&self) -> i32 {
        match self {
            Self::Transaction { code, .. } | Self::Remote { code, .. } => *code,
            Self::Io(e) => e.raw_os_error().unwrap_or(-1),
            Self::NotFound(_) | Self::InvalidData(_) | Self::Protocol(_) => -1,
        }
    }

    /// Whether this is [`RepoError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidData(err.to_string())
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::InvalidData(err.to_string())
    }
}

impl From<toml::de::Error> for RepoError {
    fn from(err: toml::de::Error) -> Self {
        Self::InvalidData(err.to_string())
    }
}

impl From<toml::ser::Error> for RepoError {
    fn from(err: toml::ser::Error) -> Self {
        Self::InvalidData(err.to_string())
    }
}

impl From<ReferenceError> for RepoError {
    fn from(err: ReferenceError) -> Self {
        Self::InvalidData(err.to_string())
    }
}

impl From<ConfigError> for RepoError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidData(err.to_string())
    }
}

impl From<reqwest::Error> for RepoError {
    fn from(err: reqwest::Error) -> Self {
        let code = err.status().map_or(-1, |s| i32::from(s.as_u16()));
        Self::Remote {
            message: err.to_string(),
            code,
        }
    }
}

impl From<walkdir::Error> for RepoError {
    fn from(err: walkdir::Error) -> Self {
        match err.into_io_error() {
            Some(io) => Self::Io(io),
            None => Self::InvalidData("filesystem loop detected".to_string()),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, RepoError>;
