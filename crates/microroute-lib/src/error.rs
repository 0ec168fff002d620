use std::path::PathBuf;

use thiserror::Error;

/// Convenient result alias for the microroute library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
///
/// Only input validation and data problems are errors. A missing path or a
/// failing external provider is a normal input to the fallback chain and is
/// modelled with [`crate::path::NoPathReason`] and
/// [`crate::gateway::GatewayFailure`] instead.
#[derive(Debug, Error)]
pub enum Error {
    /// A coordinate was absent from the request.
    #[error("missing coordinate: {field}")]
    MissingCoordinate { field: &'static str },

    /// A coordinate was present but not a finite, in-range number.
    #[error("invalid coordinate {field}: {value}")]
    InvalidCoordinate { field: &'static str, value: String },

    /// Travel mode string did not match a supported mode.
    #[error("unsupported travel mode: {mode}")]
    UnsupportedMode { mode: String },

    /// Dataset could not be located at the resolved path.
    #[error("dataset not found at {path}")]
    DatasetNotFound { path: PathBuf },

    /// Dataset file exists but its contents are not a usable path network.
    #[error("failed to parse dataset {dataset}: {message}")]
    DatasetParse { dataset: String, message: String },

    /// Raised when a site identifier is not present in the catalog.
    #[error("unknown site: {id}")]
    UnknownSite { id: String },

    /// No suitable project directories could be resolved for this platform.
    #[error("failed to resolve project directories for dataset lookup")]
    ProjectDirsUnavailable,

    /// The HTTP client for the directions gateway could not be constructed.
    #[error("failed to build directions client: {message}")]
    GatewayClient { message: String },

    /// Wrapper for IO errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wrapper for JSON errors outside dataset parsing.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error was caused by bad request input rather than data.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::MissingCoordinate { .. }
                | Error::InvalidCoordinate { .. }
                | Error::UnsupportedMode { .. }
        )
    }
}
