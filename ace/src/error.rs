//! Error types and error handling utilities.

use std::path::PathBuf;
use std::sync::Arc;

use arcstr::ArcStr;

/// A result type returning ACE errors.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A boxed error returned by simulator session implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The error type for ACE functions.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// A malformed or missing circuit description, directory or option.
    #[error("configuration error: {0}")]
    Configuration(ArcStr),
    /// An I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] Arc<std::io::Error>),
    /// A JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] Arc<serde_json::Error>),
    /// A TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] Arc<toml::de::Error>),
    /// A value was set on a name that is not a declared parameter.
    #[error("`{0}` is not a parameter")]
    UnknownParameter(ArcStr),
    /// A batch update contained names that are not declared parameters.
    ///
    /// All other entries of the batch were applied.
    #[error("not parameters: {0:?}")]
    UnknownParameters(Vec<ArcStr>),
    /// A run requested a corner that is not declared.
    #[error("`{0}` is not a corner")]
    UnknownCorner(ArcStr),
    /// Sessions could not be allocated for one or more corners.
    #[error("failed to allocate sessions for {} corner(s)", .0.len())]
    Allocation(Vec<SessionError>),
    /// A status snapshot could not be applied.
    #[error("invalid status: {0}")]
    InvalidStatus(ArcStr),
    /// A worker thread panicked.
    #[error("a worker thread panicked")]
    Panic,
}

impl Error {
    pub(crate) fn config(msg: impl Into<ArcStr>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn missing_path(what: &str, path: &std::path::Path) -> Self {
        Self::config(arcstr::format!("{what} `{}` does not exist", path.display()))
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Arc::new(value))
    }
}

impl From<toml::de::Error> for Error {
    fn from(value: toml::de::Error) -> Self {
        Self::Toml(Arc::new(value))
    }
}

/// A simulator session failed to allocate or run for a corner.
#[derive(thiserror::Error, Debug, Clone)]
#[error("session for corner `{corner}` failed: {source}")]
pub struct SessionError {
    /// The corner whose session failed.
    pub corner: ArcStr,
    /// The underlying session error.
    pub source: Arc<dyn std::error::Error + Send + Sync>,
    /// The simulator log of the session, if one was produced.
    pub log: Option<PathBuf>,
}

impl SessionError {
    pub(crate) fn new(corner: ArcStr, source: BoxError, log: Option<PathBuf>) -> Self {
        Self {
            corner,
            source: Arc::from(source),
            log,
        }
    }
}
