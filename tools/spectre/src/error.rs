//! Spectre errors.

use std::time::Duration;

use thiserror::Error as ThisError;

/// The result type returned by Spectre library functions.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible Spectre errors.
#[derive(ThisError, Debug)]
pub enum Error {
    /// I/O error.
    #[error("io error")]
    Io(#[from] std::io::Error),
    /// Template parsing/rendering error.
    #[error("template error")]
    Template(#[from] tera::Error),
    /// Error parsing a rawfile.
    #[error("error parsing Spectre rawfile")]
    Rawfile(#[from] rdb::error::Error),
    /// The Spectre process exited while a reply was expected.
    #[error("Spectre exited unexpectedly")]
    Exited,
    /// Spectre did not reply in time.
    #[error("no reply from Spectre within {0:?}")]
    Timeout(Duration),
    /// Spectre rejected a command.
    #[error("Spectre rejected `{command}`: {reply}")]
    Rejected {
        /// The SKILL command.
        command: String,
        /// The reply of the interpreter.
        reply: String,
    },
    /// Invalid configuration.
    #[error("invalid Spectre configuration: {0}")]
    Config(#[from] crate::SpectreBuilderError),
}
