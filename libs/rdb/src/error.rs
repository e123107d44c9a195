//! Result database errors.

use thiserror::Error as ThisError;

/// The result type returned by result database functions.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible result database errors.
#[derive(ThisError, Debug)]
pub enum Error {
    /// I/O error.
    #[error("io error")]
    Io(#[from] std::io::Error),
    /// Error parsing a nutmeg rawfile.
    #[error("error parsing nutmeg rawfile")]
    Parse,
    /// A plot declared a different number of variables than it listed.
    #[error("plot `{plot}` declares {declared} variables but lists {listed}")]
    VariableCount {
        /// The name of the offending plot.
        plot: String,
        /// The number of variables in the `No. Variables` header.
        declared: usize,
        /// The number of variables actually listed.
        listed: usize,
    },
}
