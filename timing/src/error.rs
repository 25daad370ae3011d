//! Error types for the timing models.

use arcstr::ArcStr;

/// A result type returning timing errors.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type for timing queries.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// An error raised by the hierarchy model or terminal extraction.
    #[error(transparent)]
    Hier(#[from] hier::Error),
    /// A delay query reached a module without any output pin.
    #[error("module `{module}` has no output pin")]
    NoOutputPin {
        /// The module.
        module: ArcStr,
    },
}
