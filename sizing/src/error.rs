//! Error types for buffer-chain sizing.

use arcstr::ArcStr;

/// A result type returning sizing errors.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type for buffer-chain sizing.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// An error raised by the hierarchy model.
    #[error(transparent)]
    Hier(#[from] hier::Error),
    /// An error raised by the timing model.
    #[error(transparent)]
    Timing(#[from] timing::Error),
    /// A device curve could not be fitted.
    #[error("failed to fit device curve: {0}")]
    Fit(#[from] FitError),
    /// A chain drives no measurable load.
    #[error("chain `{chain}` drives no load")]
    NoLoad {
        /// The chain's configuration key.
        chain: ArcStr,
    },
    /// No factory is registered for a device class.
    #[error("no device registered for class `{class}`")]
    UnknownDevice {
        /// The requested device class.
        class: ArcStr,
    },
    /// A chain has no stage sizes to start from.
    #[error("no stage sizes stored under `{key}`")]
    MissingStageSizes {
        /// The configuration key.
        key: ArcStr,
    },
    /// A chain refers to a net that does not exist in its parent module.
    #[error("module `{module}` has no net `{net}`")]
    MissingNet {
        /// The parent module.
        module: ArcStr,
        /// The requested net.
        net: ArcStr,
    },
}

/// Errors raised while reducing samples to a convex fit.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitError {
    /// The sample cloud is too flat or too narrow to fit.
    #[error("degenerate sample set")]
    Degenerate,
    /// A sample or fitted value is not finite.
    #[error("non-finite sample")]
    NonFinite,
}
