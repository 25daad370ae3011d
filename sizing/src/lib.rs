//! Buffer-chain sizing.
//!
//! [`BufferOptimizer`] chooses stage counts and stage sizes for the buffer
//! chains of a bank. Loads are measured with the [`timing`] models, device
//! parameters are fitted against size from sampled devices ([`fit`]), and
//! each chain's delay plus an area penalty is minimized within configured
//! size bounds ([`solver`]). Results are committed to a
//! [`config::ConfigContext`].
#![warn(missing_docs)]

pub mod devices;
pub mod error;
pub mod fit;
pub mod loads;
pub mod objective;
pub mod optimize;
pub mod solver;

pub use devices::{DeviceKey, DeviceRegistry, DeviceRequest};
pub use error::{Error, FitError, Result};
pub use fit::{create_convex_fit, linear_interpolate, FitRecord, FitSet, InstanceParams};
pub use loads::{
    extract_loads, BoundaryConsumer, BufferLoadConfig, ChainKind, ChainOutput, ChainSpec,
    LoadTerminal,
};
pub use objective::ChainObjective;
pub use optimize::{optimize_config, BufferOptimizer, ChainReport, Phase};
