//! Analytical timing, capacitance and power models.
//!
//! The closed-form delay equations live in [`delay`]. [`TimingModel`] applies
//! them to a [`hier::Library`], computing input capacitance, driver resistance
//! and transconductance from transistor terminal data or, when enabled, from
//! characterization tables.
#![warn(missing_docs)]

pub mod data;
pub mod delay;
pub mod error;
pub mod lut;
pub mod model;
pub mod tech;

pub use config::Corner;
pub use data::{DelayData, PowerData};
pub use error::{Error, Result};
pub use lut::{CharacterizationLookup, LookupQuery, TableLookup};
pub use model::{DriverResistance, TimingModel};
pub use tech::Technology;
