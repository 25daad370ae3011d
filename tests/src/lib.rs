//! Sizing engine integration tests.

#[cfg(test)]
pub mod bank_sizing;
#[cfg(test)]
pub mod bank_timing;
pub mod paths;
#[cfg(test)]
pub mod run_config;
pub mod shared;
