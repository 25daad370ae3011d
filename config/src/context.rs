//! The mutable stage-size store.

use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::RunConfig;

/// The suffix of the shadow key holding a value's previous contents.
pub const OLD_SUFFIX: &str = "_old";

/// Per-chain size lists, read as defaults and overwritten with optimized results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigContext {
    values: IndexMap<String, Vec<f64>>,
}

impl ConfigContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a context from a run configuration.
    ///
    /// Besides every `[stage_sizes]` entry, the context holds `precharge_size`
    /// (as a one-element list) and `predecode_sizes`.
    pub fn from_config(config: &RunConfig) -> Self {
        let mut values = config.stage_sizes.clone();
        values.insert("precharge_size".to_string(), vec![config.precharge_size]);
        values.insert("predecode_sizes".to_string(), config.predecode_sizes.clone());
        Self { values }
    }

    /// Gets the sizes stored under `key`.
    pub fn get(&self, key: &str) -> Option<&[f64]> {
        self.values.get(key).map(Vec::as_slice)
    }

    /// Gets the previous sizes of `key`, recorded by the last [`commit`](ConfigContext::commit).
    pub fn get_old(&self, key: &str) -> Option<&[f64]> {
        self.get(&format!("{key}{OLD_SUFFIX}"))
    }

    /// Overwrites `key` without recording the previous value.
    pub fn set(&mut self, key: impl Into<String>, sizes: Vec<f64>) {
        self.values.insert(key.into(), sizes);
    }

    /// Overwrites `key`, remembering its previous value under `<key>_old`.
    ///
    /// Returns the previous value, if any.
    pub fn commit(&mut self, key: &str, sizes: Vec<f64>) -> Option<Vec<f64>> {
        let prev = self.values.insert(key.to_string(), sizes);
        if let Some(prev) = prev.as_ref() {
            self.values
                .insert(format!("{key}{OLD_SUFFIX}"), prev.clone());
        }
        tracing::debug!(key, sizes = ?self.values[key], "committed sizes");
        prev
    }

    /// Iterates over every `(key, sizes)` entry in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Serializes the context as a TOML table.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }
}
