//! Environment variable overrides.
//!
//! Scalar settings may be overridden by `SIZING_<KEY>` variables, where
//! `<KEY>` is the upper-cased TOML key. For example, `SIZING_MAX_BUF_SIZE=32`
//! overrides `max_buf_size`.

use std::collections::HashMap;

/// The prefix of every recognized environment variable.
pub const ENV_PREFIX: &str = "SIZING_";

/// A snapshot of the environment variables relevant to configuration.
#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: HashMap<String, String>,
}

impl Env {
    /// Captures the `SIZING_*` variables of the current process.
    pub fn new() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Builds a snapshot from an explicit list of variables.
    ///
    /// Variables without the [`ENV_PREFIX`] are ignored.
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .filter(|(k, _)| k.starts_with(ENV_PREFIX))
                .collect(),
        }
    }

    /// Gets the override for the TOML key `key`, if one is set.
    pub fn get(&self, key: &str) -> Option<&str> {
        let name = format!("{ENV_PREFIX}{}", key.to_ascii_uppercase().replace('-', "_"));
        self.vars.get(&name).map(String::as_str)
    }

    /// Iterates over every `(lower-cased key, value)` override.
    pub fn iter(&self) -> impl Iterator<Item = (String, &str)> {
        self.vars.iter().map(|(k, v)| {
            (
                k.trim_start_matches(ENV_PREFIX).to_ascii_lowercase(),
                v.as_str(),
            )
        })
    }
}
