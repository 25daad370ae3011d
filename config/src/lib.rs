//! Run configuration for the sizing engine.
//!
//! A [`RunConfig`] is loaded once per run and passed by reference into every
//! component. Per-chain stage sizes live separately in a mutable
//! [`ConfigContext`], which the optimizer reads defaults from and commits
//! results into.
#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context as _, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub mod context;
pub mod env;
pub mod paths;

pub use context::ConfigContext;
pub use env::Env;

#[cfg(test)]
mod tests;

/// A process corner.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Corner {
    /// Typical.
    #[default]
    Tt,
    /// Fast.
    Ff,
    /// Slow.
    Ss,
}

impl Display for Corner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tt => write!(f, "tt"),
            Self::Ff => write!(f, "ff"),
            Self::Ss => write!(f, "ss"),
        }
    }
}

impl FromStr for Corner {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tt" => Ok(Self::Tt),
            "ff" => Ok(Self::Ff),
            "ss" => Ok(Self::Ss),
            other => bail!("unknown corner `{other}`"),
        }
    }
}

/// Immutable settings for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Query characterization data before computing capacitance and resistance.
    pub use_characterization_data: bool,
    /// Default `interpolate` flag for characterization queries.
    pub interpolate_characterization_data: bool,
    /// Upper bound of every buffer stage size.
    pub max_buf_size: f64,
    /// Upper bound of the precharge-coupled decision variable.
    pub max_precharge_size: f64,
    /// Weight of the area regularizer in the sizing objective.
    pub buffer_optimization_size_penalty: f64,
    /// Default precharge device size.
    pub precharge_size: f64,
    /// Static predecoder sizes.
    pub predecode_sizes: Vec<f64>,
    /// Number of sizes sampled per device during curve fitting.
    pub num_fit_samples: usize,
    /// Process corner used for resistance and transconductance.
    pub corner: Corner,
    /// Initial stage sizes, keyed by chain name.
    pub stage_sizes: IndexMap<String, Vec<f64>>,
    /// Remaining top-level keys, such as `max_<chain>` bounds.
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            use_characterization_data: false,
            interpolate_characterization_data: true,
            max_buf_size: 64.0,
            max_precharge_size: 128.0,
            buffer_optimization_size_penalty: 0.1,
            precharge_size: 1.0,
            predecode_sizes: vec![1.0, 2.0],
            num_fit_samples: 8,
            corner: Corner::Tt,
            stage_sizes: IndexMap::new(),
            extra: BTreeMap::new(),
        }
    }
}

fn as_f64(value: &toml::Value) -> Option<f64> {
    match value {
        toml::Value::Float(f) => Some(*f),
        toml::Value::Integer(i) => Some(*i as f64),
        _ => None,
    }
}

impl RunConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| anyhow!(e).context("could not parse input as TOML"))?;
        config.check()?;
        Ok(config)
    }

    /// Reads and parses a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = paths::read(path)?;
        Self::from_toml_str(&text)
            .with_context(|| format!("invalid configuration in `{}`", path.display()))
    }

    /// Loads the nearest `sizing.toml` above `cwd`, or the defaults if there is none,
    /// then applies environment overrides.
    pub fn discover(cwd: &Path, env: &Env) -> Result<Self> {
        let mut config = match paths::find_config(cwd, None) {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading configuration");
                Self::from_path(path)?
            }
            None => Self::default(),
        };
        config.apply_env(env)?;
        Ok(config)
    }

    /// Applies `SIZING_*` environment overrides to scalar settings.
    ///
    /// `SIZING_MAX_<CHAIN>` variables set per-chain bounds.
    pub fn apply_env(&mut self, env: &Env) -> Result<()> {
        for (key, value) in env.iter() {
            let parse_f64 = || {
                value
                    .parse::<f64>()
                    .with_context(|| format!("invalid value `{value}` for `{key}`"))
            };
            match key.as_str() {
                "use_characterization_data" => {
                    self.use_characterization_data = value.parse().context("expected a bool")?
                }
                "interpolate_characterization_data" => {
                    self.interpolate_characterization_data =
                        value.parse().context("expected a bool")?
                }
                "max_buf_size" => self.max_buf_size = parse_f64()?,
                "max_precharge_size" => self.max_precharge_size = parse_f64()?,
                "buffer_optimization_size_penalty" => {
                    self.buffer_optimization_size_penalty = parse_f64()?
                }
                "precharge_size" => self.precharge_size = parse_f64()?,
                "num_fit_samples" => {
                    self.num_fit_samples = value.parse().context("expected an integer")?
                }
                "corner" => self.corner = value.parse()?,
                k if k.starts_with("max_") => {
                    self.extra.insert(key.clone(), toml::Value::Float(parse_f64()?));
                }
                _ => tracing::warn!(key = %key, "ignoring unrecognized environment override"),
            }
        }
        self.check()
    }

    fn check(&self) -> Result<()> {
        if !(self.max_buf_size >= 1.0) {
            bail!("`max_buf_size` must be at least 1, got {}", self.max_buf_size);
        }
        if !(self.max_precharge_size >= 1.0) {
            bail!(
                "`max_precharge_size` must be at least 1, got {}",
                self.max_precharge_size
            );
        }
        if self.buffer_optimization_size_penalty < 0.0 {
            bail!("`buffer_optimization_size_penalty` must be non-negative");
        }
        if self.num_fit_samples < 2 {
            bail!("`num_fit_samples` must be at least 2");
        }
        for (key, value) in self.extra.iter() {
            if key.starts_with("max_") {
                if as_f64(value).is_none() {
                    bail!("`{key}` must be a number");
                }
            } else {
                tracing::warn!(key = %key, "ignoring unrecognized configuration key");
            }
        }
        Ok(())
    }

    /// The upper size bound for `chain`.
    ///
    /// A `max_<chain>` key overrides [`RunConfig::max_buf_size`].
    pub fn max_size_for(&self, chain: &str) -> f64 {
        self.extra
            .get(&format!("max_{chain}"))
            .and_then(as_f64)
            .unwrap_or(self.max_buf_size)
    }
}
