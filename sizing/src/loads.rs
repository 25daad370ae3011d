//! Load extraction for tunable buffer chains.

use std::str::FromStr;

use arcstr::ArcStr;
use hier::{Library, ModuleId};
use serde::{Deserialize, Serialize};
use timing::TimingModel;
use tracing::{span, Level};

use crate::devices::DeviceKey;
use crate::{Error, Result};

/// The chain terminal a load hangs off.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum LoadTerminal {
    /// The chain's true output.
    Out,
    /// The chain's complementary output.
    OutInv,
}

impl FromStr for LoadTerminal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "out" => Ok(Self::Out),
            "out_inv" | "z" => Ok(Self::OutInv),
            _ => Err(format!("unknown load terminal `{s}`")),
        }
    }
}

/// The role of a chain, which changes how its stages are modelled.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainKind {
    /// A plain buffer chain.
    Buffer,
    /// A chain driving the enable of a precharge row.
    ///
    /// The precharge device size becomes an extra decision variable.
    Precharge {
        /// The precharge device.
        device: DeviceKey,
        /// Number of precharge devices on the enable line.
        num_cols: usize,
        /// Capacitance of one bitline.
        bitline_cap: f64,
    },
    /// The chain feeding a predecoder, whose first stage size is fixed.
    Predecode,
}

/// Copies of a module pin outside the parent module that consume a chain output.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryConsumer {
    /// The consuming module.
    pub module: ModuleId,
    /// The consuming pin.
    pub pin: ArcStr,
    /// Number of copies sharing the net.
    pub count: usize,
}

/// A net driven by the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutput {
    /// The net in the parent module.
    pub net: ArcStr,
    /// The chain terminal driving the net.
    pub terminal: LoadTerminal,
    /// Consumers of the net outside the parent module.
    pub boundary: Vec<BoundaryConsumer>,
    /// Capacitance of the physical rail carrying the net.
    pub rail_cap: f64,
}

impl ChainOutput {
    /// An output with no boundary consumers or rail capacitance.
    pub fn new(net: impl Into<ArcStr>, terminal: LoadTerminal) -> Self {
        Self {
            net: net.into(),
            terminal,
            boundary: Vec::new(),
            rail_cap: 0.0,
        }
    }

    /// Adds `count` copies of `module`'s `pin` beyond the parent module.
    pub fn with_boundary_consumer(
        mut self,
        module: ModuleId,
        pin: impl Into<ArcStr>,
        count: usize,
    ) -> Self {
        self.boundary.push(BoundaryConsumer {
            module,
            pin: pin.into(),
            count,
        });
        self
    }

    /// Sets the rail capacitance.
    pub fn with_rail_cap(mut self, cap: f64) -> Self {
        self.rail_cap = cap;
        self
    }
}

/// A tunable buffer chain inside a parent module.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSpec {
    /// The configuration key holding the chain's stage sizes.
    pub name: ArcStr,
    /// The chain's role.
    pub kind: ChainKind,
    /// The module instantiating the chain.
    pub parent: ModuleId,
    /// The instance standing in for the chain.
    pub buffer_stage_inst: ArcStr,
    /// The instance driving the chain's input.
    pub driver_inst: ArcStr,
    /// The nets driven by the chain.
    pub outputs: Vec<ChainOutput>,
    /// The device each stage is built from.
    pub stage_device: DeviceKey,
}

impl ChainSpec {
    /// The number of stages configured for this chain in `sizes`.
    ///
    /// A predecode chain stores its fixed first stage in front of the tuned ones.
    pub fn default_stages(&self, sizes: &[f64]) -> usize {
        match self.kind {
            ChainKind::Predecode => sizes.len().saturating_sub(1),
            _ => sizes.len(),
        }
    }
}

/// A load attached to one chain terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalLoad {
    /// The loaded net in the parent module.
    pub pin: ArcStr,
    /// Total capacitance.
    pub cap: f64,
    /// The terminal the load hangs off.
    pub terminal: LoadTerminal,
}

/// Everything the objective needs to know about a chain's surroundings.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferLoadConfig {
    /// The chain's configuration key.
    pub chain: ArcStr,
    /// The module instantiating the chain.
    pub parent: ModuleId,
    /// The instance standing in for the chain.
    pub buffer_stage_inst: ArcStr,
    /// The instance driving the chain's input.
    pub driver_inst: ArcStr,
    /// The chain's role.
    pub kind: ChainKind,
    /// The device each stage is built from.
    pub stage_device: DeviceKey,
    /// The stage count the chain was configured with.
    pub default_stages: usize,
    /// Drive resistance of the input driver.
    pub driver_res: f64,
    /// Transconductance of the input driver.
    pub driver_gm: f64,
    /// Load on the driver's output besides the first stage.
    pub driver_load: f64,
    /// Slew at the driver's input, in seconds.
    pub slew_in: f64,
    /// Loads on the chain's outputs.
    pub loads: Vec<ExternalLoad>,
}

impl BufferLoadConfig {
    /// Total capacitance of the chain's outputs.
    pub fn total_load(&self) -> f64 {
        self.loads.iter().map(|l| l.cap).sum()
    }

    /// The stage whose output drives a load on `terminal` when the chain has
    /// `num_stages` stages.
    ///
    /// Index 0 is the driver. The configured stage count fixes which terminal is
    /// inverting; the load goes to the last stage with that polarity.
    pub fn stage_for(&self, terminal: LoadTerminal, num_stages: usize) -> usize {
        let required_inverted = (self.default_stages % 2 == 1) ^ (terminal == LoadTerminal::OutInv);
        (0..=num_stages)
            .rev()
            .find(|k| (k % 2 == 1) == required_inverted)
            .unwrap_or(0)
    }

    /// Fixed load on each of `num_stages + 1` outputs, starting with the driver.
    pub fn stage_loads(&self, num_stages: usize) -> Vec<f64> {
        let mut fixed = vec![0.0; num_stages + 1];
        fixed[0] = self.driver_load;
        for load in &self.loads {
            fixed[self.stage_for(load.terminal, num_stages)] += load.cap;
        }
        fixed
    }
}

fn check_net(lib: &Library, parent: ModuleId, net: &str) -> Result<()> {
    let m = lib.module(parent);
    if m.has_pin(net) || m.net_users(net).next().is_some() {
        Ok(())
    } else {
        Err(Error::MissingNet {
            module: m.name().clone(),
            net: net.into(),
        })
    }
}

/// Input capacitance of every instance pin on `net` except those of `skip`.
fn net_cap(model: &TimingModel<'_>, parent: ModuleId, net: &str, skip: &[usize]) -> Result<f64> {
    let lib = model.lib();
    let m = lib.module(parent);
    let mut total = 0.0;
    for (i, j) in m.net_users(net) {
        if skip.contains(&i) {
            continue;
        }
        let child = m.instances()[i].module();
        if let Some(pin) = lib.module(child).pins().get(j) {
            total += model.input_cap(child, pin, 1, 0.0, None)?.0;
        }
    }
    Ok(total)
}

/// Measures the loads of `spec` and its driver.
///
/// Fails with [`Error::NoLoad`] if the chain's outputs carry no capacitance.
pub fn extract_loads(
    spec: &ChainSpec,
    model: &TimingModel<'_>,
    default_stages: usize,
) -> Result<BufferLoadConfig> {
    let _guard = span!(Level::DEBUG, "extracting loads", chain = %spec.name).entered();
    let lib = model.lib();
    let (stage_idx, _) = lib.instance(spec.parent, &spec.buffer_stage_inst)?;
    let (driver_idx, driver) = lib.instance(spec.parent, &spec.driver_inst)?;

    let mut loads = Vec::with_capacity(spec.outputs.len());
    for output in &spec.outputs {
        check_net(lib, spec.parent, &output.net)?;
        let internal = net_cap(model, spec.parent, &output.net, &[stage_idx])?;
        let mut boundary = 0.0;
        for consumer in &output.boundary {
            boundary += model
                .input_cap(consumer.module, &consumer.pin, consumer.count, 0.0, None)?
                .0;
        }
        let cap = internal + boundary + output.rail_cap;
        tracing::debug!(
            net = %output.net,
            terminal = ?output.terminal,
            internal,
            boundary,
            rail = output.rail_cap,
            "output load"
        );
        loads.push(ExternalLoad {
            pin: output.net.clone(),
            cap,
            terminal: output.terminal,
        });
    }

    let out = model
        .resolver()
        .output_pins(driver)?
        .into_iter()
        .next()
        .ok_or_else(|| timing::Error::NoOutputPin {
            module: lib.module(driver).name().clone(),
        })?;
    let driver_res = model.driver_resistance(driver, &out, true, None, None)?.max();
    let driver_gm = model.driver_gm(driver, &out, None)?;
    let self_load = model.input_cap(driver, &out, 1, 0.0, None)?.0;
    let driver_net = lib
        .module(driver)
        .pin_index(&out)
        .and_then(|idx| {
            lib.module(spec.parent)
                .connections()
                .get(driver_idx)?
                .get(idx)
                .cloned()
        });
    let downstream = match driver_net {
        Some(net) => net_cap(model, spec.parent, &net, &[driver_idx, stage_idx])?,
        None => 0.0,
    };

    let config = BufferLoadConfig {
        chain: spec.name.clone(),
        parent: spec.parent,
        buffer_stage_inst: spec.buffer_stage_inst.clone(),
        driver_inst: spec.driver_inst.clone(),
        kind: spec.kind.clone(),
        stage_device: spec.stage_device.clone(),
        default_stages,
        driver_res,
        driver_gm,
        driver_load: self_load + downstream,
        slew_in: 0.0,
        loads,
    };
    if config.total_load() <= 0.0 {
        return Err(Error::NoLoad {
            chain: spec.name.clone(),
        });
    }
    tracing::debug!(
        chain = %spec.name,
        parent = %lib.module(spec.parent).name(),
        stage = %spec.buffer_stage_inst,
        driver = %spec.driver_inst,
        total = config.total_load(),
        driver_res,
        driver_gm,
        "extracted loads"
    );
    Ok(config)
}
