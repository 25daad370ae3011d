//! Parameterized device generators used to sample buffer stages.
//!
//! Devices are looked up by class name in a [`DeviceRegistry`] built once per
//! session. Each class maps to a factory that lays out the transistors of one
//! instance at a requested size.

use std::fmt::{Display, Formatter};

use arcstr::ArcStr;
use hier::{Direction, Module, MosKind, Mosfet};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use timing::Technology;

use crate::{Error, Result};

/// Width ratio applied on top of the technology's beta by the skewed variants.
pub const SKEW_RATIO: f64 = 1.5;

/// A device class and electrical variant.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DeviceKey {
    /// The device class, such as `pinv`.
    pub class: ArcStr,
    /// The electrical variant: `""`, `"skew_rise"` or `"skew_fall"`.
    pub variant: ArcStr,
}

impl DeviceKey {
    /// A key for the balanced variant of `class`.
    pub fn new(class: impl Into<ArcStr>) -> Self {
        Self {
            class: class.into(),
            variant: ArcStr::new(),
        }
    }

    /// Sets the variant.
    pub fn with_variant(mut self, variant: impl Into<ArcStr>) -> Self {
        self.variant = variant.into();
        self
    }

    /// The PMOS to NMOS width ratio of this variant.
    pub fn beta(&self, tech: &Technology) -> Result<f64> {
        match self.variant.as_str() {
            "" => Ok(tech.beta),
            "skew_rise" => Ok(tech.beta * SKEW_RATIO),
            "skew_fall" => Ok(tech.beta / SKEW_RATIO),
            _ => Err(Error::UnknownDevice {
                class: arcstr::format!("{self}"),
            }),
        }
    }
}

impl Display for DeviceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.variant.is_empty() {
            write!(f, "{}", self.class)
        } else {
            write!(f, "{}_{}", self.class, self.variant)
        }
    }
}

/// A request for one device instance.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRequest {
    /// The device to build.
    pub key: DeviceKey,
    /// The requested size, in multiples of the unit device.
    pub size: f64,
}

impl DeviceRequest {
    /// Creates a request.
    pub fn new(key: DeviceKey, size: f64) -> Self {
        Self { key, size }
    }

    /// A module name unique to this key and size.
    pub fn module_name(&self) -> ArcStr {
        let size = format!("{:.4}", self.size).replace('.', "p");
        arcstr::format!("{}_{size}", self.key)
    }
}

/// Builds a device module.
pub type DeviceFactory = fn(&DeviceRequest, &Technology) -> Result<Module>;

/// How sample sizes are spread across a device's range.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Spacing {
    /// Evenly spaced in log space.
    Log,
    /// Evenly spaced.
    Linear,
}

impl Spacing {
    /// Returns `n` sizes from `lo` to `hi`, inclusive.
    pub fn sample(self, lo: f64, hi: f64, n: usize) -> Vec<f64> {
        if n < 2 || hi <= lo {
            return vec![lo];
        }
        let step = |i: usize| i as f64 / (n - 1) as f64;
        match self {
            Self::Log => {
                let (llo, lhi) = (lo.ln(), hi.ln());
                (0..n).map(|i| (llo + (lhi - llo) * step(i)).exp()).collect()
            }
            Self::Linear => (0..n).map(|i| lo + (hi - lo) * step(i)).collect(),
        }
    }
}

/// Which configured bound limits a device's sampled sizes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum SizeBound {
    /// `max_buf_size`.
    Buffer,
    /// `max_precharge_size`.
    Precharge,
}

/// A registered device class.
#[derive(Debug, Clone)]
pub struct DeviceFamily {
    /// Builds instances.
    pub factory: DeviceFactory,
    /// Sample spacing.
    pub spacing: Spacing,
    /// The bound limiting sampled sizes.
    pub bound: SizeBound,
    /// The pin whose capacitance is the device's input load.
    pub input: ArcStr,
    /// The driven pin.
    pub output: ArcStr,
    /// Width of the first device at size 1, in minimum widths.
    pub reference_scale: f64,
}

impl DeviceFamily {
    /// The size realized by a built module, after clamping and grid snapping.
    pub fn realized_size(&self, module: &Module, tech: &Technology) -> f64 {
        module
            .devices()
            .first()
            .map(|d| d.size().total_width() / (tech.min_width * self.reference_scale))
            .unwrap_or(0.0)
    }
}

/// Maps device class names to factories.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    families: IndexMap<ArcStr, DeviceFamily>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(
            "pinv",
            DeviceFamily {
                factory: pinv,
                spacing: Spacing::Log,
                bound: SizeBound::Buffer,
                input: arcstr::literal!("A"),
                output: arcstr::literal!("Z"),
                reference_scale: 1.0,
            },
        );
        registry.register(
            "pnand2",
            DeviceFamily {
                factory: pnand2,
                spacing: Spacing::Log,
                bound: SizeBound::Buffer,
                input: arcstr::literal!("A"),
                output: arcstr::literal!("Z"),
                reference_scale: 2.0,
            },
        );
        registry.register(
            "precharge",
            DeviceFamily {
                factory: precharge,
                spacing: Spacing::Linear,
                bound: SizeBound::Precharge,
                input: arcstr::literal!("en_bar"),
                output: arcstr::literal!("bl"),
                reference_scale: 1.0,
            },
        );
        registry
    }
}

impl DeviceRegistry {
    /// A registry without any device classes.
    pub fn empty() -> Self {
        Self {
            families: IndexMap::new(),
        }
    }

    /// Registers `family` under `class`, replacing any previous registration.
    pub fn register(&mut self, class: impl Into<ArcStr>, family: DeviceFamily) {
        self.families.insert(class.into(), family);
    }

    /// Gets the family of `class`.
    pub fn get(&self, class: &str) -> Result<&DeviceFamily> {
        self.families.get(class).ok_or_else(|| Error::UnknownDevice {
            class: class.into(),
        })
    }

    /// Builds the module for `req`.
    pub fn build(&self, req: &DeviceRequest, tech: &Technology) -> Result<Module> {
        let family = self.get(&req.key.class)?;
        (family.factory)(req, tech)
    }
}

/// A width of `scale` minimum widths, clamped to the minimum and snapped to the grid.
fn width(tech: &Technology, scale: f64) -> f64 {
    tech.snap((tech.min_width * scale).max(tech.min_width))
}

fn pinv(req: &DeviceRequest, tech: &Technology) -> Result<Module> {
    let beta = req.key.beta(tech)?;
    let nw = width(tech, req.size);
    let pw = width(tech, nw / tech.min_width * beta);

    let mut m = Module::new(req.module_name());
    m.add_pin_list(
        ["A", "Z", "vdd", "gnd"],
        &[
            Direction::Input,
            Direction::Output,
            Direction::Power,
            Direction::Ground,
        ],
    )?;
    m.add_device(Mosfet::new("MN0", MosKind::Nmos, ["Z", "A", "gnd", "gnd"], nw));
    m.add_device(Mosfet::new("MP0", MosKind::Pmos, ["Z", "A", "vdd", "vdd"], pw));
    Ok(m)
}

fn pnand2(req: &DeviceRequest, tech: &Technology) -> Result<Module> {
    let beta = req.key.beta(tech)?;
    // Series NMOS are doubled to match the inverter's pull-down.
    let nw = width(tech, 2.0 * req.size);
    let pw = width(tech, nw / (2.0 * tech.min_width) * beta);

    let mut m = Module::new(req.module_name());
    m.add_pin_list(
        ["A", "B", "Z", "vdd", "gnd"],
        &[
            Direction::Input,
            Direction::Input,
            Direction::Output,
            Direction::Power,
            Direction::Ground,
        ],
    )?;
    m.add_device(Mosfet::new("MN0", MosKind::Nmos, ["Z", "A", "x", "gnd"], nw));
    m.add_device(Mosfet::new("MN1", MosKind::Nmos, ["x", "B", "gnd", "gnd"], nw));
    m.add_device(Mosfet::new("MP0", MosKind::Pmos, ["Z", "A", "vdd", "vdd"], pw));
    m.add_device(Mosfet::new("MP1", MosKind::Pmos, ["Z", "B", "vdd", "vdd"], pw));
    Ok(m)
}

fn precharge(req: &DeviceRequest, tech: &Technology) -> Result<Module> {
    let w = width(tech, req.size);

    let mut m = Module::new(req.module_name());
    m.add_pin_list(
        ["en_bar", "bl", "br", "vdd"],
        &[
            Direction::Input,
            Direction::InOut,
            Direction::InOut,
            Direction::Power,
        ],
    )?;
    m.add_device(Mosfet::new("MP0", MosKind::Pmos, ["bl", "en_bar", "vdd", "vdd"], w));
    m.add_device(Mosfet::new("MP1", MosKind::Pmos, ["br", "en_bar", "vdd", "vdd"], w));
    m.add_device(Mosfet::new("MP2", MosKind::Pmos, ["bl", "en_bar", "br", "vdd"], w));
    Ok(m)
}
