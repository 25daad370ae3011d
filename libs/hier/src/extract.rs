//! Transistor-level terminal connectivity.
//!
//! The [`TerminalExtractor`] trait is the interface through which the
//! timing models obtain per-transistor sizing for the terminals a pin
//! touches, and the series/parallel conduction paths a pin drives through.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

use crate::{Library, ModuleId, Result};

/// Transistor polarity.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum MosKind {
    /// An n-channel device.
    #[serde(rename = "n")]
    Nmos,
    /// A p-channel device.
    #[serde(rename = "p")]
    Pmos,
}

impl MosKind {
    /// Both polarities, p first.
    pub const ALL: [MosKind; 2] = [MosKind::Pmos, MosKind::Nmos];
}

impl Display for MosKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nmos => write!(f, "n"),
            Self::Pmos => write!(f, "p"),
        }
    }
}

/// A transistor terminal.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Terminal {
    /// Drain.
    Drain,
    /// Gate.
    Gate,
    /// Source.
    Source,
    /// Body.
    Body,
}

impl Terminal {
    /// Returns `true` for drain and source.
    #[inline]
    pub fn is_diffusion(self) -> bool {
        matches!(self, Self::Drain | Self::Source)
    }
}

/// The `(mult, fingers, width)` sizing of one transistor.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSize {
    /// Device multiplier.
    pub mult: u32,
    /// Number of fingers.
    pub fingers: u32,
    /// Width of a single finger, in microns.
    pub width: f64,
}

impl DeviceSize {
    /// The total effective width `m * nf * w`.
    #[inline]
    pub fn total_width(&self) -> f64 {
        self.mult as f64 * self.fingers as f64 * self.width
    }
}

/// The devices attached to a pin through a single terminal type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerminalCaps {
    /// Whether any device connects to the pin through this terminal.
    pub connected: bool,
    /// Sizing of every such device.
    pub devices: Vec<DeviceSize>,
}

/// Per-polarity, per-terminal devices attached to a pin.
pub type PinCaps = BTreeMap<MosKind, BTreeMap<Terminal, TerminalCaps>>;

/// Per-polarity conduction paths from a pin to a rail.
///
/// The outer list holds parallel paths; each inner list holds the
/// devices in series along one path.
pub type ConductionPaths = BTreeMap<MosKind, Vec<Vec<DeviceSize>>>;

/// Extracts transistor terminal connectivity for the pins of a module.
pub trait TerminalExtractor {
    /// The pins of the module, in subcircuit order.
    fn pins(&self, lib: &Library, module: ModuleId) -> Result<Vec<ArcStr>>;

    /// The devices whose terminals touch `pin`.
    fn caps_for_pin(&self, lib: &Library, module: ModuleId, pin: &str) -> Result<PinCaps>;

    /// The conduction paths through which `pin` is driven.
    fn res_for_pin(&self, lib: &Library, module: ModuleId, pin: &str)
        -> Result<ConductionPaths>;
}

/// Returns `true` if any device of any polarity connects to the pin through `terminal`.
pub fn touches(caps: &PinCaps, pred: impl Fn(Terminal) -> bool) -> bool {
    caps.values()
        .flat_map(|terms| terms.iter())
        .any(|(terminal, tc)| pred(*terminal) && tc.connected)
}
