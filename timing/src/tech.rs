//! Technology parameters.

use config::Corner;
use hier::MosKind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Values that differ between n- and p-channel devices.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerPolarity {
    /// The n-channel value.
    pub n: f64,
    /// The p-channel value.
    pub p: f64,
}

impl PerPolarity {
    /// The value for the given polarity.
    #[inline]
    pub fn get(&self, kind: MosKind) -> f64 {
        match kind {
            MosKind::Nmos => self.n,
            MosKind::Pmos => self.p,
        }
    }
}

/// Capacitance per micron of effective width, per terminal, in F/µm.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalCaps {
    /// Gate capacitance.
    pub gate: f64,
    /// Drain junction capacitance.
    pub drain: f64,
    /// Source junction capacitance.
    pub source: f64,
}

/// Multipliers applied to resistance and transconductance at a corner.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerFactors {
    /// Resistance multiplier.
    pub res: f64,
    /// Transconductance multiplier.
    pub gm: f64,
}

/// Per-corner multipliers.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerTable {
    /// Typical corner.
    pub tt: CornerFactors,
    /// Fast corner.
    pub ff: CornerFactors,
    /// Slow corner.
    pub ss: CornerFactors,
}

impl Default for CornerTable {
    fn default() -> Self {
        Self {
            tt: CornerFactors { res: 1.0, gm: 1.0 },
            ff: CornerFactors { res: 0.8, gm: 1.2 },
            ss: CornerFactors { res: 1.25, gm: 0.8 },
        }
    }
}

/// Process parameters used by the analytical models.
///
/// Widths are in microns, capacitances in farads, resistances in ohms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Technology {
    /// Minimum transistor width.
    pub min_width: f64,
    /// Manufacturing grid.
    pub grid: f64,
    /// PMOS to NMOS width ratio of a balanced gate.
    pub beta: f64,
    /// Terminal capacitance per micron of width.
    pub terminal_caps: TerminalCaps,
    /// Channel resistance of a minimum-width device.
    pub unit_res: PerPolarity,
    /// Transconductance of a minimum-width device, in siemens.
    pub unit_gm: PerPolarity,
    /// Wire capacitance per square micron, by layer.
    pub layer_caps: IndexMap<String, f64>,
    /// Scale applied to extracted terminal capacitances.
    pub micron_scale: f64,
    /// Supply voltage.
    pub vdd: f64,
    /// Leakage current per micron of width, in amperes.
    pub leakage_per_um: f64,
    /// Corner multipliers.
    pub corners: CornerTable,
}

impl Default for Technology {
    fn default() -> Self {
        Self {
            min_width: 0.36,
            grid: 0.005,
            beta: 2.0,
            terminal_caps: TerminalCaps {
                gate: 1.0e-15,
                drain: 0.6e-15,
                source: 0.6e-15,
            },
            unit_res: PerPolarity { n: 9.0e3, p: 18.0e3 },
            unit_gm: PerPolarity {
                n: 1.2e-4,
                p: 0.6e-4,
            },
            layer_caps: IndexMap::from([
                ("met1".to_string(), 4.0e-17),
                ("met2".to_string(), 3.0e-17),
                ("met3".to_string(), 2.5e-17),
            ]),
            micron_scale: 1.0,
            vdd: 1.8,
            leakage_per_um: 1.0e-11,
            corners: CornerTable::default(),
        }
    }
}

impl Technology {
    /// The multipliers for `corner`.
    pub fn corner(&self, corner: Corner) -> CornerFactors {
        match corner {
            Corner::Tt => self.corners.tt,
            Corner::Ff => self.corners.ff,
            Corner::Ss => self.corners.ss,
        }
    }

    /// Wire capacitance per square micron on `layer`.
    ///
    /// Unknown layers contribute nothing.
    pub fn layer_cap(&self, layer: &str) -> f64 {
        match self.layer_caps.get(layer) {
            Some(cap) => *cap,
            None => {
                tracing::debug!(layer, "no wire capacitance for layer");
                0.0
            }
        }
    }

    /// Snaps a width to the manufacturing grid.
    pub fn snap(&self, width: f64) -> f64 {
        if self.grid > 0.0 {
            (width / self.grid).round() * self.grid
        } else {
            width
        }
    }
}
