//! The delay and area objective of a buffer chain.

use timing::delay::{horowitz_delay, DEFAULT_THRESHOLD};
use timing::DelayData;

use crate::fit::{FitRecord, FitSet};
use crate::loads::{BufferLoadConfig, ChainKind};
use crate::Result;

/// Scale converting seconds to the picoseconds the objective is expressed in.
pub const DELAY_SCALE: f64 = 1e12;

/// Delay of a driver with resistance `res` and transconductance `gm` into `load`.
///
/// A stage with no time constant passes the input slew through.
pub fn stage_delay(res: f64, gm: f64, load: f64, slew_in: f64) -> DelayData {
    let tau = res * load;
    if !(tau > 0.0) {
        return DelayData::new(0.0, slew_in);
    }
    let beta = 1.0 / (gm * res);
    let alpha = slew_in / tau;
    horowitz_delay(tau, beta, alpha, DEFAULT_THRESHOLD)
}

struct PrechargeTerm<'a> {
    fit: &'a FitRecord,
    num_cols: f64,
    bitline_cap: f64,
}

/// The objective of one chain at a fixed stage count.
///
/// Decision variables are the stage sizes, followed by the precharge device
/// size for precharge chains.
pub struct ChainObjective<'a> {
    stage: &'a FitRecord,
    precharge: Option<PrechargeTerm<'a>>,
    driver_res: f64,
    driver_gm: f64,
    slew_in: f64,
    fixed: Vec<f64>,
    penalty: f64,
}

impl<'a> ChainObjective<'a> {
    /// Builds the objective for `fixed.len() - 1` stages.
    ///
    /// `fixed[0]` is the load on the driver besides the first stage, and
    /// `fixed[k]` the external load on stage `k`.
    pub fn new(
        problem: &BufferLoadConfig,
        fixed: Vec<f64>,
        fits: &'a FitSet,
        penalty: f64,
    ) -> Result<Self> {
        let precharge = match &problem.kind {
            ChainKind::Precharge {
                device,
                num_cols,
                bitline_cap,
            } => Some(PrechargeTerm {
                fit: fits.get(device)?,
                num_cols: *num_cols as f64,
                bitline_cap: *bitline_cap,
            }),
            _ => None,
        };
        Ok(Self {
            stage: fits.get(&problem.stage_device)?,
            precharge,
            driver_res: problem.driver_res,
            driver_gm: problem.driver_gm,
            slew_in: problem.slew_in,
            fixed,
            penalty,
        })
    }

    /// The number of buffer stages.
    pub fn num_stages(&self) -> usize {
        self.fixed.len().saturating_sub(1)
    }

    /// The number of decision variables.
    pub fn num_vars(&self) -> usize {
        self.num_stages() + usize::from(self.precharge.is_some())
    }

    /// Whether the last decision variable is the precharge size.
    pub fn has_precharge(&self) -> bool {
        self.precharge.is_some()
    }

    /// The fixed per-stage loads.
    pub fn fixed_loads(&self) -> &[f64] {
        &self.fixed
    }

    /// Total delay through the chain, in seconds.
    pub fn delay(&self, x: &[f64]) -> DelayData {
        let n = self.num_stages();
        let params: Vec<_> = x[..n].iter().map(|&s| self.stage.evaluate(s)).collect();
        let precharge = self
            .precharge
            .as_ref()
            .zip(x.get(n))
            .map(|(term, &p)| (term, term.fit.evaluate(p)));

        let mut total = DelayData::new(0.0, self.slew_in);
        for k in 0..=n {
            let mut load = self.fixed[k];
            if let Some(next) = params.get(k) {
                load += next.cin;
            }
            if k == n {
                if let Some((term, pre)) = &precharge {
                    load += term.num_cols * pre.cin;
                }
            }
            let (res, gm) = match k.checked_sub(1) {
                None => (self.driver_res, self.driver_gm),
                Some(i) => {
                    load += params[i].cout;
                    (params[i].resistance, params[i].gm)
                }
            };
            total += stage_delay(res, gm, load, total.slew);
        }

        if let Some((term, pre)) = &precharge {
            total += stage_delay(
                pre.resistance,
                pre.gm,
                pre.cout + term.bitline_cap,
                total.slew,
            );
        }
        total
    }

    /// Evaluates the objective: delay in picoseconds plus the weighted size sum.
    pub fn value(&self, x: &[f64]) -> f64 {
        self.delay(x).delay * DELAY_SCALE + self.penalty * x.iter().sum::<f64>()
    }
}
