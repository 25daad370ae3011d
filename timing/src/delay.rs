//! Closed-form delay equations.

use crate::DelayData;

/// The switching threshold used when none is given, as a fraction of the swing.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Horowitz's delay model for a single RC stage.
///
/// `tau` is the stage time constant, `beta` is `1 / (gm * r)` of the driver and
/// `alpha` is the ratio of the input slew to `tau`.
///
/// ```
/// use timing::delay::horowitz_delay;
/// let d = horowitz_delay(1.0, 0.5, 0.0, 0.5);
/// assert!((d.delay - 2f64.ln()).abs() < 1e-12);
/// assert!((d.slew - 2.0 * d.delay).abs() < 1e-12);
/// ```
pub fn horowitz_delay(tau: f64, beta: f64, alpha: f64, threshold: f64) -> DelayData {
    let vs = threshold;
    let delay = tau * (vs.ln().powi(2) + 2.0 * alpha * beta * (1.0 - vs)).sqrt();
    DelayData::new(delay, delay / (1.0 - vs))
}

/// Delay of a driver into a distributed RC line of `num_stages` identical segments.
///
/// Returns the empirical Elmore-style estimate
/// `0.69 * driver_res * total_c + 0.38 * total_r * total_distributed_c`
/// with output slew `total_r * total_c`. A Horowitz estimate of the same stage
/// is computed alongside and only traced.
#[allow(clippy::too_many_arguments)]
pub fn distributed_delay(
    cap_per_stage: f64,
    res_per_stage: f64,
    num_stages: usize,
    driver_res: f64,
    driver_gm: f64,
    other_caps: f64,
    slew_in: f64,
) -> DelayData {
    let n = num_stages as f64;
    let total_distributed_c = cap_per_stage * n;
    let total_c = total_distributed_c + other_caps;
    let total_r = res_per_stage * n;

    let tau = (driver_res + total_r) * total_c;
    let beta = 1.0 / (driver_gm * driver_res);
    let alpha = slew_in / tau;
    let horowitz = horowitz_delay(tau, beta, alpha, DEFAULT_THRESHOLD);
    tracing::trace!(?horowitz, "horowitz estimate for distributed line");

    let delay = 0.69 * driver_res * total_c + 0.38 * total_r * total_distributed_c;
    DelayData::new(delay, total_r * total_c)
}

/// Delay of a lumped RC stage with a step input.
pub fn simple_rc_delay(tau: f64, threshold: f64) -> DelayData {
    let delay = (1.0 / (1.0 - threshold)).ln() * tau;
    DelayData::new(delay, tau * 9f64.ln())
}

/// Delay of a driver with resistance `r` (ohms) into capacitance `c` (fF), in ps.
///
/// The output slew couples weakly to the input slew.
pub fn cal_delay_with_rc(r: f64, c: f64, slew_in: f64, swing: f64) -> DelayData {
    let delay = (1.0 - swing).ln().abs() * r * c * 0.001;
    DelayData::new(delay, 1.2 * delay + 0.005 * slew_in)
}
