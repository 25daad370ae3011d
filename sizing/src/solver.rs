//! Box-constrained minimization.
//!
//! [`minimize_box`] is a spectral projected gradient method: each iteration
//! steps along the negative gradient scaled by a Barzilai-Borwein step length,
//! projects back into the box and backtracks until the Armijo condition holds.
//! Gradients are estimated with central differences.

/// Solver settings.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SolverOptions {
    /// Iteration limit.
    pub max_iterations: usize,
    /// Convergence threshold on the projected gradient's largest component.
    pub gradient_tolerance: f64,
    /// Convergence threshold on the relative objective decrease.
    pub value_tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            gradient_tolerance: 1e-6,
            value_tolerance: 1e-12,
        }
    }
}

/// The outcome of a minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverResult {
    /// The best point found.
    pub x: Vec<f64>,
    /// The objective at `x`.
    pub value: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// Whether a convergence test was met before the iteration limit.
    pub converged: bool,
}

const ARMIJO: f64 = 1e-4;
const MIN_STEP: f64 = 1e-10;
const MAX_STEP: f64 = 1e10;

fn project(x: &mut [f64], lower: &[f64], upper: &[f64]) {
    for ((xi, lo), hi) in x.iter_mut().zip(lower).zip(upper) {
        *xi = xi.clamp(*lo, *hi);
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(a, b)| a * b).sum()
}

fn gradient(f: &impl Fn(&[f64]) -> f64, x: &[f64], lower: &[f64], upper: &[f64]) -> Vec<f64> {
    let mut probe = x.to_vec();
    (0..x.len())
        .map(|i| {
            let h = 1e-6 * x[i].abs().max(1.0);
            let hi = (x[i] + h).min(upper[i]);
            let lo = (x[i] - h).max(lower[i]);
            if hi <= lo {
                return 0.0;
            }
            probe[i] = hi;
            let fh = f(&probe);
            probe[i] = lo;
            let fl = f(&probe);
            probe[i] = x[i];
            (fh - fl) / (hi - lo)
        })
        .collect()
}

/// Minimizes `f` over the box `[lower, upper]` starting from `x0`.
///
/// The returned point is always feasible. If the iteration limit is reached
/// first, the best point so far is returned with `converged` unset.
pub fn minimize_box(
    f: impl Fn(&[f64]) -> f64,
    x0: &[f64],
    lower: &[f64],
    upper: &[f64],
    options: SolverOptions,
) -> SolverResult {
    let mut x = x0.to_vec();
    project(&mut x, lower, upper);
    let mut value = f(&x);
    let mut g = gradient(&f, &x, lower, upper);
    let mut step = 1.0;

    for iteration in 0..options.max_iterations {
        let mut pg: Vec<f64> = x.iter().zip(&g).map(|(x, g)| x - g).collect();
        project(&mut pg, lower, upper);
        let pg_norm = pg
            .iter()
            .zip(&x)
            .map(|(p, x)| (p - x).abs())
            .fold(0.0, f64::max);
        if pg_norm <= options.gradient_tolerance {
            return SolverResult {
                x,
                value,
                iterations: iteration,
                converged: true,
            };
        }

        let mut d: Vec<f64> = x.iter().zip(&g).map(|(x, g)| x - step * g).collect();
        project(&mut d, lower, upper);
        for (di, xi) in d.iter_mut().zip(&x) {
            *di -= xi;
        }
        let slope = dot(&g, &d);

        let mut lambda = 1.0;
        let (next, next_value) = loop {
            let candidate: Vec<f64> = x.iter().zip(&d).map(|(x, d)| x + lambda * d).collect();
            let candidate_value = f(&candidate);
            if candidate_value <= value + ARMIJO * lambda * slope {
                break (candidate, candidate_value);
            }
            lambda *= 0.5;
            if lambda < MIN_STEP {
                return SolverResult {
                    x,
                    value,
                    iterations: iteration + 1,
                    converged: true,
                };
            }
        };

        let next_g = gradient(&f, &next, lower, upper);
        let s: Vec<f64> = next.iter().zip(&x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = next_g.iter().zip(&g).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        step = if sy > 0.0 {
            (dot(&s, &s) / sy).clamp(MIN_STEP, MAX_STEP)
        } else {
            MAX_STEP
        };

        let decrease = value - next_value;
        x = next;
        g = next_g;
        value = next_value;
        if decrease.abs() <= options.value_tolerance * value.abs().max(1.0) {
            return SolverResult {
                x,
                value,
                iterations: iteration + 1,
                converged: true,
            };
        }
    }

    SolverResult {
        x,
        value,
        iterations: options.max_iterations,
        converged: false,
    }
}
