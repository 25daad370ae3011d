//! Size-dependent device parameter curves.

use arcstr::ArcStr;
use config::RunConfig;
use hier::{Library, ModuleId};
use indexmap::IndexMap;
use spice::DeviceExtractor;
use splines::{Interpolation, Key, Spline};
use timing::{Technology, TimingModel};
use tracing::{span, Level};

use crate::devices::{DeviceKey, DeviceRegistry, DeviceRequest, SizeBound};
use crate::error::FitError;
use crate::{Error, Result};

/// Relative spread below which a sample cloud is considered flat.
const FLAT_TOLERANCE: f64 = 1e-9;

/// Reduces samples to the vertices of their lower convex hull.
///
/// `xs` must be strictly increasing. The walk starts at index 0 and always
/// ends at the last index; among collinear candidates the farthest is taken.
pub fn create_convex_fit(xs: &[f64], ys: &[f64]) -> Result<Vec<usize>, FitError> {
    let n = xs.len().min(ys.len());
    if xs[..n].iter().chain(&ys[..n]).any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }
    if n < 2 || xs[..n].windows(2).any(|w| w[1] <= w[0]) {
        return Err(FitError::Degenerate);
    }
    let (lo, hi) = ys[..n]
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &y| {
            (lo.min(y), hi.max(y))
        });
    if hi - lo <= FLAT_TOLERANCE * hi.abs().max(lo.abs()) {
        return Err(FitError::Degenerate);
    }

    let mut hull = vec![0];
    let mut i = 0;
    while i < n - 1 {
        let mut best = i + 1;
        let mut best_slope = f64::INFINITY;
        for j in i + 1..n {
            let slope = (ys[j] - ys[i]) / (xs[j] - xs[i]);
            if slope <= best_slope + FLAT_TOLERANCE * best_slope.abs() {
                best = j;
                best_slope = slope;
            }
        }
        hull.push(best);
        i = best;
    }
    Ok(hull)
}

/// Piecewise-linear interpolation through `(xs, ys)`.
///
/// Returns `ys[k]` exactly when `x == xs[k]`. Outside the sample range the
/// two nearest samples are extended.
pub fn linear_interpolate(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    match n {
        0 => return f64::NAN,
        1 => return ys[0],
        _ => {}
    }
    if let Some(k) = xs[..n].iter().position(|&xk| xk == x) {
        return ys[k];
    }
    let i = xs[..n].partition_point(|&xk| xk < x).clamp(1, n - 1);
    let (x0, x1, y0, y1) = (xs[i - 1], xs[i], ys[i - 1], ys[i]);
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

/// One parameter fitted against size.
#[derive(Debug, Clone)]
pub struct ParamFit {
    xs: Vec<f64>,
    ys: Vec<f64>,
    spline: Spline<f64, f64>,
    floor: f64,
}

impl ParamFit {
    /// Fits samples sorted by increasing `xs`.
    ///
    /// A degenerate sample cloud falls back to a line through the end points,
    /// and a single sample to a constant.
    pub fn new(xs: &[f64], ys: &[f64]) -> Result<Self, FitError> {
        let n = xs.len().min(ys.len());
        match n {
            0 => return Err(FitError::Degenerate),
            1 => return Self::constant(xs[0], ys[0]),
            _ => {}
        }
        let hull = match create_convex_fit(xs, ys) {
            Ok(hull) => hull,
            Err(FitError::Degenerate) => {
                tracing::debug!(samples = n, "degenerate convex fit, using end points");
                vec![0, n - 1]
            }
            Err(e) => return Err(e),
        };
        let xs: Vec<f64> = hull.iter().map(|&i| xs[i]).collect();
        let ys: Vec<f64> = hull.iter().map(|&i| ys[i]).collect();

        // Cubic segments need a neighbor on each side.
        let last = xs.len() - 1;
        let keys = xs
            .iter()
            .zip(&ys)
            .enumerate()
            .map(|(i, (&x, &y))| {
                let interpolation = if i == 0 || i + 1 >= last {
                    Interpolation::Linear
                } else {
                    Interpolation::CatmullRom
                };
                Key::new(x, y, interpolation)
            })
            .collect();

        let floor = ys.iter().copied().map(f64::abs).fold(f64::INFINITY, f64::min) * 1e-3;
        Ok(Self {
            xs,
            ys,
            spline: Spline::from_vec(keys),
            floor,
        })
    }

    fn constant(x: f64, y: f64) -> Result<Self, FitError> {
        if !(x.is_finite() && y.is_finite()) {
            return Err(FitError::NonFinite);
        }
        tracing::debug!(size = x, "single distinct sample, using a constant fit");
        Ok(Self {
            xs: vec![x],
            ys: vec![y],
            spline: Spline::from_vec(vec![Key::new(x, y, Interpolation::Linear)]),
            floor: y.abs() * 1e-3,
        })
    }

    /// The sizes retained by the convex reduction.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.xs.iter().copied().zip(self.ys.iter().copied())
    }

    /// Evaluates the fit at `size`.
    ///
    /// Inside the sampled range the spline is used; outside it the nearest
    /// two retained points are extended. Results never fall below a small
    /// positive floor.
    pub fn evaluate(&self, size: f64) -> f64 {
        if let [y] = self.ys[..] {
            return y.max(self.floor);
        }
        let (first, last) = (self.xs[0], self.xs[self.xs.len() - 1]);
        let value = if (first..=last).contains(&size) {
            self.spline
                .clamped_sample(size)
                .unwrap_or_else(|| linear_interpolate(size, &self.xs, &self.ys))
        } else {
            linear_interpolate(size, &self.xs, &self.ys)
        };
        value.max(self.floor)
    }
}

/// Electrical parameters of one device instance.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct InstanceParams {
    /// Input capacitance.
    pub cin: f64,
    /// Output self-load capacitance.
    pub cout: f64,
    /// Worst-case drive resistance.
    pub resistance: f64,
    /// Transconductance of the weakest drive branch.
    pub gm: f64,
}

/// Fitted curves of one device key.
#[derive(Debug, Clone)]
pub struct FitRecord {
    /// The sizes actually realized by the sampled devices.
    pub actual_sizes: Vec<f64>,
    /// Input capacitance versus size.
    pub cin: ParamFit,
    /// Output capacitance versus size.
    pub cout: ParamFit,
    /// Drive resistance versus size.
    pub resistance: ParamFit,
    /// Transconductance versus size.
    pub gm: ParamFit,
}

impl FitRecord {
    /// Fits measured samples, given as `(size, params)` sorted by size.
    pub fn from_samples(samples: &[(f64, InstanceParams)]) -> Result<Self, FitError> {
        let xs: Vec<f64> = samples.iter().map(|(s, _)| *s).collect();
        let column = |f: fn(&InstanceParams) -> f64| -> Vec<f64> {
            samples.iter().map(|(_, p)| f(p)).collect()
        };
        Ok(Self {
            cin: ParamFit::new(&xs, &column(|p| p.cin))?,
            cout: ParamFit::new(&xs, &column(|p| p.cout))?,
            resistance: ParamFit::new(&xs, &column(|p| p.resistance))?,
            gm: ParamFit::new(&xs, &column(|p| p.gm))?,
            actual_sizes: xs,
        })
    }

    /// Estimates the parameters of a device of the given size.
    pub fn evaluate(&self, size: f64) -> InstanceParams {
        InstanceParams {
            cin: self.cin.evaluate(size),
            cout: self.cout.evaluate(size),
            resistance: self.resistance.evaluate(size),
            gm: self.gm.evaluate(size),
        }
    }
}

/// Fitted curves for a set of device keys.
#[derive(Debug, Clone, Default)]
pub struct FitSet {
    records: IndexMap<DeviceKey, FitRecord>,
}

impl FitSet {
    /// Samples, measures and fits every key in `keys`.
    ///
    /// Devices are built in a scratch library that is dropped on return.
    /// Sizes that round to an already sampled size are skipped.
    pub fn build<'k>(
        keys: impl IntoIterator<Item = &'k DeviceKey>,
        registry: &DeviceRegistry,
        tech: &Technology,
        config: &RunConfig,
    ) -> Result<Self> {
        let _guard = span!(Level::INFO, "fitting device curves").entered();

        let mut lib = Library::new("fit_scratch");
        let mut built: Vec<(DeviceKey, Vec<(f64, ModuleId)>)> = Vec::new();
        for key in keys {
            if built.iter().any(|(k, _)| k == key) {
                continue;
            }
            let family = registry.get(&key.class)?;
            let upper = match family.bound {
                SizeBound::Buffer => config.max_buf_size,
                SizeBound::Precharge => config.max_precharge_size,
            };
            let mut samples: Vec<(f64, ModuleId)> = Vec::new();
            for size in family.spacing.sample(1.0, upper, config.num_fit_samples) {
                let module = registry.build(&DeviceRequest::new(key.clone(), size), tech)?;
                let actual = family.realized_size(&module, tech);
                if samples
                    .iter()
                    .any(|(s, _)| (s - actual).abs() <= 1e-9 * actual.abs().max(1.0))
                {
                    tracing::trace!(%key, size, actual, "skipping duplicate sample");
                    continue;
                }
                samples.push((actual, lib.add_module(module)));
            }
            samples.sort_by(|a, b| a.0.total_cmp(&b.0));
            built.push((key.clone(), samples));
        }

        let extractor = DeviceExtractor::new();
        let model = TimingModel::new(&lib, &extractor, tech, config);
        let mut records = IndexMap::new();
        for (key, samples) in built {
            let family = registry.get(&key.class)?;
            let mut measured = Vec::with_capacity(samples.len());
            for (size, id) in samples {
                let params = measure(&model, id, &family.input, &family.output)?;
                measured.push((size, params));
            }
            let record = FitRecord::from_samples(&measured)?;
            tracing::debug!(%key, samples = measured.len(), "fitted device curves");
            records.insert(key, record);
        }
        Ok(Self { records })
    }

    /// Adds or replaces the record of `key`.
    pub fn insert(&mut self, key: DeviceKey, record: FitRecord) {
        self.records.insert(key, record);
    }

    /// The record of `key`.
    pub fn get(&self, key: &DeviceKey) -> Result<&FitRecord> {
        self.records.get(key).ok_or_else(|| Error::UnknownDevice {
            class: arcstr::format!("{key}"),
        })
    }

    /// Evaluates the parameters of `key` at `size`.
    pub fn evaluate(&self, key: &DeviceKey, size: f64) -> Result<InstanceParams> {
        Ok(self.get(key)?.evaluate(size))
    }
}

fn measure(
    model: &TimingModel<'_>,
    id: ModuleId,
    input: &ArcStr,
    output: &ArcStr,
) -> Result<InstanceParams> {
    Ok(InstanceParams {
        cin: model.input_cap(id, input, 1, 0.0, Some(false))?.0,
        cout: model.input_cap(id, output, 1, 0.0, Some(false))?.0,
        resistance: model
            .driver_resistance(id, output, true, Some(false), None)?
            .max(),
        gm: model.driver_gm(id, output, None)?,
    })
}
