//! Capacitance, resistance, delay and power of library modules.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use arcstr::ArcStr;
use config::{Corner, RunConfig};
use hier::extract::{Terminal, TerminalExtractor};
use hier::{walk, Library, ModuleId, MosKind, PinResolver};
use tracing::{span, Level};

use crate::delay::{cal_delay_with_rc, DEFAULT_THRESHOLD};
use crate::lut::{CharacterizationLookup, LookupQuery};
use crate::tech::Technology;
use crate::{DelayData, Error, PowerData, Result};

/// `(module, pin, num_elements, wire_length bits, interpolate)`.
type CapKey = (ModuleId, ArcStr, usize, u64, bool);

/// The drive resistance of a pin.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverResistance {
    /// The largest finite resistance across polarities, or 0 if there is none.
    Max(f64),
    /// The worst-case resistance of each polarity; `f64::INFINITY` if a
    /// polarity cannot drive the pin.
    PerPolarity(BTreeMap<MosKind, f64>),
}

impl DriverResistance {
    /// The largest finite resistance, or 0 if there is none.
    pub fn max(&self) -> f64 {
        match self {
            Self::Max(r) => *r,
            Self::PerPolarity(map) => max_finite(map.values().copied()),
        }
    }
}

fn max_finite(values: impl Iterator<Item = f64>) -> f64 {
    values.filter(|r| r.is_finite()).fold(0.0, f64::max)
}

/// Analytical timing queries over a [`Library`].
///
/// Input capacitance is memoized for the lifetime of the model, which
/// borrows the library immutably.
pub struct TimingModel<'a> {
    lib: &'a Library,
    extractor: &'a dyn TerminalExtractor,
    tech: &'a Technology,
    config: &'a RunConfig,
    lookup: Option<&'a dyn CharacterizationLookup>,
    resolver: PinResolver<'a>,
    caps: RefCell<HashMap<CapKey, (f64, f64)>>,
}

impl<'a> TimingModel<'a> {
    /// Creates a timing model without characterization data.
    pub fn new(
        lib: &'a Library,
        extractor: &'a dyn TerminalExtractor,
        tech: &'a Technology,
        config: &'a RunConfig,
    ) -> Self {
        Self {
            lib,
            extractor,
            tech,
            config,
            lookup: None,
            resolver: PinResolver::new(lib, extractor),
            caps: RefCell::new(HashMap::new()),
        }
    }

    /// Consults `lookup` before computing values when characterization data is enabled.
    pub fn with_lookup(mut self, lookup: &'a dyn CharacterizationLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// The library being queried.
    #[inline]
    pub fn lib(&self) -> &'a Library {
        self.lib
    }

    /// The technology parameters.
    #[inline]
    pub fn tech(&self) -> &'a Technology {
        self.tech
    }

    /// The pin resolver used for direction queries.
    #[inline]
    pub fn resolver(&self) -> &PinResolver<'a> {
        &self.resolver
    }

    fn canonical_pin(&self, module: ModuleId, pin: &str) -> ArcStr {
        let m = self.lib.module(module);
        m.pin_index(pin)
            .map(|i| m.pins()[i].clone())
            .unwrap_or_else(|| ArcStr::from(pin))
    }

    /// Queries characterization data for `quantity` of `module`.
    fn characterized(&self, module: ModuleId, quantity: &str, interpolate: bool) -> Option<f64> {
        if !self.config.use_characterization_data {
            return None;
        }
        let lookup = self.lookup?;
        let key = self.lib.module(module).characterization()?;
        lookup.load_data(&LookupQuery {
            cell: &key.cell,
            pin: quantity,
            size: key.size,
            file_suffixes: &key.file_suffixes,
            size_suffixes: &key.size_suffixes,
            interpolate_size_suffixes: interpolate,
        })
    }

    /// Parasitic capacitance of the physical shapes of `pin`.
    pub fn wire_cap(&self, module: ModuleId, pin: &str, wire_length: f64) -> f64 {
        self.lib
            .module(module)
            .pin_shapes(pin)
            .map(|shape| {
                let wire_width = shape.width.min(shape.height);
                let length = shape.width.max(shape.height).max(wire_length);
                self.tech.layer_cap(&shape.layer) * wire_width * length
            })
            .sum()
    }

    /// Groups the instance pins on net `pin` of `module` by `(child module, child pin)`.
    fn pin_groups(&self, module: ModuleId, pin: &str) -> Vec<((ModuleId, ArcStr), usize)> {
        let m = self.lib.module(module);
        let mut groups: Vec<((ModuleId, ArcStr), usize)> = Vec::new();
        for (i, j) in m.net_users(pin) {
            let child = m.instances()[i].module();
            let Some(child_pin) = self.lib.module(child).pins().get(j) else {
                continue;
            };
            let key = (child, child_pin.clone());
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, count)) => *count += 1,
                None => groups.push((key, 1)),
            }
        }
        groups
    }

    /// The input capacitance of `pin`, as `(total_cap, cap_per_stage)`.
    ///
    /// `num_elements` identical copies of the module share the pin, which is
    /// additionally loaded by `wire_length` microns of wire. Characterization
    /// data is consulted first when enabled. Composite modules sum the
    /// capacitance of every instance pin on the net, and leaf modules sum the
    /// terminal capacitance of every transistor touching the pin.
    pub fn input_cap(
        &self,
        module: ModuleId,
        pin: &str,
        num_elements: usize,
        wire_length: f64,
        interpolate: Option<bool>,
    ) -> Result<(f64, f64)> {
        let interpolate = interpolate.unwrap_or(self.config.interpolate_characterization_data);
        let key: CapKey = (
            module,
            self.canonical_pin(module, pin),
            num_elements,
            wire_length.to_bits(),
            interpolate,
        );
        let mut memo = self.caps.borrow_mut();
        walk::evaluate(
            key,
            &mut *memo,
            |key| self.cap_deps(key),
            |key, memo| self.compute_cap(key, memo),
        )
    }

    fn cap_deps(&self, (module, pin, _, wire_length, interpolate): &CapKey) -> Result<Vec<CapKey>> {
        if self.characterized(*module, pin, *interpolate).is_some()
            || self.lib.module(*module).is_delay_primitive()
        {
            return Ok(Vec::new());
        }
        Ok(self
            .pin_groups(*module, pin)
            .into_iter()
            .flat_map(|((child, child_pin), count)| {
                [
                    (child, child_pin.clone(), 1, 0f64.to_bits(), *interpolate),
                    (child, child_pin, count, *wire_length, *interpolate),
                ]
            })
            .collect())
    }

    fn compute_cap(&self, key: &CapKey, memo: &HashMap<CapKey, (f64, f64)>) -> Result<(f64, f64)> {
        let (module, pin, num_elements, wire_length, interpolate) = key;
        let n = *num_elements as f64;
        let wire_length = f64::from_bits(*wire_length);

        if let Some(value) = self.characterized(*module, pin, *interpolate) {
            return Ok((value * n, value));
        }

        let m = self.lib.module(*module);
        let wire = self.wire_cap(*module, pin, wire_length);
        if m.is_composite() {
            let mut total = 0.0;
            for ((child, child_pin), count) in self.pin_groups(*module, pin) {
                let unscaled = memo
                    .get(&(child, child_pin.clone(), 1, 0f64.to_bits(), *interpolate))
                    .map(|(_, per_stage)| *per_stage)
                    .unwrap_or(0.0);
                let scaled = memo
                    .get(&(child, child_pin, count, key.3, *interpolate))
                    .map(|(total, _)| *total)
                    .unwrap_or(0.0);
                total += count as f64 * unscaled.max(scaled / count as f64);
            }
            let total = total * n + wire;
            return Ok((total, total));
        }

        let caps = self.extractor.caps_for_pin(self.lib, *module, pin)?;
        let unit = &self.tech.terminal_caps;
        let mut per_stage = 0.0;
        for terminals in caps.values() {
            for (terminal, tc) in terminals {
                let unit_cap = match terminal {
                    Terminal::Gate => unit.gate,
                    Terminal::Drain => unit.drain,
                    Terminal::Source => unit.source,
                    Terminal::Body => continue,
                };
                if !tc.connected {
                    continue;
                }
                per_stage += tc
                    .devices
                    .iter()
                    .map(|d| unit_cap * d.total_width())
                    .sum::<f64>();
            }
        }
        per_stage *= self.tech.micron_scale;
        Ok((per_stage * n + wire, per_stage))
    }

    /// The drive resistance of `pin`.
    ///
    /// Each conduction path costs the sum of its series devices' resistance,
    /// and each polarity is charged its worst path. With `use_max_res`, the
    /// largest finite polarity resistance is returned.
    pub fn driver_resistance(
        &self,
        module: ModuleId,
        pin: &str,
        use_max_res: bool,
        interpolate: Option<bool>,
        corner: Option<Corner>,
    ) -> Result<DriverResistance> {
        let interpolate = interpolate.unwrap_or(self.config.interpolate_characterization_data);
        let characterized = self
            .characterized(module, &format!("resistance_{pin}"), interpolate)
            .or_else(|| self.characterized(module, "resistance", interpolate));
        if let Some(r) = characterized {
            return Ok(if use_max_res {
                DriverResistance::Max(r)
            } else {
                DriverResistance::PerPolarity(MosKind::ALL.into_iter().map(|k| (k, r)).collect())
            });
        }

        let factor = self.tech.corner(corner.unwrap_or(self.config.corner)).res;
        let paths = self.extractor.res_for_pin(self.lib, module, pin)?;
        let mut per_polarity = BTreeMap::new();
        for kind in MosKind::ALL {
            let r = match paths.get(&kind) {
                Some(paths) if !paths.is_empty() => paths
                    .iter()
                    .map(|path| {
                        path.iter()
                            .map(|d| {
                                self.tech.unit_res.get(kind) * self.tech.min_width
                                    / d.total_width()
                                    * factor
                            })
                            .sum::<f64>()
                    })
                    .fold(0.0, f64::max),
                _ => f64::INFINITY,
            };
            per_polarity.insert(kind, r);
        }
        tracing::trace!(module = %self.lib.module(module).name(), pin, ?per_polarity, "driver resistance");

        Ok(if use_max_res {
            DriverResistance::Max(max_finite(per_polarity.values().copied()))
        } else {
            DriverResistance::PerPolarity(per_polarity)
        })
    }

    /// The transconductance of the weakest branch driving `pin`.
    ///
    /// Each polarity is represented by its narrowest device. Returns 0 if no
    /// device drives the pin.
    pub fn driver_gm(&self, module: ModuleId, pin: &str, corner: Option<Corner>) -> Result<f64> {
        let factor = self.tech.corner(corner.unwrap_or(self.config.corner)).gm;
        let paths = self.extractor.res_for_pin(self.lib, module, pin)?;
        let gm = MosKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let min_width = paths
                    .get(&kind)?
                    .iter()
                    .flatten()
                    .map(|d| d.total_width())
                    .reduce(f64::min)?;
                Some(self.tech.unit_gm.get(kind) * min_width / self.tech.min_width * factor)
            })
            .reduce(f64::min)
            .unwrap_or(0.0);
        Ok(gm)
    }

    fn first_output(&self, module: ModuleId) -> Result<Option<ArcStr>> {
        Ok(self.resolver.output_pins(module)?.into_iter().next())
    }

    /// Delay of a leaf module driving `load` farads from the input slew `slew` (ps).
    fn primitive_delay(&self, module: ModuleId, slew: f64, load: f64) -> Result<DelayData> {
        let out = self
            .first_output(module)?
            .ok_or_else(|| Error::NoOutputPin {
                module: self.lib.module(module).name().clone(),
            })?;
        let r = self
            .driver_resistance(module, &out, true, None, None)?
            .max();
        let (c_out, _) = self.input_cap(module, &out, 1, 0.0, None)?;
        Ok(cal_delay_with_rc(r, (c_out + load) * 1e15, slew, DEFAULT_THRESHOLD))
    }

    /// The load seen by instance `inst` of `module` on the net attached to its pin `pin_pos`.
    fn stage_load(&self, module: ModuleId, inst: usize, net: &str, load: f64) -> Result<f64> {
        let m = self.lib.module(module);
        let mut total = if m.has_pin(net) { load } else { 0.0 };
        for (i, j) in m.net_users(net) {
            if i == inst {
                continue;
            }
            let child = m.instances()[i].module();
            if let Some(pin) = self.lib.module(child).pins().get(j) {
                total += self.input_cap(child, pin, 1, 0.0, None)?.0;
            }
        }
        Ok(total)
    }

    /// Delay through `module` with input slew `slew` (ps) into `load` farads.
    ///
    /// A composite module is treated as a cascade of its instances in order,
    /// each driving the pins of the other instances on its output net.
    pub fn analytical_delay(&self, module: ModuleId, slew: f64, load: f64) -> Result<DelayData> {
        let _guard = span!(
            Level::DEBUG,
            "analytical delay",
            module = %self.lib.module(module).name()
        )
        .entered();

        struct Frame {
            module: ModuleId,
            load: f64,
            next: usize,
            slew: f64,
            acc: Option<DelayData>,
        }

        let mut stack = vec![Frame {
            module,
            load,
            next: 0,
            slew,
            acc: None,
        }];

        loop {
            let Some(frame) = stack.last_mut() else {
                unreachable!("delay worklist drained without a result");
            };
            let m = self.lib.module(frame.module);

            let result = if m.is_delay_primitive() {
                Some(self.primitive_delay(frame.module, frame.slew, frame.load)?)
            } else if frame.next >= m.instances().len() {
                Some(frame.acc.unwrap_or(DelayData::new(0.0, frame.slew)))
            } else {
                let i = frame.next;
                let Some(conns) = m.connections().get(i) else {
                    return Err(hier::Error::InstanceCount {
                        module: m.name().clone(),
                        instances: m.instances().len(),
                        connections: m.connections().len(),
                    }
                    .into());
                };
                let child = m.instances()[i].module();
                let out = self.first_output(child)?;
                let net = out
                    .and_then(|out| self.lib.module(child).pin_index(&out))
                    .and_then(|idx| conns.get(idx));
                match net {
                    Some(net) => {
                        let stage_load = self.stage_load(frame.module, i, net, frame.load)?;
                        let slew = frame.slew;
                        stack.push(Frame {
                            module: child,
                            load: stage_load,
                            next: 0,
                            slew,
                            acc: None,
                        });
                    }
                    None => frame.next += 1,
                }
                None
            };

            if let Some(result) = result {
                stack.pop();
                let Some(parent) = stack.last_mut() else {
                    return Ok(result);
                };
                parent.acc = Some(match parent.acc {
                    Some(acc) => acc + result,
                    None => result,
                });
                parent.slew = result.slew;
                parent.next += 1;
            }
        }
    }

    /// Power drawn by `module` switching at `freq` hertz into `load` farads, in nW.
    pub fn analytical_power(&self, module: ModuleId, load: f64, freq: f64) -> Result<PowerData> {
        let mut c_in = 0.0;
        for pin in self.resolver.input_pins(module)? {
            c_in += self.input_cap(module, &pin, 1, 0.0, None)?.0;
        }
        let vdd = self.tech.vdd;
        let dynamic = 0.5 * (c_in + load) * vdd * vdd * freq * 1e9;

        let mut widths = HashMap::new();
        let width = walk::evaluate(
            module,
            &mut widths,
            |id| {
                Ok::<_, Error>(
                    self.lib
                        .module(*id)
                        .instances()
                        .iter()
                        .map(|inst| inst.module())
                        .collect(),
                )
            },
            |id, memo: &HashMap<ModuleId, f64>| {
                let m = self.lib.module(*id);
                let own: f64 = m.devices().iter().map(|d| d.size().total_width()).sum();
                let children: f64 = m
                    .instances()
                    .iter()
                    .map(|inst| memo.get(&inst.module()).copied().unwrap_or(0.0))
                    .sum();
                Ok(own + children)
            },
        )?;
        let leakage = width * self.tech.leakage_per_um * vdd * 1e9;
        Ok(PowerData::new(dynamic, leakage))
    }
}
