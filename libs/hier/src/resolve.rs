//! Pin type and direction inference.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use arcstr::ArcStr;
use tracing::{span, Level};

use crate::extract::{touches, Terminal, TerminalExtractor};
use crate::{is_ground_name, is_power_name, walk, Direction, Library, ModuleId, Result};

type PinKey = (ModuleId, ArcStr);

/// Infers pin types and directions over a [`Library`].
///
/// Inferred values are memoized for the lifetime of the resolver. A resolver
/// borrows the library immutably, so the memo tables cannot outlive an edit.
pub struct PinResolver<'a> {
    lib: &'a Library,
    extractor: &'a dyn TerminalExtractor,
    types: RefCell<HashMap<PinKey, Direction>>,
    dirs: RefCell<HashMap<PinKey, Direction>>,
    fanin: RefCell<HashMap<PinKey, Vec<ArcStr>>>,
}

impl<'a> PinResolver<'a> {
    /// Creates a resolver over `lib` that consults `extractor` for undeclared pins.
    pub fn new(lib: &'a Library, extractor: &'a dyn TerminalExtractor) -> Self {
        Self {
            lib,
            extractor,
            types: RefCell::new(HashMap::new()),
            dirs: RefCell::new(HashMap::new()),
            fanin: RefCell::new(HashMap::new()),
        }
    }

    /// The library this resolver queries.
    #[inline]
    pub fn lib(&self) -> &'a Library {
        self.lib
    }

    /// Canonicalizes a pin or net name to the module's declared spelling.
    fn key(&self, module: ModuleId, name: &str) -> PinKey {
        let m = self.lib.module(module);
        let name = match m.pin_index(name) {
            Some(idx) => m.pins[idx].clone(),
            None => ArcStr::from(name),
        };
        (module, name)
    }

    /// The electrical type of a pin.
    ///
    /// Declared types win. Otherwise `vdd`-like names are [`Direction::Power`],
    /// `gnd`/`vss`-like names are [`Direction::Ground`], and anything else is
    /// classified from its transistor terminals: gate and diffusion together is
    /// [`Direction::InOut`], gate only is [`Direction::Input`], and everything
    /// else is [`Direction::Output`].
    pub fn pin_type(&self, module: ModuleId, name: &str) -> Result<Direction> {
        let m = self.lib.module(module);
        if let Some(ty) = m.declared_pin_type(name) {
            return Ok(ty);
        }
        let key = self.key(module, name);
        if let Some(ty) = self.types.borrow().get(&key) {
            return Ok(*ty);
        }

        let ty = if is_power_name(name) {
            Direction::Power
        } else if is_ground_name(name) {
            Direction::Ground
        } else {
            let caps = self.extractor.caps_for_pin(self.lib, module, name)?;
            let gate = touches(&caps, |t| t == Terminal::Gate);
            let diffusion = touches(&caps, Terminal::is_diffusion);
            match (gate, diffusion) {
                (true, true) => Direction::InOut,
                (true, false) => Direction::Input,
                _ => Direction::Output,
            }
        };
        tracing::trace!(module = %m.name, pin = name, %ty, "inferred pin type");
        self.types.borrow_mut().insert(key, ty);
        Ok(ty)
    }

    /// The `(child module, child pin)` pairs a net of `module` is connected to.
    fn child_pins(&self, module: ModuleId, net: &str) -> Vec<(usize, PinKey)> {
        let m = self.lib.module(module);
        m.net_users(net)
            .filter_map(|(i, j)| {
                let child = m.instances[i].module();
                let pin = self.lib.module(child).pins.get(j)?.clone();
                Some((i, (child, pin)))
            })
            .collect()
    }

    /// The direction of a pin as seen from the module's connectivity.
    ///
    /// If any child instance is connected to the pin, the result is the
    /// children's common direction, or [`Direction::InOut`] if they disagree.
    /// Otherwise the pin's [type](PinResolver::pin_type) is used, with supply
    /// rails resolving to [`Direction::InOut`].
    pub fn pin_dir(&self, module: ModuleId, name: &str) -> Result<Direction> {
        if is_power_name(name) || is_ground_name(name) {
            return Ok(Direction::InOut);
        }
        let key = self.key(module, name);
        let mut memo = self.dirs.borrow_mut();
        walk::evaluate(
            key,
            &mut *memo,
            |(module, net)| {
                Ok(self
                    .child_pins(*module, net)
                    .into_iter()
                    .map(|(_, k)| k)
                    .collect())
            },
            |(module, net), memo| self.compute_dir(*module, net, memo),
        )
    }

    fn compute_dir(
        &self,
        module: ModuleId,
        net: &ArcStr,
        memo: &HashMap<PinKey, Direction>,
    ) -> Result<Direction> {
        if is_power_name(net) || is_ground_name(net) {
            return Ok(Direction::InOut);
        }
        let mut found: HashSet<Direction> = HashSet::new();
        for (_, (child, pin)) in self.child_pins(module, net) {
            let dir = if is_power_name(&pin) || is_ground_name(&pin) {
                Some(Direction::InOut)
            } else {
                memo.get(&(child, pin)).copied()
            };
            if let Some(dir) = dir {
                found.insert(dir);
            }
        }
        Ok(match found.len() {
            0 => self.pin_type(module, net)?.resolve(),
            1 => found.into_iter().next().unwrap_or_default(),
            _ => Direction::InOut,
        })
    }

    fn pins_with_dir(&self, module: ModuleId, dir: Direction) -> Result<Vec<ArcStr>> {
        let mut pins = Vec::new();
        for pin in self.lib.module(module).pins() {
            if self.pin_dir(module, pin)? == dir {
                pins.push(pin.clone());
            }
        }
        Ok(pins)
    }

    /// The pins of `module` whose direction is [`Direction::Input`].
    pub fn input_pins(&self, module: ModuleId) -> Result<Vec<ArcStr>> {
        self.pins_with_dir(module, Direction::Input)
    }

    /// The pins of `module` whose direction is [`Direction::Output`].
    pub fn output_pins(&self, module: ModuleId) -> Result<Vec<ArcStr>> {
        self.pins_with_dir(module, Direction::Output)
    }

    /// The pins of `module` whose direction is [`Direction::InOut`].
    pub fn in_out_pins(&self, module: ModuleId) -> Result<Vec<ArcStr>> {
        self.pins_with_dir(module, Direction::InOut)
    }

    /// The input pins of `module` that can reach `out_pin`.
    ///
    /// For every instance connected to `out_pin`, maps the child's fan-in pins
    /// back to parent nets and keeps those that are declared pins of `module`.
    /// Internal nets are not followed. On a module where no instance uses
    /// `out_pin` this returns every input pin, which over-approximates the
    /// true fan-in.
    pub fn inputs_for_pin(&self, module: ModuleId, out_pin: &str) -> Result<Vec<ArcStr>> {
        let _guard = span!(
            Level::DEBUG,
            "backward reachability",
            module = %self.lib.module(module).name,
            pin = out_pin
        )
        .entered();
        let key = self.key(module, out_pin);
        let mut memo = self.fanin.borrow_mut();
        walk::evaluate(
            key,
            &mut *memo,
            |(module, _)| Ok(self.all_child_pins(*module)),
            |(module, net), memo| self.compute_fanin(*module, net, memo),
        )
    }

    /// Every `(child module, child pin)` pair instantiated in `module`.
    fn all_child_pins(&self, module: ModuleId) -> Vec<PinKey> {
        let mut keys = Vec::new();
        let mut seen = HashSet::new();
        for inst in self.lib.module(module).instances() {
            if !seen.insert(inst.module()) {
                continue;
            }
            for pin in self.lib.module(inst.module()).pins() {
                if !(is_power_name(pin) || is_ground_name(pin)) {
                    keys.push((inst.module(), pin.clone()));
                }
            }
        }
        keys
    }

    fn compute_fanin(
        &self,
        module: ModuleId,
        net: &ArcStr,
        memo: &HashMap<PinKey, Vec<ArcStr>>,
    ) -> Result<Vec<ArcStr>> {
        let users = self.child_pins(module, net);
        if users.is_empty() {
            return self.input_pins(module);
        }

        let m = self.lib.module(module);
        let start = net.to_ascii_lowercase();
        let mut found: HashSet<String> = HashSet::new();
        for (i, (child, pin)) in users {
            let Some(child_inputs) = memo.get(&(child, pin)) else {
                continue;
            };
            let child_module = self.lib.module(child);
            for input in child_inputs {
                let Some(parent_net) = child_module
                    .pin_index(input)
                    .and_then(|idx| m.connections.get(i)?.get(idx))
                else {
                    continue;
                };
                let lower = parent_net.to_ascii_lowercase();
                if lower != start && !is_power_name(parent_net) && !is_ground_name(parent_net) {
                    found.insert(lower);
                }
            }
        }

        Ok(m.pins
            .iter()
            .filter(|pin| found.contains(&pin.to_ascii_lowercase()))
            .cloned()
            .collect())
    }
}
