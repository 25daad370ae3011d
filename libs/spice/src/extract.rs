//! Terminal extraction over flattened transistor netlists.
//!
//! A module is flattened into a single list of [`Mosfet`]s, with internal nets
//! of child instances renamed `inst/net` and child pins mapped onto the parent
//! nets they are connected to. Pin queries are then answered on the flat list.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use arcstr::ArcStr;
use hier::extract::{ConductionPaths, DeviceSize, PinCaps, Terminal, TerminalExtractor};
use hier::{is_ground_name, is_power_name, Error, Library, ModuleId, MosKind, Mosfet, Result};
use tracing::{span, Level};
use unicase::UniCase;

/// The longest series stack followed when tracing conduction paths.
pub const MAX_STACK_DEPTH: usize = 8;

const TERMINALS: [Terminal; 3] = [Terminal::Drain, Terminal::Gate, Terminal::Source];

#[derive(Debug)]
struct Flattened {
    /// `(module, revision)` of every module visited while flattening.
    revisions: Vec<(ModuleId, u64)>,
    devices: Vec<Mosfet>,
}

impl Flattened {
    fn is_current(&self, lib: &Library) -> bool {
        self.revisions.iter().all(|&(id, rev)| {
            lib.try_module(id)
                .map(|m| m.revision() == rev)
                .unwrap_or(false)
        })
    }
}

/// Extracts transistor terminal connectivity by flattening modules to devices.
///
/// Flattened netlists are cached per module and reused until any module in
/// the flattened hierarchy changes revision.
#[derive(Debug, Default)]
pub struct DeviceExtractor {
    cache: RefCell<HashMap<ModuleId, Rc<Flattened>>>,
}

impl DeviceExtractor {
    /// Creates an extractor with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The flattened devices of `module`.
    pub fn devices(&self, lib: &Library, module: ModuleId) -> Result<Vec<Mosfet>> {
        Ok(self.flattened(lib, module)?.devices.clone())
    }

    fn flattened(&self, lib: &Library, module: ModuleId) -> Result<Rc<Flattened>> {
        if let Some(flat) = self.cache.borrow().get(&module) {
            if flat.is_current(lib) {
                return Ok(flat.clone());
            }
        }
        let flat = Rc::new(flatten(lib, module)?);
        self.cache.borrow_mut().insert(module, flat.clone());
        Ok(flat)
    }
}

fn rename(map: &HashMap<UniCase<ArcStr>, ArcStr>, prefix: &str, net: &ArcStr) -> ArcStr {
    match map.get(&UniCase::new(net.clone())) {
        Some(parent) => parent.clone(),
        None if prefix.is_empty() => net.clone(),
        None => arcstr::format!("{prefix}{net}"),
    }
}

fn flatten(lib: &Library, top: ModuleId) -> Result<Flattened> {
    let _guard = span!(Level::DEBUG, "flattening", module = %lib.module(top).name()).entered();
    let mut revisions = Vec::new();
    let mut devices = Vec::new();
    let mut stack = vec![(top, String::new(), HashMap::new())];

    while let Some((id, prefix, map)) = stack.pop() {
        let module = lib
            .try_module(id)
            .ok_or_else(|| Error::MissingModule(arcstr::format!("{id}")))?;
        if !revisions.iter().any(|&(m, _)| m == id) {
            revisions.push((id, module.revision()));
        }

        for device in module.devices() {
            let mut device = device.clone();
            device.name = arcstr::format!("{prefix}{}", device.name);
            device.d = rename(&map, &prefix, &device.d);
            device.g = rename(&map, &prefix, &device.g);
            device.s = rename(&map, &prefix, &device.s);
            device.b = rename(&map, &prefix, &device.b);
            devices.push(device);
        }

        for (inst, conns) in module.instances().iter().zip(module.connections()) {
            if conns.is_empty() {
                continue;
            }
            let child = lib
                .try_module(inst.module())
                .ok_or_else(|| Error::MissingModule(arcstr::format!("{}", inst.module())))?;
            if child.pins().len() != conns.len() {
                return Err(Error::Extraction {
                    module: module.name().clone(),
                    reason: format!(
                        "instance `{}` has {} pins but {} connected nets",
                        inst.name(),
                        child.pins().len(),
                        conns.len()
                    ),
                });
            }
            let child_map = child
                .pins()
                .iter()
                .zip(conns)
                .map(|(pin, net)| (UniCase::new(pin.clone()), rename(&map, &prefix, net)))
                .collect::<HashMap<_, _>>();
            stack.push((inst.module(), format!("{prefix}{}/", inst.name()), child_map));
        }
    }

    tracing::trace!(num_devices = devices.len(), "flattened module");
    Ok(Flattened { revisions, devices })
}

fn is_rail_for(kind: MosKind, net: &str) -> bool {
    match kind {
        MosKind::Pmos => is_power_name(net),
        MosKind::Nmos => is_ground_name(net),
    }
}

/// Enumerates every channel path of `kind` devices from `pin` to the matching rail.
fn conduction_paths(devices: &[Mosfet], kind: MosKind, pin: &str) -> Vec<Vec<DeviceSize>> {
    let mut paths = Vec::new();
    let mut stack: Vec<(ArcStr, Vec<usize>)> = vec![(ArcStr::from(pin), Vec::new())];

    while let Some((net, path)) = stack.pop() {
        if path.len() >= MAX_STACK_DEPTH {
            continue;
        }
        for (i, device) in devices.iter().enumerate() {
            if device.kind != kind || path.contains(&i) {
                continue;
            }
            let next = if device.d.eq_ignore_ascii_case(&net) {
                &device.s
            } else if device.s.eq_ignore_ascii_case(&net) {
                &device.d
            } else {
                continue;
            };
            if next.eq_ignore_ascii_case(pin) {
                continue;
            }
            let mut path = path.clone();
            path.push(i);
            if is_rail_for(kind, next) {
                paths.push(path.iter().map(|&j| devices[j].size()).collect());
            } else if !is_power_name(next) && !is_ground_name(next) {
                stack.push((next.clone(), path));
            }
        }
    }
    paths
}

impl TerminalExtractor for DeviceExtractor {
    fn pins(&self, lib: &Library, module: ModuleId) -> Result<Vec<ArcStr>> {
        Ok(lib.module(module).pins().to_vec())
    }

    fn caps_for_pin(&self, lib: &Library, module: ModuleId, pin: &str) -> Result<PinCaps> {
        let flat = self.flattened(lib, module)?;
        let mut caps = PinCaps::new();
        for device in flat.devices.iter() {
            for terminal in TERMINALS {
                if device.terminal(terminal).eq_ignore_ascii_case(pin) {
                    let tc = caps
                        .entry(device.kind)
                        .or_default()
                        .entry(terminal)
                        .or_default();
                    tc.connected = true;
                    tc.devices.push(device.size());
                }
            }
        }
        Ok(caps)
    }

    fn res_for_pin(&self, lib: &Library, module: ModuleId, pin: &str) -> Result<ConductionPaths> {
        let flat = self.flattened(lib, module)?;
        let mut paths = ConductionPaths::new();
        for kind in MosKind::ALL {
            let found = conduction_paths(&flat.devices, kind, pin);
            if !found.is_empty() {
                paths.insert(kind, found);
            }
        }
        Ok(paths)
    }
}
