//! Circuit hierarchy model.
//!
//! A [`Library`] owns a set of [`Module`]s. Each module declares an ordered list of
//! pins, a list of child [`Instance`]s, and for every instance a positional list of
//! parent nets connected to the child's pins.
//!
//! Nets are plain strings scoped to the owning module. Connecting a net to an
//! instance means positionally mapping it onto the child module's pin order, which
//! is the same order used when the module is written out as a SPICE subcircuit.
//!
//! Leaf modules may carry transistor primitives ([`Mosfet`]s) and physical pin
//! shapes ([`PinShape`]s). These are consumed by terminal extraction and by wire
//! capacitance estimation respectively.
//!
//! The library doubles as the per-session module registry: adding a module whose
//! name is already registered returns the existing [`ModuleId`].
#![warn(missing_docs)]

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};
use unicase::UniCase;

pub mod extract;
pub mod resolve;
pub mod validation;
pub mod walk;

pub use extract::{
    ConductionPaths, DeviceSize, MosKind, PinCaps, Terminal, TerminalCaps, TerminalExtractor,
};
pub use resolve::PinResolver;


/// A result type returning hierarchy errors.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type for hierarchy construction and queries.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// An instance was connected with the wrong number of nets.
    #[error(
        "arity mismatch in module `{module}`: instance `{instance}` has {expected} pins but {actual} nets were connected"
    )]
    Arity {
        /// The parent module.
        module: ArcStr,
        /// The instance being connected.
        instance: ArcStr,
        /// The child module's pin count.
        expected: usize,
        /// The number of nets provided.
        actual: usize,
    },
    /// The number of instances and connection lists differ.
    #[error("module `{module}` has {instances} instances but {connections} connection lists")]
    InstanceCount {
        /// The parent module.
        module: ArcStr,
        /// The number of instances.
        instances: usize,
        /// The number of connection lists.
        connections: usize,
    },
    /// A pin was declared twice.
    #[error("duplicate pin `{pin}` in module `{module}`")]
    DuplicatePin {
        /// The module.
        module: ArcStr,
        /// The duplicated pin.
        pin: ArcStr,
    },
    /// A pin does not exist.
    #[error("no pin named `{pin}` in module `{module}`")]
    MissingPin {
        /// The module.
        module: ArcStr,
        /// The requested pin.
        pin: ArcStr,
    },
    /// An instance does not exist.
    #[error("no instance named `{instance}` in module `{module}`")]
    MissingInstance {
        /// The module.
        module: ArcStr,
        /// The requested instance.
        instance: ArcStr,
    },
    /// Attempted to connect nets before any instance was added.
    #[error("module `{module}` has no instance to connect")]
    NoInstances {
        /// The module.
        module: ArcStr,
    },
    /// A module does not exist in the library.
    #[error("no module named `{0}`")]
    MissingModule(ArcStr),
    /// Transistor terminal extraction failed.
    #[error("terminal extraction failed for module `{module}`: {reason}")]
    Extraction {
        /// The module being extracted.
        module: ArcStr,
        /// A description of the failure.
        reason: String,
    },
}

/// An opaque module identifier.
///
/// A module ID created in the context of one library must
/// *not* be used in the context of another library.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ModuleId(u64);

impl Display for ModuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "module{}", self.0)
    }
}

/// Pin directions.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Input.
    Input,
    /// Output.
    Output,
    /// Input or output.
    #[default]
    InOut,
    /// A power supply rail.
    Power,
    /// A ground rail.
    Ground,
}

impl Direction {
    /// Returns the direction used for connectivity queries.
    ///
    /// Supply rails are bidirectional, so [`Direction::Power`] and
    /// [`Direction::Ground`] resolve to [`Direction::InOut`].
    ///
    /// # Examples
    ///
    /// ```
    /// use hier::Direction;
    /// assert_eq!(Direction::Power.resolve(), Direction::InOut);
    /// assert_eq!(Direction::Input.resolve(), Direction::Input);
    /// ```
    #[inline]
    pub fn resolve(self) -> Self {
        match self {
            Self::Power | Self::Ground => Self::InOut,
            other => other,
        }
    }

    /// Returns the flipped direction.
    ///
    /// Bidirectional pins are unchanged by flipping.
    #[inline]
    pub fn flip(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
            other => other,
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
            Self::InOut => write!(f, "inout"),
            Self::Power => write!(f, "power"),
            Self::Ground => write!(f, "ground"),
        }
    }
}

/// Returns `true` if the net name conventionally denotes a power rail.
pub fn is_power_name(name: &str) -> bool {
    ["vdd", "vpwr", "vcc"]
        .iter()
        .any(|n| n.eq_ignore_ascii_case(name))
}

/// Returns `true` if the net name conventionally denotes a ground rail.
pub fn is_ground_name(name: &str) -> bool {
    ["vss", "gnd", "vgnd"]
        .iter()
        .any(|n| n.eq_ignore_ascii_case(name))
}

/// A transistor primitive inside a leaf module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mosfet {
    /// The device name.
    pub name: ArcStr,
    /// The device polarity.
    pub kind: MosKind,
    /// The drain net.
    pub d: ArcStr,
    /// The gate net.
    pub g: ArcStr,
    /// The source net.
    pub s: ArcStr,
    /// The body net.
    pub b: ArcStr,
    /// Width of a single finger, in microns.
    pub width: f64,
    /// Number of fingers.
    pub fingers: u32,
    /// Device multiplier.
    pub mult: u32,
}

impl Mosfet {
    /// Creates a single-finger device with nets given in `d g s b` order.
    pub fn new<S: Into<ArcStr>>(
        name: impl Into<ArcStr>,
        kind: MosKind,
        [d, g, s, b]: [S; 4],
        width: f64,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            d: d.into(),
            g: g.into(),
            s: s.into(),
            b: b.into(),
            width,
            fingers: 1,
            mult: 1,
        }
    }

    /// Sets the number of fingers.
    #[inline]
    pub fn with_fingers(mut self, fingers: u32) -> Self {
        self.fingers = fingers;
        self
    }

    /// Sets the device multiplier.
    #[inline]
    pub fn with_mult(mut self, mult: u32) -> Self {
        self.mult = mult;
        self
    }

    /// The net connected to the given terminal.
    pub fn terminal(&self, terminal: Terminal) -> &ArcStr {
        match terminal {
            Terminal::Drain => &self.d,
            Terminal::Gate => &self.g,
            Terminal::Source => &self.s,
            Terminal::Body => &self.b,
        }
    }

    /// The `(mult, fingers, width)` sizing of this device.
    #[inline]
    pub fn size(&self) -> DeviceSize {
        DeviceSize {
            mult: self.mult,
            fingers: self.fingers,
            width: self.width,
        }
    }
}

/// A physical pin shape on a routing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinShape {
    /// The pin this shape belongs to.
    pub pin: ArcStr,
    /// The routing layer name.
    pub layer: ArcStr,
    /// Shape width, in microns.
    pub width: f64,
    /// Shape height, in microns.
    pub height: f64,
}

/// Filter keys identifying a module in characterization data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharKey {
    /// The characterized cell name.
    pub cell: ArcStr,
    /// The characterized size of this module.
    pub size: f64,
    /// Extra `(key, value)` filters appended to data file names.
    pub file_suffixes: Vec<(ArcStr, ArcStr)>,
    /// Extra numeric size filters.
    pub size_suffixes: Vec<(ArcStr, f64)>,
}

/// An instance of a child module placed inside a parent module.
///
/// Instances are purely connectivity records: the child module is
/// shared and owned by the [`Library`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    name: ArcStr,
    module: ModuleId,
}

impl Instance {
    /// Creates an instance of the given module.
    #[inline]
    pub fn new(name: impl Into<ArcStr>, module: ModuleId) -> Self {
        Self {
            name: name.into(),
            module,
        }
    }

    /// The name of this instance.
    ///
    /// This is not necessarily the name of the child module.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The ID of the child module.
    #[inline]
    pub fn module(&self) -> ModuleId {
        self.module
    }
}

/// A module definition.
#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) name: ArcStr,
    pub(crate) pins: Vec<ArcStr>,
    /// Case-insensitive map from pin name to its index in `pins`.
    pin_map: HashMap<UniCase<ArcStr>, usize>,
    /// Declared pin types. Inferred types are memoized by [`PinResolver`].
    pin_types: HashMap<UniCase<ArcStr>, Direction>,
    pub(crate) mods: Vec<ModuleId>,
    pub(crate) instances: Vec<Instance>,
    pub(crate) connections: Vec<Vec<ArcStr>>,
    pub(crate) devices: Vec<Mosfet>,
    pub(crate) pin_shapes: Vec<PinShape>,
    characterization: Option<CharKey>,
    /// Bumped on every structural edit.
    revision: u64,
}

impl Module {
    /// Creates a new, empty module with the given name.
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            pins: Vec::new(),
            pin_map: HashMap::new(),
            pin_types: HashMap::new(),
            mods: Vec::new(),
            instances: Vec::new(),
            connections: Vec::new(),
            devices: Vec::new(),
            pin_shapes: Vec::new(),
            characterization: None,
            revision: 0,
        }
    }

    /// The name of the module.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The revision counter of this module.
    ///
    /// Any structural edit increments the revision, so caches keyed by
    /// `(ModuleId, revision)` never serve stale results.
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    /// Declares a pin with an optional explicit type.
    pub fn add_pin(&mut self, name: impl Into<ArcStr>, ty: Option<Direction>) -> Result<()> {
        let name = name.into();
        let key = UniCase::new(name.clone());
        if self.pin_map.contains_key(&key) {
            return Err(Error::DuplicatePin {
                module: self.name.clone(),
                pin: name,
            });
        }
        self.pin_map.insert(key.clone(), self.pins.len());
        if let Some(ty) = ty {
            self.pin_types.insert(key, ty);
        }
        self.pins.push(name);
        self.touch();
        Ok(())
    }

    /// Declares a list of pins.
    ///
    /// If `types` is non-empty, it must be the same length as `names`.
    pub fn add_pin_list<I, S>(&mut self, names: I, types: &[Direction]) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<ArcStr>,
    {
        for (i, name) in names.into_iter().enumerate() {
            self.add_pin(name, types.get(i).copied())?;
        }
        Ok(())
    }

    /// Records `module` as a submodule definition used by this module.
    ///
    /// Idempotent: adding the same module twice has no effect.
    pub fn add_mod(&mut self, module: ModuleId) {
        if !self.mods.contains(&module) {
            self.mods.push(module);
        }
    }

    /// Adds a transistor primitive.
    pub fn add_device(&mut self, device: Mosfet) {
        self.devices.push(device);
        self.touch();
    }

    /// Adds a physical pin shape.
    pub fn add_pin_shape(&mut self, shape: PinShape) {
        self.pin_shapes.push(shape);
        self.touch();
    }

    /// Sets the characterization filter keys of this module.
    #[inline]
    pub fn set_characterization(&mut self, key: CharKey) {
        self.characterization = Some(key);
    }

    /// The characterization filter keys of this module, if any.
    #[inline]
    pub fn characterization(&self) -> Option<&CharKey> {
        self.characterization.as_ref()
    }

    /// The ordered pin list.
    #[inline]
    pub fn pins(&self) -> &[ArcStr] {
        &self.pins
    }

    /// Case-insensitive lookup of a pin's index.
    pub fn pin_index(&self, name: &str) -> Option<usize> {
        self.pin_map.get(&UniCase::new(ArcStr::from(name))).copied()
    }

    /// Returns `true` if the module declares the given pin (case-insensitive).
    #[inline]
    pub fn has_pin(&self, name: &str) -> bool {
        self.pin_index(name).is_some()
    }

    /// The declared type of a pin, if one was given.
    pub fn declared_pin_type(&self, name: &str) -> Option<Direction> {
        self.pin_types.get(&UniCase::new(ArcStr::from(name))).copied()
    }

    /// The submodule definitions used by this module.
    #[inline]
    pub fn mods(&self) -> &[ModuleId] {
        &self.mods
    }

    /// The child instances, in insertion order.
    #[inline]
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// The connection lists, index-aligned with [`Module::instances`].
    #[inline]
    pub fn connections(&self) -> &[Vec<ArcStr>] {
        &self.connections
    }

    /// Finds an instance by name.
    pub fn instance_named(&self, name: &str) -> Option<(usize, &Instance)> {
        self.instances
            .iter()
            .enumerate()
            .find(|(_, inst)| inst.name == name)
    }

    /// The transistor primitives of this module.
    #[inline]
    pub fn devices(&self) -> &[Mosfet] {
        &self.devices
    }

    /// The physical shapes of the given pin.
    pub fn pin_shapes<'a>(&'a self, pin: &'a str) -> impl Iterator<Item = &'a PinShape> + 'a {
        self.pin_shapes
            .iter()
            .filter(move |shape| shape.pin.eq_ignore_ascii_case(pin))
    }

    /// Iterates over `(instance index, pin position)` pairs where `net` is connected.
    ///
    /// A net connected to several pins of one instance yields one pair per pin.
    /// Connection lists without a matching instance are skipped.
    pub fn net_users<'a>(&'a self, net: &'a str) -> impl Iterator<Item = (usize, usize)> + 'a {
        self.connections
            .iter()
            .take(self.instances.len())
            .enumerate()
            .flat_map(move |(i, conns)| {
                conns
                    .iter()
                    .enumerate()
                    .filter(move |(_, n)| n.eq_ignore_ascii_case(net))
                    .map(move |(j, _)| (i, j))
            })
    }

    /// Returns `true` if every connection list is empty.
    ///
    /// Such a module is treated as a leaf for delay purposes.
    pub fn is_delay_primitive(&self) -> bool {
        self.connections.iter().all(|conns| conns.is_empty())
    }

    /// Returns `true` if at least one connection list is non-empty.
    #[inline]
    pub fn is_composite(&self) -> bool {
        !self.is_delay_primitive()
    }
}

/// A library of modules.
///
/// Serves as the per-session registry: modules are deduplicated by name.
#[derive(Debug, Clone)]
pub struct Library {
    /// The current ID counter.
    ///
    /// Incremented before assigning a new ID.
    module_id: u64,
    name: ArcStr,
    modules: HashMap<ModuleId, Module>,
    name_map: HashMap<ArcStr, ModuleId>,
    /// The order in which modules were added.
    order: Vec<ModuleId>,
}

impl Library {
    /// Creates a new, empty library.
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            module_id: 0,
            name: name.into(),
            modules: HashMap::new(),
            name_map: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// The name of the library.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// Adds a module to the library.
    ///
    /// If a module with the same name is already registered, the given
    /// module is discarded and the existing ID is returned.
    pub fn add_module(&mut self, module: Module) -> ModuleId {
        if let Some(&id) = self.name_map.get(&module.name) {
            tracing::debug!(module = %module.name, "module already registered");
            return id;
        }
        self.module_id += 1;
        let id = ModuleId(self.module_id);
        self.name_map.insert(module.name.clone(), id);
        self.modules.insert(id, module);
        self.order.push(id);
        id
    }

    /// Returns the module registered under `name`, building it with `f` on a miss.
    pub fn get_or_create<E>(
        &mut self,
        name: &str,
        f: impl FnOnce() -> std::result::Result<Module, E>,
    ) -> std::result::Result<ModuleId, E> {
        if let Some(&id) = self.name_map.get(name) {
            return Ok(id);
        }
        Ok(self.add_module(f()?))
    }

    /// Gets the module with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if no module has the given ID.
    /// For a non-panicking alternative, see [`try_module`](Library::try_module).
    pub fn module(&self, id: ModuleId) -> &Module {
        self.modules.get(&id).unwrap()
    }

    /// Gets the module with the given ID.
    #[inline]
    pub fn try_module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(&id)
    }

    /// Gets a mutable reference to the module with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if no module has the given ID.
    pub fn module_mut(&mut self, id: ModuleId) -> &mut Module {
        self.modules.get_mut(&id).unwrap()
    }

    /// Gets the ID of the module with the given name.
    pub fn module_id_named(&self, name: &str) -> Result<ModuleId> {
        self.name_map
            .get(name)
            .copied()
            .ok_or_else(|| Error::MissingModule(name.into()))
    }

    /// Iterates over the `(id, module)` pairs in insertion order.
    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.order.iter().map(|&id| (id, self.module(id)))
    }

    /// Adds an instance of `child` to `parent`.
    ///
    /// The child is also recorded as a submodule definition of the parent.
    /// Returns the index of the new instance.
    pub fn add_inst(
        &mut self,
        parent: ModuleId,
        name: impl Into<ArcStr>,
        child: ModuleId,
    ) -> Result<usize> {
        if !self.modules.contains_key(&child) {
            return Err(Error::MissingModule(arcstr::format!("{child}")));
        }
        let module = self.module_mut(parent);
        module.add_mod(child);
        module.instances.push(Instance::new(name, child));
        module.touch();
        Ok(module.instances.len() - 1)
    }

    /// Appends a connection list for the most recently added instance of `parent`.
    ///
    /// When `check` is `true`, fails with [`Error::Arity`] if the net count does not
    /// match the last instance's pin count, and with [`Error::InstanceCount`] if the
    /// number of connection lists no longer equals the number of instances.
    ///
    /// Unchecked appends are used during staged generation and must be reconciled
    /// (see [`Library::validate`]) before the module is considered complete.
    pub fn connect_inst<I, S>(&mut self, parent: ModuleId, nets: I, check: bool) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<ArcStr>,
    {
        let nets: Vec<ArcStr> = nets.into_iter().map(Into::into).collect();
        let module = self.module(parent);
        if check {
            let last = module.instances.last().ok_or_else(|| Error::NoInstances {
                module: module.name.clone(),
            })?;
            let expected = self.module(last.module).pins.len();
            if expected != nets.len() {
                return Err(Error::Arity {
                    module: module.name.clone(),
                    instance: last.name.clone(),
                    expected,
                    actual: nets.len(),
                });
            }
        }

        let module = self.module_mut(parent);
        module.connections.push(nets);
        module.touch();

        if check && module.instances.len() != module.connections.len() {
            return Err(Error::InstanceCount {
                module: module.name.clone(),
                instances: module.instances.len(),
                connections: module.connections.len(),
            });
        }
        Ok(())
    }

    /// Looks up an instance of `parent` by name, returning its index and child module.
    pub fn instance(&self, parent: ModuleId, name: &str) -> Result<(usize, ModuleId)> {
        let module = self.module(parent);
        module
            .instance_named(name)
            .map(|(i, inst)| (i, inst.module))
            .ok_or_else(|| Error::MissingInstance {
                module: module.name.clone(),
                instance: name.into(),
            })
    }
}
