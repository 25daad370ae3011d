//! SPICE netlist export and transistor-level extraction for [`hier`] libraries.
#![warn(missing_docs)]

use std::io::{prelude::*, BufWriter};

use arcstr::ArcStr;
use hier::{Library, Module, MosKind, Mosfet};

pub mod extract;

pub use extract::DeviceExtractor;

#[cfg(test)]
mod tests;

type Result<T> = std::result::Result<T, std::io::Error>;

/// A SPICE netlister.
pub struct Netlister<'a, W: Write> {
    lib: &'a Library,
    out: BufWriter<&'a mut W>,
    nmos_model: ArcStr,
    pmos_model: ArcStr,
}

impl<'a, W: Write> Netlister<'a, W> {
    /// Create a new SPICE netlister writing to the given output stream.
    pub fn new(lib: &'a Library, out: &'a mut W) -> Self {
        Self {
            lib,
            out: BufWriter::new(out),
            nmos_model: arcstr::literal!("nmos"),
            pmos_model: arcstr::literal!("pmos"),
        }
    }

    /// Sets the device model names used for n- and p-channel transistors.
    pub fn with_models(mut self, nmos: impl Into<ArcStr>, pmos: impl Into<ArcStr>) -> Self {
        self.nmos_model = nmos.into();
        self.pmos_model = pmos.into();
        self
    }

    /// Exports this netlister's library to its output stream.
    #[inline]
    pub fn export(mut self) -> Result<()> {
        self.export_library()?;
        self.out.flush()?;
        Ok(())
    }

    fn export_library(&mut self) -> Result<()> {
        writeln!(self.out, "* {}", self.lib.name())?;
        writeln!(self.out, "* This is a generated file. Be careful when editing manually: this file may be overwritten.\n")?;
        for (_, module) in self.lib.modules() {
            self.export_module(module)?;
        }
        Ok(())
    }

    fn export_module(&mut self, module: &Module) -> Result<()> {
        write!(self.out, ".SUBCKT {}", module.name())?;
        for pin in module.pins() {
            write!(self.out, " {}", pin)?;
        }
        writeln!(self.out, "\n")?;

        for (inst, conns) in module.instances().iter().zip(module.connections()) {
            write!(self.out, "X{}", inst.name())?;
            for net in conns {
                write!(self.out, " {}", net)?;
            }
            let child = self
                .lib
                .try_module(inst.module())
                .map(|m| m.name().clone())
                .unwrap_or_else(|| arcstr::format!("{}", inst.module()));
            writeln!(self.out, " {}", child)?;
        }

        for device in module.devices() {
            self.write_mosfet(device)?;
        }

        writeln!(self.out, "\n.ENDS {}\n", module.name())?;
        Ok(())
    }

    fn write_mosfet(&mut self, device: &Mosfet) -> Result<()> {
        let model = match device.kind {
            MosKind::Nmos => &self.nmos_model,
            MosKind::Pmos => &self.pmos_model,
        };
        write!(
            self.out,
            "M{} {} {} {} {} {} w={}u",
            device.name, device.d, device.g, device.s, device.b, model, device.width
        )?;
        if device.fingers != 1 {
            write!(self.out, " nf={}", device.fingers)?;
        }
        if device.mult != 1 {
            write!(self.out, " m={}", device.mult)?;
        }
        writeln!(self.out)?;
        Ok(())
    }
}
