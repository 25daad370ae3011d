use approx::assert_relative_eq;
use hier::extract::{MosKind, Terminal, TerminalExtractor};
use hier::{Library, Module, ModuleId, Mosfet};
use test_log::test;

use crate::{DeviceExtractor, Netlister};

fn inverter(lib: &mut Library) -> ModuleId {
    let mut inv = Module::new("pinv");
    inv.add_pin_list(["A", "Z", "vdd", "gnd"], &[]).unwrap();
    inv.add_device(Mosfet::new(
        "MN0",
        MosKind::Nmos,
        ["Z", "A", "gnd", "gnd"],
        0.36,
    ));
    inv.add_device(
        Mosfet::new("MP0", MosKind::Pmos, ["Z", "A", "vdd", "vdd"], 0.54).with_fingers(2),
    );
    lib.add_module(inv)
}

fn nand2(lib: &mut Library) -> ModuleId {
    let mut nand = Module::new("pnand2");
    nand.add_pin_list(["A", "B", "Z", "vdd", "gnd"], &[]).unwrap();
    nand.add_device(Mosfet::new("MN0", MosKind::Nmos, ["Z", "A", "x", "gnd"], 0.72));
    nand.add_device(Mosfet::new("MN1", MosKind::Nmos, ["x", "B", "gnd", "gnd"], 0.72));
    nand.add_device(Mosfet::new("MP0", MosKind::Pmos, ["Z", "A", "vdd", "vdd"], 0.54));
    nand.add_device(Mosfet::new("MP1", MosKind::Pmos, ["Z", "B", "vdd", "vdd"], 0.54));
    lib.add_module(nand)
}

fn buffer(lib: &mut Library) -> ModuleId {
    let inv = inverter(lib);
    let mut buf = Module::new("pbuf");
    buf.add_pin_list(["A", "Z", "vdd", "gnd"], &[]).unwrap();
    let buf = lib.add_module(buf);
    lib.add_inst(buf, "inv0", inv).unwrap();
    lib.connect_inst(buf, ["A", "n1", "vdd", "gnd"], true).unwrap();
    lib.add_inst(buf, "inv1", inv).unwrap();
    lib.connect_inst(buf, ["n1", "Z", "vdd", "gnd"], true).unwrap();
    buf
}

#[test]
fn inverter_terminals() {
    let mut lib = Library::new("extract");
    let inv = inverter(&mut lib);
    let ex = DeviceExtractor::new();

    let caps = ex.caps_for_pin(&lib, inv, "A").unwrap();
    assert!(caps[&MosKind::Nmos][&Terminal::Gate].connected);
    assert!(caps[&MosKind::Pmos][&Terminal::Gate].connected);
    assert!(!caps[&MosKind::Nmos].contains_key(&Terminal::Drain));
    assert_relative_eq!(
        caps[&MosKind::Pmos][&Terminal::Gate].devices[0].total_width(),
        1.08
    );

    let caps = ex.caps_for_pin(&lib, inv, "z").unwrap();
    assert!(caps[&MosKind::Nmos][&Terminal::Drain].connected);
    assert!(!caps[&MosKind::Nmos].contains_key(&Terminal::Gate));
}

#[test]
fn body_terminals_are_ignored() {
    let mut lib = Library::new("extract");
    let inv = inverter(&mut lib);
    let ex = DeviceExtractor::new();
    let caps = ex.caps_for_pin(&lib, inv, "vdd").unwrap();
    assert!(!caps[&MosKind::Pmos].contains_key(&Terminal::Body));
    assert!(caps[&MosKind::Pmos][&Terminal::Source].connected);
}

#[test]
fn nand_conduction_paths() {
    let mut lib = Library::new("extract");
    let nand = nand2(&mut lib);
    let ex = DeviceExtractor::new();
    let paths = ex.res_for_pin(&lib, nand, "Z").unwrap();

    // Two parallel pull-up devices.
    let pull_up = &paths[&MosKind::Pmos];
    assert_eq!(pull_up.len(), 2);
    assert!(pull_up.iter().all(|p| p.len() == 1));

    // One series pull-down stack.
    let pull_down = &paths[&MosKind::Nmos];
    assert_eq!(pull_down.len(), 1);
    assert_eq!(pull_down[0].len(), 2);

    // Gate-only pins drive nothing.
    assert!(ex.res_for_pin(&lib, nand, "A").unwrap().is_empty());
}

#[test]
fn composite_modules_are_flattened() {
    let mut lib = Library::new("extract");
    let buf = buffer(&mut lib);
    let ex = DeviceExtractor::new();

    let devices = ex.devices(&lib, buf).unwrap();
    assert_eq!(devices.len(), 4);
    assert!(devices.iter().any(|d| d.name == "inv0/MN0" && d.d == "n1"));
    assert!(devices.iter().any(|d| d.name == "inv1/MP0" && d.g == "n1"));

    let caps = ex.caps_for_pin(&lib, buf, "A").unwrap();
    assert_eq!(caps[&MosKind::Nmos][&Terminal::Gate].devices.len(), 1);

    let paths = ex.res_for_pin(&lib, buf, "Z").unwrap();
    assert_eq!(paths[&MosKind::Pmos].len(), 1);
    assert_eq!(paths[&MosKind::Nmos].len(), 1);
}

#[test]
fn cache_tracks_revisions() {
    let mut lib = Library::new("extract");
    let buf = buffer(&mut lib);
    let inv = lib.module_id_named("pinv").unwrap();
    let ex = DeviceExtractor::new();
    assert_eq!(ex.devices(&lib, buf).unwrap().len(), 4);

    lib.module_mut(inv).add_device(Mosfet::new(
        "MN1",
        MosKind::Nmos,
        ["Z", "A", "gnd", "gnd"],
        0.36,
    ));
    assert_eq!(ex.devices(&lib, buf).unwrap().len(), 6);
}

#[test]
fn netlists_modules() {
    let mut lib = Library::new("netlist");
    buffer(&mut lib);

    let mut buf: Vec<u8> = Vec::new();
    Netlister::new(&lib, &mut buf)
        .with_models("sky130_fd_pr__nfet_01v8", "sky130_fd_pr__pfet_01v8")
        .export()
        .unwrap();
    let string = String::from_utf8(buf).unwrap();
    println!("{}", string);

    assert_eq!(string.matches(".SUBCKT pinv A Z vdd gnd").count(), 1);
    assert_eq!(string.matches(".SUBCKT pbuf A Z vdd gnd").count(), 1);
    assert_eq!(string.matches(".ENDS").count(), 2);
    assert_eq!(string.matches("Xinv0 A n1 vdd gnd pinv").count(), 1);
    assert_eq!(
        string
            .matches("MMN0 Z A gnd gnd sky130_fd_pr__nfet_01v8 w=0.36u")
            .count(),
        1
    );
    assert_eq!(string.matches("nf=2").count(), 1);
}
