use approx::assert_relative_eq;
use config::RunConfig;
use hier::{Direction, Library};
use spice::{DeviceExtractor, Netlister};
use test_log::test;
use timing::{Technology, TimingModel};

use crate::paths::write_artifact;
use crate::shared::bank::bank;

/// Gate capacitance of a unit inverter with the default technology.
const UNIT_CIN: f64 = 1.08e-15;

#[test]
fn bank_is_valid() {
    let mut lib = Library::new("bank_is_valid");
    bank(&mut lib);
    let issues = lib.validate();
    assert!(!issues.has_error(), "{issues:?}");
}

#[test]
fn bank_pin_directions() {
    let mut lib = Library::new("bank_pin_directions");
    let bank = bank(&mut lib);
    let extractor = DeviceExtractor::new();
    let resolver = hier::PinResolver::new(&lib, &extractor);

    assert_eq!(resolver.pin_dir(bank.id, "clk").unwrap(), Direction::Input);
    assert_eq!(resolver.pin_dir(bank.id, "sense_en").unwrap(), Direction::Output);
    assert_eq!(resolver.pin_dir(bank.id, "vdd").unwrap(), Direction::InOut);
    assert_eq!(resolver.pin_dir(bank.row, "wl3").unwrap(), Direction::Output);

    let fan_in = resolver.inputs_for_pin(bank.row, "wl2").unwrap();
    assert_eq!(fan_in.len(), 1);
    assert_eq!(fan_in[0].as_str(), "en");
}

#[test]
fn wordline_row_input_cap() {
    let mut lib = Library::new("wordline_row_input_cap");
    let bank = bank(&mut lib);
    let tech = Technology::default();
    let config = RunConfig::default();
    let extractor = DeviceExtractor::new();
    let model = TimingModel::new(&lib, &extractor, &tech, &config);

    let (total, per_stage) = model.input_cap(bank.row, "en", 1, 0.0, None).unwrap();
    assert_relative_eq!(total, 4.0 * UNIT_CIN, max_relative = 1e-9);
    assert_relative_eq!(per_stage, total);

    let (total, _) = model.input_cap(bank.row, "en", 2, 0.0, None).unwrap();
    assert_relative_eq!(total, 8.0 * UNIT_CIN, max_relative = 1e-9);
}

#[test]
fn delay_grows_with_load() {
    let mut lib = Library::new("delay_grows_with_load");
    let bank = bank(&mut lib);
    let tech = Technology::default();
    let config = RunConfig::default();
    let extractor = DeviceExtractor::new();
    let model = TimingModel::new(&lib, &extractor, &tech, &config);

    let light = model.analytical_delay(bank.inv, 5.0, 1e-15).unwrap();
    let heavy = model.analytical_delay(bank.inv, 5.0, 1e-13).unwrap();
    assert!(light.delay > 0.0);
    assert!(heavy.delay > light.delay);
    assert!(heavy.slew > light.slew);

    let row = model.analytical_delay(bank.row, 5.0, 1e-15).unwrap();
    assert!(row.delay > 0.0);

    let power = model.analytical_power(bank.id, 1e-14, 1e9).unwrap();
    assert!(power.dynamic > 0.0);
    assert!(power.leakage > 0.0);
}

#[test]
fn netlist_bank() {
    let mut lib = Library::new("netlist_bank");
    bank(&mut lib);

    let mut buf: Vec<u8> = Vec::new();
    Netlister::new(&lib, &mut buf).export().unwrap();
    let path = write_artifact("netlist_bank", "bank.spice", &buf).unwrap();
    let string = std::fs::read_to_string(path).unwrap();

    assert_eq!(
        string
            .matches(".SUBCKT bank clk we addr0 addr1 sense_en vdd gnd")
            .count(),
        1
    );
    assert_eq!(
        string
            .matches("Xrow0 wl_en wl0 wl1 wl2 wl3 vdd gnd wl_driver_row")
            .count(),
        1
    );
    assert_eq!(string.matches(".ENDS").count(), 4);
}
