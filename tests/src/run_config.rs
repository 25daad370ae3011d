use approx::assert_relative_eq;
use config::{ConfigContext, Corner, Env, RunConfig};
use hier::Library;
use spice::DeviceExtractor;
use test_log::test;
use timing::{Technology, TimingModel};

use crate::paths::write_artifact;
use crate::shared::bank::bank;

const CONFIG: &str = r#"
buffer_optimization_size_penalty = 0.5
max_precharge_size = 32.0
corner = "ss"
predecode_sizes = [1.5, 3.0]

[stage_sizes]
wl_en_buf = [1.0, 4.0]
"#;

#[test]
fn config_seeds_context() {
    let config = RunConfig::from_toml_str(CONFIG).unwrap();
    assert_eq!(config.corner, Corner::Ss);
    assert_relative_eq!(config.max_size_for("wl_en_buf"), 64.0);

    let ctx = ConfigContext::from_config(&config);
    assert_eq!(ctx.get("wl_en_buf").unwrap(), &[1.0, 4.0]);
    assert_eq!(ctx.get("predecode_sizes").unwrap(), &[1.5, 3.0]);
    assert_eq!(ctx.get("precharge_size").unwrap(), &[1.0]);
    assert!(ctx.to_toml_string().unwrap().contains("wl_en_buf"));
}

#[test]
fn slow_corner_weakens_drivers() {
    let mut lib = Library::new("slow_corner_weakens_drivers");
    let bank = bank(&mut lib);
    let tech = Technology::default();
    let extractor = DeviceExtractor::new();

    let tt = RunConfig::default();
    let ss = RunConfig::from_toml_str(CONFIG).unwrap();
    let typical = TimingModel::new(&lib, &extractor, &tech, &tt);
    let slow = TimingModel::new(&lib, &extractor, &tech, &ss);

    let r_tt = typical
        .driver_resistance(bank.inv, "Z", true, None, None)
        .unwrap()
        .max();
    let r_ss = slow
        .driver_resistance(bank.inv, "Z", true, None, None)
        .unwrap()
        .max();
    assert_relative_eq!(r_ss, 1.25 * r_tt, max_relative = 1e-12);

    let gm_tt = typical.driver_gm(bank.nand, "Z", None).unwrap();
    let gm_ss = slow.driver_gm(bank.nand, "Z", None).unwrap();
    assert_relative_eq!(gm_ss, 0.8 * gm_tt, max_relative = 1e-12);
}

#[test]
fn discovered_config_with_env_overrides() {
    let path = write_artifact(
        "discovered_config_with_env_overrides",
        "sizing.toml",
        b"max_wl_en_buf = 3.0\nnum_fit_samples = 5\n",
    )
    .unwrap();
    let dir = path.parent().unwrap();
    let env = Env::from_vars([
        ("SIZING_BUFFER_OPTIMIZATION_SIZE_PENALTY", "0.2"),
        ("SIZING_MAX_PC_BUF", "12"),
    ]);

    let config = RunConfig::discover(dir, &env).unwrap();
    assert_eq!(config.num_fit_samples, 5);
    assert_relative_eq!(config.buffer_optimization_size_penalty, 0.2);
    assert_relative_eq!(config.max_size_for("wl_en_buf"), 3.0);
    assert_relative_eq!(config.max_size_for("pc_buf"), 12.0);
    assert_relative_eq!(config.max_size_for("predec_buf"), config.max_buf_size);
}
