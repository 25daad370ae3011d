use approx::assert_relative_eq;
use config::RunConfig;
use hier::Library;
use sizing::optimize::PRECHARGE_SIZE_KEY;
use sizing::{extract_loads, BufferOptimizer, ChainOutput, DeviceRegistry, Error, LoadTerminal};
use spice::DeviceExtractor;
use test_log::test;
use timing::{Technology, TimingModel};

use crate::shared::bank::{
    bank, chains, context, sense_en_chain, PC_BUF, PREDEC_BUF, SENSE_AMPS, SENSE_EN_BUF,
    WL_EN_BUF,
};

/// Gate capacitance of a unit inverter with the default technology.
const UNIT_CIN: f64 = 1.08e-15;

#[test]
fn optimizes_every_bank_chain() {
    let mut lib = Library::new("optimizes_every_bank_chain");
    let bank = bank(&mut lib);
    let tech = Technology::default();
    let config = RunConfig::default();
    let registry = DeviceRegistry::default();
    let mut ctx = context(&config);

    let reports = BufferOptimizer::new(&lib, &tech, &config, &registry)
        .run(&chains(&bank), &mut ctx)
        .unwrap();
    assert_eq!(reports.len(), 3);
    for report in &reports {
        assert!(report.objective.is_finite() && report.objective > 0.0);
        let stored = ctx.get(&report.chain).unwrap();
        assert_eq!(stored, report.sizes.stages.as_slice());
        assert!(stored
            .iter()
            .all(|s| (1.0..=config.max_buf_size).contains(s)));
    }

    let wl_en = &reports[0];
    assert_eq!(wl_en.chain.as_str(), WL_EN_BUF);
    assert!([2, 4].contains(&wl_en.num_stages));
    assert_eq!(ctx.get_old(WL_EN_BUF).unwrap(), &[1.0, 2.0, 4.0, 8.0]);

    let pc = &reports[1];
    assert_eq!(pc.chain.as_str(), PC_BUF);
    assert_eq!(pc.num_stages, 3);
    let p = pc.sizes.precharge.unwrap();
    assert!((1.0..=config.max_precharge_size).contains(&p));
    assert_eq!(ctx.get(PRECHARGE_SIZE_KEY).unwrap(), &[p]);
    assert_eq!(ctx.get_old(PRECHARGE_SIZE_KEY).unwrap(), &[config.precharge_size]);

    let predec = &reports[2];
    assert_eq!(predec.chain.as_str(), PREDEC_BUF);
    assert_eq!(predec.num_stages, 2);
    let stored = ctx.get(PREDEC_BUF).unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[0], config.predecode_sizes[0]);
    assert!(predec.sizes.precharge.is_none());
}

#[test]
fn optimizer_leaves_bank_untouched() {
    let mut lib = Library::new("optimizer_leaves_bank_untouched");
    let bank = bank(&mut lib);
    let tech = Technology::default();
    let config = RunConfig::default();
    let registry = DeviceRegistry::default();
    let mut ctx = context(&config);

    let revisions = |lib: &Library| {
        lib.modules()
            .map(|(id, m)| (id, m.name().clone(), m.revision()))
            .collect::<Vec<_>>()
    };
    let before = revisions(&lib);

    let optimizer = BufferOptimizer::new(&lib, &tech, &config, &registry);
    let first = optimizer.run(&chains(&bank), &mut ctx).unwrap();
    assert_eq!(revisions(&lib), before);

    optimizer.run(&chains(&bank), &mut ctx).unwrap();
    for report in &first {
        assert_eq!(
            ctx.get_old(&report.chain).unwrap(),
            report.sizes.stages.as_slice()
        );
    }
}

#[test]
fn per_chain_bound_limits_sizes() {
    let mut lib = Library::new("per_chain_bound_limits_sizes");
    let bank = bank(&mut lib);
    let tech = Technology::default();
    let config = RunConfig::from_toml_str("max_wl_en_buf = 3.0\n").unwrap();
    let registry = DeviceRegistry::default();
    let mut ctx = context(&config);

    let specs: Vec<_> = chains(&bank)
        .into_iter()
        .filter(|c| c.name.as_str() == WL_EN_BUF)
        .collect();
    BufferOptimizer::new(&lib, &tech, &config, &registry)
        .run(&specs, &mut ctx)
        .unwrap();
    assert!(ctx
        .get(WL_EN_BUF)
        .unwrap()
        .iter()
        .all(|&s| (1.0..=3.0).contains(&s)));
    assert_eq!(ctx.get(PC_BUF).unwrap(), &[1.0, 3.0, 9.0]);
}

#[test]
fn unloaded_chain_aborts_pass() {
    let mut lib = Library::new("unloaded_chain_aborts_pass");
    let bank = bank(&mut lib);
    let tech = Technology::default();
    let config = RunConfig::default();
    let registry = DeviceRegistry::default();
    let mut ctx = context(&config);
    ctx.set("col_buf", vec![1.0, 2.0]);

    let mut specs = chains(&bank);
    let mut col = specs[0].clone();
    col.name = arcstr::literal!("col_buf");
    col.buffer_stage_inst = arcstr::literal!("col_en");
    col.driver_inst = arcstr::literal!("pc_buf");
    col.outputs = vec![ChainOutput::new("col_x", LoadTerminal::Out)];
    specs.push(col);

    let err = BufferOptimizer::new(&lib, &tech, &config, &registry)
        .run(&specs, &mut ctx)
        .unwrap_err();
    assert_eq!(
        err,
        Error::NoLoad {
            chain: arcstr::literal!("col_buf")
        }
    );
    assert_eq!(ctx.get(WL_EN_BUF).unwrap(), &[1.0, 2.0, 4.0, 8.0]);
    assert!(ctx.get_old(WL_EN_BUF).is_none());
}

#[test]
fn boundary_consumers_load_sense_enable() {
    let mut lib = Library::new("boundary_consumers_load_sense_enable");
    let bank = bank(&mut lib);
    let tech = Technology::default();
    let config = RunConfig::default();
    let extractor = DeviceExtractor::new();
    let model = TimingModel::new(&lib, &extractor, &tech, &config);

    let chain = sense_en_chain(&bank);
    let p = extract_loads(&chain, &model, 2).unwrap();
    assert_eq!(p.parent, bank.id);
    assert_eq!(p.buffer_stage_inst, "sense_drv");
    assert_eq!(p.driver_inst, "wl_en_buf");
    assert_eq!(p.loads.len(), 1);
    assert_eq!(p.loads[0].pin, "sense_en");
    assert_relative_eq!(
        p.loads[0].cap,
        SENSE_AMPS as f64 * UNIT_CIN,
        max_relative = 1e-9
    );

    let mut bare = chain.clone();
    bare.outputs = vec![ChainOutput::new("sense_en", LoadTerminal::Out)];
    assert_eq!(
        extract_loads(&bare, &model, 2).unwrap_err(),
        Error::NoLoad {
            chain: arcstr::literal!("sense_en_buf")
        }
    );

    let registry = DeviceRegistry::default();
    let mut ctx = context(&config);
    ctx.set(SENSE_EN_BUF, vec![1.0, 2.0]);
    let reports = BufferOptimizer::new(&lib, &tech, &config, &registry)
        .run(&[chain], &mut ctx)
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(ctx.get_old(SENSE_EN_BUF).unwrap(), &[1.0, 2.0]);
}
