//! A small SRAM bank with three tunable control chains.

use arcstr::ArcStr;
use config::{ConfigContext, RunConfig};
use hier::{Direction, Library, Module, ModuleId};
use sizing::devices::DeviceRequest;
use sizing::{ChainKind, ChainOutput, ChainSpec, DeviceKey, DeviceRegistry, LoadTerminal};
use timing::Technology;

pub const WL_EN_BUF: &str = "wl_en_buf";
pub const PC_BUF: &str = "pc_buf";
pub const PREDEC_BUF: &str = "predec_buf";

pub const NUM_COLS: usize = 16;
pub const BITLINE_CAP: f64 = 5e-14;
pub const SENSE_EN_BUF: &str = "sense_en_buf";
/// Sense amplifiers outside the bank enabled by `sense_en`.
pub const SENSE_AMPS: usize = 8;

pub struct Bank {
    pub id: ModuleId,
    pub row: ModuleId,
    pub inv: ModuleId,
    pub nand: ModuleId,
}

fn unit(lib: &mut Library, class: &str) -> ModuleId {
    let module = DeviceRegistry::default()
        .build(
            &DeviceRequest::new(DeviceKey::new(class), 1.0),
            &Technology::default(),
        )
        .unwrap();
    lib.add_module(module)
}

fn add(lib: &mut Library, parent: ModuleId, name: &str, child: ModuleId, nets: &[&str]) {
    lib.add_inst(parent, name, child).unwrap();
    lib.connect_inst(parent, nets.iter().copied(), true).unwrap();
}

/// Four wordline drivers sharing one enable.
fn wl_driver_row(lib: &mut Library, inv: ModuleId) -> ModuleId {
    let mut row = Module::new("wl_driver_row");
    row.add_pin_list(["en", "wl0", "wl1", "wl2", "wl3", "vdd", "gnd"], &[])
        .unwrap();
    let row = lib.add_module(row);
    for i in 0..4 {
        let wl = format!("wl{i}");
        add(lib, row, &format!("drv{i}"), inv, &["en", wl.as_str(), "vdd", "gnd"]);
    }
    row
}

/// Builds the bank into `lib`.
///
/// `drv_clk` drives `wl_en_buf` onto two wordline driver rows, `drv_we` drives
/// `pc_buf` onto the precharge enable, and `drv_dec` drives `predec_buf` onto
/// four predecoder gates.
pub fn bank(lib: &mut Library) -> Bank {
    let inv = unit(lib, "pinv");
    let nand = unit(lib, "pnand2");
    let row = wl_driver_row(lib, inv);

    let mut bank = Module::new("bank");
    bank.add_pin_list(
        ["clk", "we", "addr0", "addr1", "sense_en", "vdd", "gnd"],
        &[
            Direction::Input,
            Direction::Input,
            Direction::Input,
            Direction::Input,
            Direction::Output,
            Direction::Power,
            Direction::Ground,
        ],
    )
    .unwrap();
    let id = lib.add_module(bank);

    add(lib, id, "drv_clk", inv, &["clk", "clk_b", "vdd", "gnd"]);
    add(lib, id, "wl_en_buf", inv, &["clk_b", "wl_en", "vdd", "gnd"]);
    add(lib, id, "row0", row, &["wl_en", "wl0", "wl1", "wl2", "wl3", "vdd", "gnd"]);
    add(lib, id, "row1", row, &["wl_en", "wl4", "wl5", "wl6", "wl7", "vdd", "gnd"]);
    add(lib, id, "sense_drv", inv, &["wl_en", "sense_en", "vdd", "gnd"]);

    add(lib, id, "drv_we", inv, &["we", "we_b", "vdd", "gnd"]);
    add(lib, id, "pc_buf", inv, &["we_b", "pc_b", "vdd", "gnd"]);
    add(lib, id, "col_en", inv, &["pc_b", "col_x", "vdd", "gnd"]);

    add(lib, id, "drv_dec", nand, &["addr0", "addr1", "dec_en", "vdd", "gnd"]);
    add(lib, id, "predec_buf", inv, &["dec_en", "dec_out", "vdd", "gnd"]);
    for i in 0..4 {
        let addr = if i % 2 == 0 { "addr0" } else { "addr1" };
        let pd = format!("pd{i}");
        add(lib, id, &format!("pd_nand{i}"), nand, &["dec_out", addr, pd.as_str(), "vdd", "gnd"]);
    }

    Bank { id, row, inv, nand }
}

fn spec(bank: &Bank, name: &str, kind: ChainKind, driver: &str, outputs: Vec<ChainOutput>) -> ChainSpec {
    ChainSpec {
        name: ArcStr::from(name),
        kind,
        parent: bank.id,
        buffer_stage_inst: ArcStr::from(name),
        driver_inst: ArcStr::from(driver),
        outputs,
        stage_device: DeviceKey::new("pinv"),
    }
}

/// The bank's tunable chains.
pub fn chains(bank: &Bank) -> Vec<ChainSpec> {
    vec![
        spec(
            bank,
            WL_EN_BUF,
            ChainKind::Buffer,
            "drv_clk",
            vec![ChainOutput::new("wl_en", LoadTerminal::Out).with_rail_cap(2e-15)],
        ),
        spec(
            bank,
            PC_BUF,
            ChainKind::Precharge {
                device: DeviceKey::new("precharge"),
                num_cols: NUM_COLS,
                bitline_cap: BITLINE_CAP,
            },
            "drv_we",
            vec![ChainOutput::new("pc_b", LoadTerminal::OutInv)],
        ),
        spec(
            bank,
            PREDEC_BUF,
            ChainKind::Predecode,
            "drv_dec",
            vec![ChainOutput::new("dec_out", LoadTerminal::Out)],
        ),
    ]
}

/// Initial stage sizes of every chain.
pub fn context(config: &RunConfig) -> ConfigContext {
    let mut ctx = ConfigContext::from_config(config);
    ctx.set(WL_EN_BUF, vec![1.0, 2.0, 4.0, 8.0]);
    ctx.set(PC_BUF, vec![1.0, 3.0, 9.0]);
    ctx.set(PREDEC_BUF, vec![config.predecode_sizes[0], 2.0, 4.0]);
    ctx
}

/// The sense enable chain: `sense_drv`, fed by `wl_en_buf`, drives the
/// `sense_en` pin, which only loads sense amplifiers beyond the bank.
pub fn sense_en_chain(bank: &Bank) -> ChainSpec {
    let mut chain = spec(
        bank,
        SENSE_EN_BUF,
        ChainKind::Buffer,
        "wl_en_buf",
        vec![ChainOutput::new("sense_en", LoadTerminal::Out).with_boundary_consumer(
            bank.inv,
            "A",
            SENSE_AMPS,
        )],
    );
    chain.buffer_stage_inst = arcstr::literal!("sense_drv");
    chain
}
