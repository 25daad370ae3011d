use anyhow::Result;
use approx::assert_relative_eq;
use test_log::test;

use crate::{paths, ConfigContext, Corner, Env, RunConfig};

const CONFIG: &str = r#"
use_characterization_data = true
max_buf_size = 32.0
max_wordline_driver = 16.0
buffer_optimization_size_penalty = 0.5
predecode_sizes = [1.0, 4.0]
corner = "ss"

[stage_sizes]
wordline_driver = [1.0, 4.0, 16.0]
clk_buf = [1.0, 2.0]
"#;

#[test]
fn defaults() {
    let config = RunConfig::default();
    assert!(!config.use_characterization_data);
    assert!(config.interpolate_characterization_data);
    assert_relative_eq!(config.max_buf_size, 64.0);
    assert_relative_eq!(config.buffer_optimization_size_penalty, 0.1);
    assert_eq!(config.corner, Corner::Tt);
    assert_eq!(RunConfig::from_toml_str("").unwrap(), config);
}

#[test]
fn parses_toml() -> Result<()> {
    let config = RunConfig::from_toml_str(CONFIG)?;
    assert!(config.use_characterization_data);
    assert_eq!(config.corner, Corner::Ss);
    assert_eq!(config.predecode_sizes, vec![1.0, 4.0]);
    assert_eq!(
        config.stage_sizes.keys().collect::<Vec<_>>(),
        vec!["wordline_driver", "clk_buf"]
    );
    assert_relative_eq!(config.max_size_for("wordline_driver"), 16.0);
    assert_relative_eq!(config.max_size_for("clk_buf"), 32.0);
    Ok(())
}

#[test]
fn rejects_invalid_values() {
    assert!(RunConfig::from_toml_str("max_buf_size = 0.5").is_err());
    assert!(RunConfig::from_toml_str("max_clk_buf = \"big\"").is_err());
    assert!(RunConfig::from_toml_str("corner = \"fast\"").is_err());
    assert!(RunConfig::from_toml_str("max_buf_size = ").is_err());
}

#[test]
fn environment_overrides() -> Result<()> {
    let mut config = RunConfig::from_toml_str(CONFIG)?;
    let env = Env::from_vars([
        ("SIZING_MAX_BUF_SIZE", "8"),
        ("SIZING_MAX_CLK_BUF", "4.5"),
        ("SIZING_CORNER", "FF"),
        ("HOME", "/root"),
    ]);
    assert_eq!(env.get("max_buf_size"), Some("8"));
    config.apply_env(&env)?;
    assert_relative_eq!(config.max_buf_size, 8.0);
    assert_relative_eq!(config.max_size_for("clk_buf"), 4.5);
    assert_eq!(config.corner, Corner::Ff);

    let bad = Env::from_vars([("SIZING_PRECHARGE_SIZE", "wide")]);
    assert!(config.apply_env(&bad).is_err());
    Ok(())
}

#[test]
fn discovers_nearest_config() -> Result<()> {
    let root = std::env::temp_dir().join(format!("sizing_config_{}", std::process::id()));
    let nested = root.join("a/b");
    std::fs::create_dir_all(&nested)?;
    std::fs::write(root.join("sizing.toml"), "max_buf_size = 12.0\n")?;

    let config = RunConfig::discover(&nested, &Env::default())?;
    assert_relative_eq!(config.max_buf_size, 12.0);

    std::fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn config_search_stops_at_root() -> Result<()> {
    let root = std::env::temp_dir().join(format!("sizing_config_stop_{}", std::process::id()));
    let nested = root.join("a/b");
    std::fs::create_dir_all(&nested)?;
    std::fs::write(root.join(paths::CONFIG_FILE_NAME), "")?;

    assert_eq!(
        paths::find_config(&nested, Some(&root)),
        Some(root.join(paths::CONFIG_FILE_NAME))
    );
    assert_eq!(paths::find_config(&nested, Some(&root.join("a"))), None);
    assert_eq!(paths::find_config(&nested, Some(&nested)), None);

    std::fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn commit_keeps_shadow_copy() {
    let config = RunConfig::from_toml_str(CONFIG).unwrap();
    let mut ctx = ConfigContext::from_config(&config);
    assert_eq!(ctx.get("wordline_driver"), Some(&[1.0, 4.0, 16.0][..]));
    assert_eq!(ctx.get("precharge_size"), Some(&[1.0][..]));
    assert_eq!(ctx.get_old("wordline_driver"), None);

    let prev = ctx.commit("wordline_driver", vec![2.0, 6.0]);
    assert_eq!(prev, Some(vec![1.0, 4.0, 16.0]));
    assert_eq!(ctx.get("wordline_driver"), Some(&[2.0, 6.0][..]));
    assert_eq!(ctx.get_old("wordline_driver"), Some(&[1.0, 4.0, 16.0][..]));

    assert_eq!(ctx.commit("new_chain", vec![3.0]), None);
    assert_eq!(ctx.get_old("new_chain"), None);

    let text = ctx.to_toml_string().unwrap();
    assert!(text.contains("wordline_driver_old"));
}

#[test]
fn stage_sizes_keep_file_order() -> Result<()> {
    let config = RunConfig::from_toml_str(
        "[stage_sizes]\nzeta = [1.0]\nalpha = [1.0, 2.0]\nmid = [3.0]\n",
    )?;
    assert_eq!(
        config.stage_sizes.keys().collect::<Vec<_>>(),
        vec!["zeta", "alpha", "mid"]
    );
    let ctx = ConfigContext::from_config(&config);
    let text = ctx.to_toml_string()?;
    let zeta = text.find("zeta").unwrap();
    let alpha = text.find("alpha").unwrap();
    assert!(zeta < alpha);
    Ok(())
}
