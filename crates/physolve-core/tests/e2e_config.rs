//! E2E test for loading engine configuration from disk

use anyhow::Result;
use physolve_core::config::EngineConfig;
use physolve_core::ir::model::{ParameterSpec, ProblemMetadata, ProblemModel, SystemSpec};
use physolve_core::{IrBuilder, PhysolveError, Simulator, SolverMethod};
use std::io::Write;

#[test]
fn e2e_config_from_toml_file() -> Result<()> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    writeln!(
        file,
        r#"
[simulation]
method = "euler"
time_step = 0.005
duration = 2.0

[physics_validation]
conservation_threshold = 0.02
"#
    )?;

    let config = EngineConfig::from_file(file.path())?;
    assert_eq!(config.simulation.method, SolverMethod::Euler);
    assert_eq!(config.simulation.time_step, 0.005);
    assert_eq!(config.physics_validation.conservation_threshold, 0.02);
    assert_eq!(config.monitor.max_history_size, EngineConfig::default().monitor.max_history_size);
    Ok(())
}

#[test]
fn e2e_config_from_json_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("engine.json");
    std::fs::write(&path, r#"{"ir": {"cache_enabled": false}}"#)?;

    let config = EngineConfig::from_file(&path)?;
    assert!(!config.ir.cache_enabled);
    Ok(())
}

#[test]
fn e2e_config_save_and_reload() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("engine.toml");
    let mut config = EngineConfig::default();
    config.simulation = config.simulation.with_duration(4.0);

    config.to_file(&path)?;
    assert_eq!(EngineConfig::from_file(&path)?, config);
    Ok(())
}

#[test]
fn e2e_invalid_config_file_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("engine.toml");
    std::fs::write(&path, "[simulation]\nmax_iterations = 0\n")?;

    assert!(matches!(
        EngineConfig::from_file(&path),
        Err(PhysolveError::Config(_))
    ));
    assert!(matches!(
        EngineConfig::from_file(dir.path().join("missing.toml")),
        Err(PhysolveError::Io(_))
    ));
    Ok(())
}

#[tokio::test]
async fn e2e_loaded_config_drives_simulation() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("engine.toml");
    std::fs::write(&path, "[simulation]\nduration = 0.5\ntime_step = 0.05\n")?;
    let config = EngineConfig::from_file(&path)?;

    let model = ProblemModel {
        metadata: Some(ProblemMetadata {
            description: "A ball is dropped from a height of 20 m.".to_string(),
            ..Default::default()
        }),
        system: Some(SystemSpec {
            system_type: "free_fall".to_string(),
            parameters: vec![
                ParameterSpec::given("h", 20.0, "m"),
                ParameterSpec::given("g", 9.8, "m/s^2"),
                ParameterSpec::unknown("v", "m/s"),
            ],
            ..Default::default()
        }),
        ..Default::default()
    };
    let ir = IrBuilder::with_options(config.ir.clone())
        .convert(&model)
        .await
        .ir
        .ok_or_else(|| anyhow::anyhow!("conversion produced no IR"))?;

    let result = Simulator::new(config.simulation.clone())
        .with_monitor_config(config.monitor.clone())
        .run(&ir)
        .await;
    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.metrics.total_steps, 10);
    assert!((result.final_state.time - 0.5).abs() < 1e-9);
    Ok(())
}
