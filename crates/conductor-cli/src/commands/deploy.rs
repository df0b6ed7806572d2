//! Implementation of the `conductor deploy` command.

use std::path::Path;

use anyhow::Context;
use conductor_deploy::{ApplyOutcome, Orchestrator};
use tracing::debug;

use super::{load_config, load_spec};

pub async fn run(
    spec_path: &Path,
    target: Option<&str>,
    config_path: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let spec = load_spec(spec_path)?;
    let config = load_config(config_path)?;
    debug!(storage = %config.storage.storage_type, "configuration loaded");

    let orchestrator = Orchestrator::from_config(&config, &spec.base_dir)
        .await
        .context("preparing deploy")?;
    let report = orchestrator
        .deploy(&spec, target)
        .await
        .with_context(|| format!("deploying {}", spec.project))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Deployed {} to {}", spec.project, report.target);
    for unit in &report.units {
        let status = match (&unit.fingerprint, unit.was_pushed) {
            (None, _) => "definition only",
            (Some(_), true) => "updated",
            (Some(_), false) => "unchanged",
        };
        let fingerprint = unit.fingerprint.as_ref().map_or("-", |f| f.short());
        println!("  {:<24} {:<16} {}", unit.unit, status, fingerprint);
    }
    match report.stack {
        ApplyOutcome::Applied => println!("Stack applied"),
        ApplyOutcome::NoChange => println!("Stack unchanged"),
    }
    Ok(())
}
