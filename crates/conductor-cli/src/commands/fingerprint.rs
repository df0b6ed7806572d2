//! Implementation of the `conductor fingerprint` command.

use std::path::Path;

use anyhow::Context;
use conductor_deploy::package_all;

use super::{load_config, load_spec};

pub async fn run(
    spec_path: &Path,
    target: Option<&str>,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    let spec = load_spec(spec_path)?;
    let config = load_config(config_path)?;
    let target = spec.target(target)?;

    let packager = config
        .packager(&spec.base_dir)
        .await
        .context("resolving installed packages")?;
    let units = package_all(&packager, &spec, target).await?;

    let width = units.iter().map(|u| u.unit.len()).max().unwrap_or(0);
    for unit in &units {
        println!("{:width$}  {}", unit.unit, unit.fingerprint);
    }
    Ok(())
}
