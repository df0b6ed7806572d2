//! Implementation of the `conductor package` command.

use std::path::Path;

use anyhow::{bail, Context};
use conductor_deploy::unit_build;

use super::{load_config, load_spec};

pub async fn run(
    spec_path: &Path,
    unit: &str,
    target: Option<&str>,
    config_path: Option<&Path>,
    out: Option<&Path>,
) -> anyhow::Result<()> {
    let spec = load_spec(spec_path)?;
    let config = load_config(config_path)?;
    let target = spec.target(target)?;

    let Some(build) = unit_build(&spec, target, spec.unit(unit)?) else {
        bail!("unit {unit} has no entry point, so there is nothing to package");
    };

    let packager = config
        .packager(&spec.base_dir)
        .await
        .context("resolving installed packages")?;
    let packaged = packager.run(&build).await?;

    println!("{}", packaged.fingerprint);
    eprintln!(
        "{} fragments, {} packages, {} bytes of content",
        packaged.fragments.len(),
        packaged.dependencies.len(),
        packaged.content_size()
    );

    if let Some(out) = out {
        let bytes = packaged.archive()?.to_zip()?;
        tokio::fs::write(out, &bytes)
            .await
            .with_context(|| format!("writing {}", out.display()))?;
        eprintln!("Deployable written to {}", out.display());
    }
    Ok(())
}
