//! Implementation of the `conductor validate` command.

use std::path::Path;

use super::load_spec;

pub fn run(spec_path: &Path) -> anyhow::Result<()> {
    let spec = load_spec(spec_path)?;

    let with_code = spec.units.iter().filter(|u| u.has_code()).count();
    println!("Project {} is valid", spec.project);
    println!(
        "  {} units ({} with code, {} definition-only)",
        spec.units.len(),
        with_code,
        spec.units.len() - with_code
    );
    println!("  {} wiring edges", spec.wiring.len());
    for target in &spec.targets {
        println!(
            "  target {}: {} in {}",
            target.name, target.environment, target.region
        );
    }
    Ok(())
}
