//! Subcommand implementations.

pub mod deploy;
pub mod fingerprint;
pub mod package;
pub mod validate;

use std::path::Path;

use anyhow::Context;
use conductor_deploy::{DeployConfig, DeploySpec};

/// Load the deploy specification at `path`.
pub fn load_spec(path: &Path) -> anyhow::Result<DeploySpec> {
    DeploySpec::load(path).with_context(|| format!("loading {}", path.display()))
}

/// Load configuration from `path`, or `conductor.toml` when absent.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<DeployConfig> {
    DeployConfig::load(path).context("loading configuration")
}
