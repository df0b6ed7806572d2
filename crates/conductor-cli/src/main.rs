//! Conductor CLI - package and deploy instruments.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(about = "Package and deploy serverless instruments")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to conductor.toml)
    #[arg(short, long, global = true, env = "CONDUCTOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Package, push and apply every unit of a deploy specification
    Deploy {
        /// Deploy specification (.json or .toml)
        spec: PathBuf,

        /// Target to deploy to (required when several are declared)
        #[arg(short, long)]
        target: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build one unit locally and print its fingerprint
    Package {
        /// Deploy specification (.json or .toml)
        spec: PathBuf,

        /// Unit to package
        #[arg(short, long)]
        unit: String,

        /// Target whose wiring is baked into the archive
        #[arg(short, long)]
        target: Option<String>,

        /// Write the zip deployable to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print the fingerprint of every unit with code
    Fingerprint {
        /// Deploy specification (.json or .toml)
        spec: PathBuf,

        /// Target whose wiring is baked into the archives
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Check a deploy specification without touching anything
    Validate {
        /// Deploy specification (.json or .toml)
        spec: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("conductor=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Deploy { spec, target, json } => {
            commands::deploy::run(&spec, target.as_deref(), config, json).await
        }
        Commands::Package {
            spec,
            unit,
            target,
            out,
        } => {
            commands::package::run(&spec, &unit, target.as_deref(), config, out.as_deref()).await
        }
        Commands::Fingerprint { spec, target } => {
            commands::fingerprint::run(&spec, target.as_deref(), config).await
        }
        Commands::Validate { spec } => commands::validate::run(&spec),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn package_requires_unit() {
        assert!(Cli::try_parse_from(["conductor", "package", "deploy.json"]).is_err());
        assert!(
            Cli::try_parse_from(["conductor", "package", "deploy.json", "--unit", "api"]).is_ok()
        );
    }
}
