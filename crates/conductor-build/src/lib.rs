//! Dependency resolution and unit packaging.
//!
//! # Architecture
//!
//! ```text
//! GraphSource ──▶ DependencyResolver (prepopulated once per run)
//!                        │ fork per unit
//!                        ▼
//! Compiler ──────▶ Packager::run ──▶ PackagedUnit { fingerprint, fragments }
//! ```
//!
//! Installation roots are resolved once from configuration and handed to the
//! resolver; nothing here looks them up lazily.

pub mod compiler;
pub mod config;
pub mod error;
pub mod graph;
pub mod packager;
pub mod resolver;
pub mod roots;
pub mod tree;

pub use compiler::{CompileOutput, Compiler, SourceTreeCompiler};
pub use config::ResolverConfig;
pub use error::{BuildError, BuildResult};
pub use graph::{CommandGraphSource, GraphNode, GraphSource, StaticGraphSource};
pub use packager::{PackagedUnit, Packager, UnitBuild, WiringTarget, MANIFEST_ATOM, WIRING_ATOM};
pub use resolver::{DependencyRecord, DependencyResolver, PackageUsage, UsageSet};
pub use roots::{owning_package, InstallRoots, PackageFilter};
