//! Deploy orchestration for Conductor.
//!
//! # Architecture
//!
//! ```text
//! DeploySpec ──▶ Orchestrator
//!                  │ per unit, concurrently
//!                  ├──▶ Packager ──▶ ArtifactPusher ──▶ deployables/<name>.zip
//!                  │                     └── large units: BlobPool + Teleporter
//!                  │ after every push
//!                  ├──▶ assemble ──▶ StackPusher ──▶ StackBackend
//!                  │ after apply, changed units only
//!                  └──▶ CodeUpdater
//! ```

pub mod codeupdate;
pub mod config;
pub mod error;
pub mod naming;
pub mod orchestrator;
pub mod push;
pub mod spec;
pub mod stack;

pub use codeupdate::{
    CodeUpdate, CodeUpdater, HttpCodeUpdater, LogCodeUpdater, RecordingCodeUpdater,
};
pub use config::DeployConfig;
pub use error::{DeployError, DeployResult};
pub use orchestrator::{package_all, unit_build, DeployReport, Orchestrator, UnitReport};
pub use push::{ArtifactPusher, PushOutcome, DIGEST_SUFFIX};
pub use spec::{DeploySpec, PolicyStatement, ResourceSpec, TargetSpec, UnitSpec, WiringSpec};
pub use stack::{
    ApplyOutcome, HttpStackBackend, MemoryStackBackend, ObjectStoreStackBackend, Stack,
    StackBackend, StackPusher, StackResource,
};
