//! Teleportation: merging pooled fragments into a final archive next to the
//! storage that holds them.
//!
//! The deploying process uploads each fragment of a large unit to the blob
//! pool and sends a [`TeleportRequest`] naming those fragments and a
//! destination. The merge fetches every fragment concurrently, refuses to
//! write anything if a single fetch fails or two fragments share a path, and
//! otherwise writes the deterministic merged archive to the destination.
//!
//! [`LocalTeleporter`] runs the merge in-process; [`HttpTeleporter`] calls the
//! `conductor-teleport` service built from [`service::router`].

pub mod config;
pub mod error;
pub mod merge;
pub mod protocol;
pub mod service;
pub mod teleporter;

pub use config::{ServiceConfig, TeleportConfig, TeleportMode};
pub use error::{FragmentFailure, TeleportError, TeleportResult};
pub use merge::merge_fragments;
pub use protocol::{InvocationBody, InvocationResponse, TeleportRequest, TeleportResponse};
pub use teleporter::{HttpTeleporter, LocalTeleporter, Teleporter};
