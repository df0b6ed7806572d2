//! Archive model for Conductor.
//!
//! Units are bundled as [`Fragment`]s of path-addressed [`Atom`]s. Fragments
//! combine into an [`Archive`] whose encoding is byte-for-byte reproducible:
//!
//! ```text
//! Atom ──▶ Fragment ──┐
//! Atom ──▶ Fragment ──┼──▶ Archive ──▶ tar.zst (pooled fragments)
//! Atom ──▶ Fragment ──┘        ├──▶ zip (deployables)
//!                              └──▶ Fingerprint (sha256 over sorted atoms)
//! ```
//!
//! The pool key and the change-detection signal both hash these bytes, so
//! determinism here is load-bearing for the whole pipeline.

pub mod archive;
pub mod atom;
pub mod error;
pub mod fingerprint;
pub mod fragment;

pub use archive::{Archive, Entry, CANONICAL_MTIME, COMPRESSION_LEVEL, DEPLOYABLE_EXTENSION};
pub use atom::{validate_path, Atom};
pub use error::{ArchiveError, ArchiveResult};
pub use fingerprint::Fingerprint;
pub use fragment::Fragment;
