//! Path-addressed content atoms.

use std::fmt;

use bytes::Bytes;

use crate::error::{ArchiveError, ArchiveResult};

/// A single file destined for an archive: a relative slash-separated path
/// and its content.
#[derive(Clone, PartialEq, Eq)]
pub struct Atom {
    path: String,
    content: Bytes,
}

impl Atom {
    /// Create a new atom, validating the path.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::InvalidPath`] if the path is absolute, empty,
    /// or contains empty, `.` or `..` segments.
    pub fn new(path: impl Into<String>, content: impl Into<Bytes>) -> ArchiveResult<Self> {
        let path = path.into();
        validate_path(&path)?;
        Ok(Self {
            path,
            content: content.into(),
        })
    }

    /// The atom's relative path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The atom's content.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// The atom's content as shared bytes.
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.content
    }

    /// Size of the content in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether the content is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Return a copy of this atom relocated under `prefix`.
    ///
    /// An empty prefix returns the atom unchanged.
    pub fn under(&self, prefix: &str) -> ArchiveResult<Self> {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            return Ok(self.clone());
        }
        Self::new(format!("{prefix}/{}", self.path), self.content.clone())
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atom")
            .field("path", &self.path)
            .field("len", &self.content.len())
            .finish()
    }
}

/// Check that `path` is a normalised relative path.
pub fn validate_path(path: &str) -> ArchiveResult<()> {
    let invalid = |reason| ArchiveError::InvalidPath {
        path: path.to_owned(),
        reason,
    };

    if path.is_empty() {
        return Err(invalid("path is empty"));
    }
    if path.starts_with('/') {
        return Err(invalid("path must be relative"));
    }
    if path.contains('\\') {
        return Err(invalid("path must use forward slashes"));
    }
    for segment in path.split('/') {
        match segment {
            "" => return Err(invalid("path contains an empty segment")),
            "." | ".." => return Err(invalid("path contains a relative segment")),
            _ => {}
        }
    }
    Ok(())
}
