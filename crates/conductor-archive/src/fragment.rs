//! Insertion-ordered atom collections.

use std::collections::HashSet;

use crate::atom::Atom;
use crate::error::{ArchiveError, ArchiveResult};

/// An insertion-ordered collection of atoms with unique paths.
#[derive(Debug, Clone, Default)]
pub struct Fragment {
    name: Option<String>,
    atoms: Vec<Atom>,
    paths: HashSet<String>,
}

impl Fragment {
    /// Create an empty, unnamed fragment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty fragment with a name used in diagnostics.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// The fragment name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Add an atom.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::DuplicatePath`] if the path is already present.
    pub fn add(&mut self, atom: Atom) -> ArchiveResult<()> {
        if self.paths.contains(atom.path()) {
            return Err(ArchiveError::DuplicatePath {
                path: atom.path().to_owned(),
            });
        }
        self.paths.insert(atom.path().to_owned());
        self.atoms.push(atom);
        Ok(())
    }

    /// Add every atom of `other` to this fragment.
    ///
    /// All collisions are checked before anything is committed, so on error
    /// neither fragment is modified.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::DuplicatePath`] naming the first colliding path
    /// in `other`'s insertion order.
    pub fn merge(&mut self, other: &Self) -> ArchiveResult<()> {
        if let Some(atom) = other.atoms.iter().find(|a| self.paths.contains(a.path())) {
            return Err(ArchiveError::DuplicatePath {
                path: atom.path().to_owned(),
            });
        }
        self.paths.reserve(other.atoms.len());
        self.atoms.reserve(other.atoms.len());
        for atom in &other.atoms {
            self.paths.insert(atom.path().to_owned());
            self.atoms.push(atom.clone());
        }
        Ok(())
    }

    /// Return a copy of this fragment with every atom relocated under `prefix`.
    pub fn under(&self, prefix: &str) -> ArchiveResult<Self> {
        let mut relocated = Self {
            name: self.name.clone(),
            ..Self::default()
        };
        for atom in &self.atoms {
            relocated.add(atom.under(prefix)?)?;
        }
        Ok(relocated)
    }

    /// Whether an atom with this path exists.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Atoms in insertion order.
    #[must_use]
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Iterate over atoms in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Atom> {
        self.atoms.iter()
    }

    /// Number of atoms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// Whether the fragment has no atoms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Total content size of all atoms.
    #[must_use]
    pub fn content_size(&self) -> u64 {
        self.atoms.iter().map(|a| a.len() as u64).sum()
    }

    /// Consume the fragment, returning its atoms in insertion order.
    #[must_use]
    pub fn into_atoms(self) -> Vec<Atom> {
        self.atoms
    }
}

impl<'a> IntoIterator for &'a Fragment {
    type Item = &'a Atom;
    type IntoIter = std::slice::Iter<'a, Atom>;

    fn into_iter(self) -> Self::IntoIter {
        self.atoms.iter()
    }
}
