//! Build fingerprints.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::atom::Atom;

/// SHA-256 digest over the sorted `(path, content)` pairs of a bundle.
///
/// Each path and content is length-prefixed before hashing so that no two
/// distinct atom sets can produce the same digest input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a set of atoms. Input order is irrelevant.
    #[must_use]
    pub fn compute<'a>(atoms: impl IntoIterator<Item = &'a Atom>) -> Self {
        let mut atoms: Vec<&Atom> = atoms.into_iter().collect();
        atoms.sort_by(|a, b| a.path().cmp(b.path()));

        let mut hasher = Sha256::new();
        for atom in atoms {
            hasher.update((atom.path().len() as u64).to_le_bytes());
            hasher.update(atom.path().as_bytes());
            hasher.update((atom.len() as u64).to_le_bytes());
            hasher.update(atom.content());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Compute the fingerprint, skipping atoms whose path is in `exclude`.
    ///
    /// Used for bundles that carry atoms derived from the fingerprint itself.
    #[must_use]
    pub fn compute_excluding<'a>(
        atoms: impl IntoIterator<Item = &'a Atom>,
        exclude: &[&str],
    ) -> Self {
        Self::compute(atoms.into_iter().filter(|a| !exclude.contains(&a.path())))
    }

    /// Wrap an already computed hex digest.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn atoms(pairs: &[(&str, &'static str)]) -> Vec<Atom> {
        pairs
            .iter()
            .map(|(p, c)| Atom::new(*p, *c).unwrap())
            .collect()
    }

    #[test]
    fn order_does_not_matter() {
        let forward = atoms(&[("a", "1"), ("b", "2")]);
        let reverse = atoms(&[("b", "2"), ("a", "1")]);
        assert_eq!(Fingerprint::compute(&forward), Fingerprint::compute(&reverse));
    }

    #[test]
    fn content_and_paths_both_matter() {
        let base = Fingerprint::compute(&atoms(&[("a", "1")]));
        assert_ne!(base, Fingerprint::compute(&atoms(&[("a", "2")])));
        assert_ne!(base, Fingerprint::compute(&atoms(&[("b", "1")])));
    }

    #[test]
    fn boundaries_are_unambiguous() {
        let joined = Fingerprint::compute(&atoms(&[("ab", "c")]));
        let split = Fingerprint::compute(&atoms(&[("a", "bc")]));
        assert_ne!(joined, split);
    }

    #[test]
    fn excluded_atoms_do_not_contribute() {
        let code = atoms(&[("index.js", "x")]);
        let mut bundle = code.clone();
        bundle.push(Atom::new("build-manifest.json", "{}").unwrap());

        assert_ne!(Fingerprint::compute(&bundle), Fingerprint::compute(&code));
        assert_eq!(
            Fingerprint::compute_excluding(&bundle, &["build-manifest.json"]),
            Fingerprint::compute(&code)
        );
    }

    #[test]
    fn digest_is_hex_sha256() {
        let fingerprint = Fingerprint::compute(&atoms(&[("a", "1")]));
        assert_eq!(fingerprint.as_str().len(), 64);
        assert_eq!(fingerprint.short().len(), 12);
        assert_eq!(
            serde_json::to_string(&fingerprint).unwrap(),
            format!("\"{fingerprint}\"")
        );
    }
}
