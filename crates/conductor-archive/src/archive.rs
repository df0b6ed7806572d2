//! Materialised archives and their deterministic encodings.
//!
//! An [`Archive`] is the union of one or more fragments. Materialising it
//! synthesises one directory entry per path prefix and emits every entry in
//! sorted path order with fixed metadata, so the same atom set always encodes
//! to the same bytes.
//!
//! Two encodings exist. Pooled fragments travel as tar.zst
//! ([`Archive::to_bytes`]); deployables handed to the function provider are
//! zip ([`Archive::to_zip`]).

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read, Write};

use bytes::Bytes;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::atom::{validate_path, Atom};
use crate::error::{ArchiveError, ArchiveResult};
use crate::fragment::Fragment;

/// Timestamp written on every entry: 1980-01-01T00:00:00Z.
pub const CANONICAL_MTIME: u64 = 315_532_800;

/// Zstd level used for every encoded archive.
pub const COMPRESSION_LEVEL: i32 = 3;

/// File extension of deployables produced by [`Archive::to_zip`].
pub const DEPLOYABLE_EXTENSION: &str = "zip";

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// One entry of a materialised archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A synthesised directory.
    Directory {
        /// Directory path without trailing slash.
        path: String,
    },
    /// A file taken from an atom.
    File {
        /// File path.
        path: String,
        /// File content.
        content: Bytes,
    },
}

impl Entry {
    /// The entry path.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Directory { path } | Self::File { path, .. } => path,
        }
    }
}

/// A set of files keyed by path, ready to be materialised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    files: BTreeMap<String, Bytes>,
}

impl Archive {
    /// Build an archive from a single fragment.
    #[must_use]
    pub fn from_fragment(fragment: &Fragment) -> Self {
        let files = fragment
            .iter()
            .map(|a| (a.path().to_owned(), a.bytes().clone()))
            .collect();
        Self { files }
    }

    /// Build an archive from several fragments.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::DuplicatePath`] if two fragments share a path.
    pub fn from_fragments<'a>(
        fragments: impl IntoIterator<Item = &'a Fragment>,
    ) -> ArchiveResult<Self> {
        let mut files = BTreeMap::new();
        for fragment in fragments {
            for atom in fragment {
                if files
                    .insert(atom.path().to_owned(), atom.bytes().clone())
                    .is_some()
                {
                    return Err(ArchiveError::DuplicatePath {
                        path: atom.path().to_owned(),
                    });
                }
            }
        }
        Ok(Self { files })
    }

    /// Merge the file entries of several archives into one.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::ArchiveConflict`] if any path appears in more
    /// than one input.
    pub fn merge(archives: impl IntoIterator<Item = Self>) -> ArchiveResult<Self> {
        let mut files = BTreeMap::new();
        for archive in archives {
            for (path, content) in archive.files {
                if files.contains_key(&path) {
                    return Err(ArchiveError::ArchiveConflict { path });
                }
                files.insert(path, content);
            }
        }
        Ok(Self { files })
    }

    /// Number of files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Whether the archive has no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Content of the file at `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Bytes> {
        self.files.get(path)
    }

    /// Iterate over files in sorted path order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c))
    }

    /// Convert the files back into a fragment (sorted insertion order).
    pub fn into_fragment(self, name: impl Into<String>) -> ArchiveResult<Fragment> {
        let mut fragment = Fragment::named(name);
        for (path, content) in self.files {
            fragment.add(Atom::new(path, content)?)?;
        }
        Ok(fragment)
    }

    /// Materialise the archive tree.
    ///
    /// Every ancestor directory of every file is created exactly once, walking
    /// each path's segments top-down. Entries come back in sorted path order.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NotADirectory`] if a file path is also the
    /// parent of another file.
    pub fn materialize(&self) -> ArchiveResult<Vec<Entry>> {
        let mut directories: BTreeSet<&str> = BTreeSet::new();
        let mut worklist: Vec<&str> = Vec::new();

        for path in self.files.keys() {
            worklist.clear();
            worklist.extend(path.match_indices('/').map(|(index, _)| &path[..index]));
            for directory in worklist.drain(..) {
                if self.files.contains_key(directory) {
                    return Err(ArchiveError::NotADirectory {
                        path: directory.to_owned(),
                    });
                }
                directories.insert(directory);
            }
        }

        let mut entries: Vec<Entry> = directories
            .into_iter()
            .map(|path| Entry::Directory {
                path: path.to_owned(),
            })
            .chain(self.files.iter().map(|(path, content)| Entry::File {
                path: path.clone(),
                content: content.clone(),
            }))
            .collect();
        entries.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(entries)
    }

    /// Encode the archive as a deterministic zip deployable.
    ///
    /// Every entry carries the DOS epoch (1980-01-01 00:00:00, the same
    /// instant as [`CANONICAL_MTIME`]) and fixed unix permissions. Files are
    /// deflated; directories are stored.
    pub fn to_zip(&self) -> ArchiveResult<Bytes> {
        let entries = self.materialize()?;
        let base = SimpleFileOptions::default().last_modified_time(DateTime::default());
        let directory_options = base
            .compression_method(CompressionMethod::Stored)
            .unix_permissions(DIR_MODE);
        let file_options = base
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(FILE_MODE);

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in &entries {
            match entry {
                Entry::Directory { path } => {
                    writer.add_directory(format!("{path}/"), directory_options)?;
                }
                Entry::File { path, content } => {
                    writer.start_file(path.as_str(), file_options)?;
                    writer.write_all(content)?;
                }
            }
        }
        let data = writer.finish()?.into_inner();

        debug!(
            entries = entries.len(),
            size = data.len(),
            "encoded deployable"
        );
        Ok(Bytes::from(data))
    }

    /// Decode a zip deployable produced by [`Archive::to_zip`].
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Corrupt`] for unreadable zip data, symlinks,
    /// invalid paths, or a file path that appears twice.
    pub fn from_zip(data: &[u8]) -> ArchiveResult<Self> {
        let corrupt = |e: zip::result::ZipError| ArchiveError::Corrupt(format!("zip: {e}"));
        let mut archive = ZipArchive::new(Cursor::new(data)).map_err(corrupt)?;
        let mut files = BTreeMap::new();

        for index in 0..archive.len() {
            let mut file = archive.by_index(index).map_err(corrupt)?;
            if file.is_dir() {
                continue;
            }
            if file.is_symlink() {
                return Err(ArchiveError::Corrupt(format!(
                    "unsupported symlink {}",
                    file.name()
                )));
            }

            let path = file.name().to_owned();
            validate_path(&path).map_err(|e| ArchiveError::Corrupt(e.to_string()))?;

            let mut content = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
            file.read_to_end(&mut content)?;

            if files.insert(path.clone(), Bytes::from(content)).is_some() {
                return Err(ArchiveError::Corrupt(format!("duplicate entry {path}")));
            }
        }

        Ok(Self { files })
    }

    /// Encode the archive as deterministic tar.zst bytes.
    pub fn to_bytes(&self) -> ArchiveResult<Bytes> {
        let entries = self.materialize()?;
        let mut builder = tar::Builder::new(Vec::new());

        for entry in &entries {
            let mut header = tar::Header::new_gnu();
            header.set_mtime(CANONICAL_MTIME);
            header.set_uid(0);
            header.set_gid(0);
            match entry {
                Entry::Directory { path } => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_mode(DIR_MODE);
                    header.set_size(0);
                    builder.append_data(&mut header, format!("{path}/"), std::io::empty())?;
                }
                Entry::File { path, content } => {
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_mode(FILE_MODE);
                    header.set_size(content.len() as u64);
                    builder.append_data(&mut header, path, content.as_ref())?;
                }
            }
        }

        let tar_data = builder.into_inner()?;
        let compressed = zstd::encode_all(Cursor::new(&tar_data), COMPRESSION_LEVEL)?;

        debug!(
            entries = entries.len(),
            uncompressed_size = tar_data.len(),
            compressed_size = compressed.len(),
            "encoded archive"
        );

        Ok(Bytes::from(compressed))
    }

    /// Decode tar.zst bytes produced by [`Archive::to_bytes`].
    ///
    /// Directory entries are skipped; they are synthesised again on encode.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Corrupt`] for unsupported entry types, invalid
    /// paths, or a file path that appears twice.
    pub fn from_bytes(data: &[u8]) -> ArchiveResult<Self> {
        let decompressed = zstd::decode_all(Cursor::new(data))
            .map_err(|e| ArchiveError::Corrupt(format!("zstd: {e}")))?;

        let mut archive = tar::Archive::new(Cursor::new(decompressed));
        let mut files = BTreeMap::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            let entry_type = entry.header().entry_type();
            if entry_type.is_dir() {
                continue;
            }
            if !entry_type.is_file() {
                return Err(ArchiveError::Corrupt(format!(
                    "unsupported entry type {entry_type:?}"
                )));
            }

            let path = entry
                .path()?
                .to_str()
                .map(ToOwned::to_owned)
                .ok_or_else(|| ArchiveError::Corrupt("non UTF-8 entry path".to_owned()))?;
            validate_path(&path).map_err(|e| ArchiveError::Corrupt(e.to_string()))?;

            let mut content = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
            entry.read_to_end(&mut content)?;

            if files.insert(path.clone(), Bytes::from(content)).is_some() {
                return Err(ArchiveError::Corrupt(format!("duplicate entry {path}")));
            }
        }

        Ok(Self { files })
    }
}
