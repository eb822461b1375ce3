//! Random access to the members of a saved image archive.
//!
//! [`OuterArchive`] wraps the image tarball on disk. It never keeps a file handle open:
//! every query reopens the file, streams the tar entries until the requested member is
//! found, and closes it again.
//!
//! - Compression is chosen from the file name (`.tar.gz`/`.tgz` → gzip), never sniffed.
//! - [`OuterArchive::extract_member`] returns the raw bytes of one member.
//! - [`OuterArchive::members_with_prefix`] lists members under a name prefix.
//! - [`OuterArchive::with_nested`] opens a member as a [`NestedArchive`] straight from the
//!   outer stream, so a layer's filesystem is never written to disk.
//!
//! Nested archives are sniffed for the gzip magic, since layer blobs in OCI layouts are
//! commonly compressed.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::{debug, trace};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tar_rs as tar;
use thiserror::Error;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Failures callers are expected to recognise with `downcast_ref`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("member {name} not found in image archive")]
    MemberNotFound { name: String },

    #[error("File or directory {path} not found in layer {layer}")]
    EntryNotFound { path: String, layer: usize },

    #[error("Could not find a filesystem archive for layer {layer}")]
    NoLayerArchive { layer: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Plain,
    Gzip,
}

impl Compression {
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("");

        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Compression::Gzip
        } else {
            Compression::Plain
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
    HardLink,
    Other,
}

/// One member of an archive, outer or nested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Normalized, forward-slash separated path without leading `./` or trailing `/`.
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    /// Raw symlink target, or the normalized archive path a hard link points at.
    pub link_target: Option<String>,
}

impl FileEntry {
    pub fn from_entry<R: Read>(entry: &tar::Entry<'_, R>) -> Self {
        let raw_path = entry.path_bytes();
        let entry_type = entry.header().entry_type();

        let kind = if entry_type.is_dir() || raw_path.ends_with(b"/") {
            EntryKind::Directory
        } else if entry_type.is_symlink() {
            EntryKind::Symlink
        } else if entry_type.is_hard_link() {
            EntryKind::HardLink
        } else if entry_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };

        let link_target = entry.link_name_bytes().map(|target| match kind {
            EntryKind::HardLink => normalize_member_path(&target),
            _ => String::from_utf8_lossy(&target).into_owned(),
        });

        Self {
            path: normalize_member_path(&raw_path),
            kind,
            size: entry.size(),
            link_target,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Normalizes a member path so it can be compared and joined safely.
/// `.` segments and empty segments are dropped, `..` pops without escaping the root.
pub fn normalize_member_path(raw: &[u8]) -> String {
    let raw = String::from_utf8_lossy(raw);
    let mut parts: Vec<&str> = Vec::new();

    for part in raw.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            part => parts.push(part),
        }
    }

    parts.join("/")
}

/// The image tarball on disk.
#[derive(Debug, Clone)]
pub struct OuterArchive {
    path: PathBuf,
    compression: Compression,
}

impl OuterArchive {
    /// Opens `path` and reads its first header, so unreadable files and files that are
    /// not tar archives fail here rather than on the first query.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let compression = Compression::from_path(&path);
        let archive = Self { path, compression };

        let mut tar = archive.reader()?;
        let mut entries = tar
            .entries()
            .with_context(|| format!("{} is not a valid tar archive", archive.path.display()))?;
        if let Some(first) = entries.next() {
            first.with_context(|| {
                format!("{} is not a valid tar archive", archive.path.display())
            })?;
        }
        drop(entries);

        Ok(archive)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    fn reader(&self) -> Result<tar::Archive<Box<dyn Read>>> {
        debug!(
            "Opening image archive {} ({:?})",
            self.path.display(),
            self.compression
        );

        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open image archive: {}", self.path.display()))?;
        let reader = BufReader::new(file);

        let reader: Box<dyn Read> = match self.compression {
            Compression::Plain => Box::new(reader),
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
        };

        Ok(tar::Archive::new(reader))
    }

    /// Streams the archive until `name` is found and hands its contents to `f`.
    pub fn with_member<T, F>(&self, name: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Read) -> Result<T>,
    {
        let wanted = normalize_member_path(name.as_bytes());
        let mut archive = self.reader()?;

        for entry in archive.entries().context("Failed to read image archive")? {
            let mut entry = entry.context("Failed to read image archive entry")?;
            let member = normalize_member_path(&entry.path_bytes());
            if member == wanted {
                trace!("Found member {}", member);
                return f(&mut entry);
            }
        }

        Err(ArchiveError::MemberNotFound { name: wanted }.into())
    }

    pub fn extract_member(&self, name: &str) -> Result<Vec<u8>> {
        self.with_member(name, |reader| {
            let mut bytes = Vec::new();
            reader
                .read_to_end(&mut bytes)
                .with_context(|| format!("Failed to read member {}", name))?;
            Ok(bytes)
        })
    }

    pub fn members_with_prefix(&self, prefix: &str) -> Result<Vec<FileEntry>> {
        let mut archive = self.reader()?;
        let mut members = Vec::new();

        for entry in archive.entries().context("Failed to read image archive")? {
            let entry = entry.context("Failed to read image archive entry")?;
            let member = FileEntry::from_entry(&entry);
            if member.path.starts_with(prefix) {
                members.push(member);
            }
        }

        debug!("{} members under prefix '{}'", members.len(), prefix);
        Ok(members)
    }

    /// Opens the member `name` as a nested tar archive and runs `f` over it.
    pub fn with_nested<T, F>(&self, name: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut NestedArchive<'_>) -> Result<T>,
    {
        self.with_member(name, |reader| {
            let mut nested = NestedArchive::new(reader)
                .with_context(|| format!("Failed to open nested archive {}", name))?;
            f(&mut nested)
        })
    }
}

/// A tar archive read from a byte stream, plain or gzip-compressed.
///
/// The stream is consumed once: each `NestedArchive` supports a single pass over its
/// entries.
pub struct NestedArchive<'a> {
    archive: tar::Archive<Box<dyn Read + 'a>>,
}

impl<'a> NestedArchive<'a> {
    pub fn new<R: Read + 'a>(reader: R) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        let compressed = reader
            .fill_buf()
            .context("Failed to read nested archive header")?
            .starts_with(&GZIP_MAGIC);

        let reader: Box<dyn Read + 'a> = if compressed {
            trace!("Nested archive is gzip-compressed");
            Box::new(GzDecoder::new(reader))
        } else {
            Box::new(reader)
        };

        Ok(Self {
            archive: tar::Archive::new(reader),
        })
    }

    pub fn entries(&mut self) -> Result<tar::Entries<'_, Box<dyn Read + 'a>>> {
        self.archive
            .entries()
            .context("Failed to read nested archive")
    }

    /// Every member in archive order. The root entry (`./`) is skipped.
    pub fn list(&mut self) -> Result<Vec<FileEntry>> {
        let mut members = Vec::new();
        for entry in self.entries()? {
            let entry = entry.context("Failed to read nested archive entry")?;
            let member = FileEntry::from_entry(&entry);
            if !member.path.is_empty() {
                members.push(member);
            }
        }
        Ok(members)
    }

    /// Bytes of the first member at `path`, or `None` when there is no such member.
    pub fn read_member(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        let wanted = normalize_member_path(path.as_bytes());
        for entry in self.entries()? {
            let mut entry = entry.context("Failed to read nested archive entry")?;
            if normalize_member_path(&entry.path_bytes()) != wanted {
                continue;
            }
            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .with_context(|| format!("Failed to read {}", wanted))?;
            return Ok(Some(bytes));
        }
        Ok(None)
    }
}
