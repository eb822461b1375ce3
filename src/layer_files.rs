//! List, search and extract the files of one layer.
//!
//! Every layer's filesystem is a tar archive nested inside the outer image archive.
//! [`LayerFiles`] locates it for a [`Layer`] and answers queries over it without writing
//! the layer to disk. Nothing is cached: each call reopens the image archive.
//!
//! Resolution: the member named exactly like the layer's manifest path wins; otherwise
//! the first regular member under `<id>/` whose name contains [`NESTED_ARCHIVE_NAME`].
//! A layer without such a member has no files. Listing and search return nothing for it
//! and extraction fails with [`ArchiveError::NoLayerArchive`].

use crate::archive::{
    normalize_member_path, ArchiveError, EntryKind, FileEntry, NestedArchive, OuterArchive,
};
use crate::image::Layer;
use anyhow::{Context, Result};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

pub const NESTED_ARCHIVE_NAME: &str = "layer.tar";

/// Search hits keyed by layer index, only for layers with at least one hit.
pub type CrossLayerHits = BTreeMap<usize, Vec<FileEntry>>;

/// What an extraction wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    File {
        path: String,
        destination: PathBuf,
    },
    Directory {
        path: String,
        output_dir: PathBuf,
        entries: usize,
    },
}

impl fmt::Display for Extraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extraction::File { path, destination } => {
                write!(f, "Extracted {} to {}", path, destination.display())
            }
            Extraction::Directory {
                path, output_dir, ..
            } => write!(f, "Extracted directory {} to {}", path, output_dir.display()),
        }
    }
}

/// File queries the navigator needs. Errors are reported to the operator, never fatal.
pub trait FileIndex {
    /// Direct children of `path` (`""` is the layer root), directories first, then by
    /// case-insensitive path.
    fn list_children(&self, layer: &Layer, path: &str) -> Result<Vec<FileEntry>>;

    /// Case-insensitive substring matches on the full path of every entry under `scope`,
    /// in archive order.
    fn search(&self, layer: &Layer, query: &str, scope: &str) -> Result<Vec<FileEntry>>;

    /// Extracts a file to `output_dir/<basename>` or a directory subtree below
    /// `output_dir`, overwriting existing files.
    fn extract(&self, layer: &Layer, entry_path: &str, output_dir: &Path) -> Result<Extraction>;

    /// [`FileIndex::search`] over every layer from the root. Layers that fail to read are
    /// skipped with a warning.
    fn search_all_layers(&self, layers: &[Layer], query: &str) -> Result<CrossLayerHits> {
        let mut hits = CrossLayerHits::new();
        for layer in layers {
            match self.search(layer, query, "") {
                Ok(found) if !found.is_empty() => {
                    hits.insert(layer.index, found);
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping layer {} in search: {:#}", layer.index, e),
            }
        }
        Ok(hits)
    }
}

pub struct LayerFiles {
    archive: OuterArchive,
}

enum Unpacked {
    Done(Extraction),
    /// A link was requested; its target's bytes have to be copied in a second pass.
    Link { target: String },
    Missing,
}

impl LayerFiles {
    pub fn new(archive: OuterArchive) -> Self {
        Self { archive }
    }

    pub fn archive(&self) -> &OuterArchive {
        &self.archive
    }

    /// Name of the outer member holding `layer`'s filesystem, if any.
    pub fn nested_member(&self, layer: &Layer) -> Result<Option<String>> {
        let prefix = if layer.id.is_empty() {
            String::new()
        } else {
            format!("{}/", layer.id)
        };
        let tarball = normalize_member_path(layer.tarball.as_bytes());

        let candidates: Vec<FileEntry> = self
            .archive
            .members_with_prefix(&prefix)?
            .into_iter()
            .filter(|member| member.kind == EntryKind::File)
            .collect();

        let found = candidates
            .iter()
            .find(|member| member.path == tarball)
            .or_else(|| {
                candidates
                    .iter()
                    .find(|member| member.path.contains(NESTED_ARCHIVE_NAME))
            })
            .map(|member| member.path.clone());

        if found.is_none() {
            debug!("Layer {} ({}) has no filesystem archive", layer.index, layer.id);
        }
        Ok(found)
    }

    /// Runs `f` over the layer's nested archive; `None` when the layer has none.
    fn with_layer<T, F>(&self, layer: &Layer, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut NestedArchive<'_>) -> Result<T>,
    {
        match self.nested_member(layer)? {
            Some(member) => {
                debug!("Opening layer {} from {}", layer.index, member);
                self.archive.with_nested(&member, f).map(Some)
            }
            None => Ok(None),
        }
    }

    fn entries(&self, layer: &Layer) -> Result<Vec<FileEntry>> {
        Ok(self
            .with_layer(layer, |nested| nested.list())?
            .unwrap_or_default())
    }
}

impl FileIndex for LayerFiles {
    fn list_children(&self, layer: &Layer, path: &str) -> Result<Vec<FileEntry>> {
        let scope = normalize_member_path(path.as_bytes());
        let entries = self
            .entries(layer)
            .with_context(|| format!("Failed to list layer {}", layer.index))?;
        Ok(direct_children(entries, &scope))
    }

    fn search(&self, layer: &Layer, query: &str, scope: &str) -> Result<Vec<FileEntry>> {
        let scope = normalize_member_path(scope.as_bytes());
        let entries = self
            .entries(layer)
            .with_context(|| format!("Failed to search layer {}", layer.index))?;
        Ok(matching(entries, query, &scope))
    }

    fn extract(&self, layer: &Layer, entry_path: &str, output_dir: &Path) -> Result<Extraction> {
        let wanted = normalize_member_path(entry_path.as_bytes());

        let outcome = self
            .with_layer(layer, |nested| unpack(nested, &wanted, output_dir))?
            .ok_or(ArchiveError::NoLayerArchive { layer: layer.index })?;

        match outcome {
            Unpacked::Done(extraction) => Ok(extraction),
            Unpacked::Missing => Err(ArchiveError::EntryNotFound {
                path: wanted,
                layer: layer.index,
            }
            .into()),
            Unpacked::Link { target } => {
                let destination = output_dir.join(basename(&wanted));
                debug!("{} is a link, copying {}", wanted, target);
                let copied = self
                    .with_layer(layer, |nested| copy_member(nested, &target, &destination))?
                    .unwrap_or(false);
                if !copied {
                    return Err(ArchiveError::EntryNotFound {
                        path: target,
                        layer: layer.index,
                    }
                    .into());
                }
                Ok(Extraction::File {
                    path: wanted,
                    destination,
                })
            }
        }
    }
}

/// Remainder of `path` below `scope`; `None` when `path` is not strictly inside it.
fn below<'p>(path: &'p str, scope: &str) -> Option<&'p str> {
    let rest = if scope.is_empty() {
        path
    } else {
        path.strip_prefix(scope)?.strip_prefix('/')?
    };
    (!rest.is_empty()).then_some(rest)
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub(crate) fn direct_children(entries: Vec<FileEntry>, scope: &str) -> Vec<FileEntry> {
    let mut children: Vec<FileEntry> = entries
        .into_iter()
        .filter(|entry| below(&entry.path, scope).is_some_and(|rest| !rest.contains('/')))
        .collect();
    children.sort_by_cached_key(|entry| (!entry.is_dir(), entry.path.to_lowercase()));
    children
}

pub(crate) fn matching(entries: Vec<FileEntry>, query: &str, scope: &str) -> Vec<FileEntry> {
    let query = query.to_lowercase();
    entries
        .into_iter()
        .filter(|entry| below(&entry.path, scope).is_some())
        .filter(|entry| entry.path.to_lowercase().contains(&query))
        .collect()
}

/// Resolves a link entry to the archive path of the member it points at.
fn link_target(entry: &FileEntry) -> Option<String> {
    let target = entry.link_target.as_deref()?;
    match entry.kind {
        EntryKind::HardLink => Some(target.to_string()),
        EntryKind::Symlink if target.starts_with('/') => {
            Some(normalize_member_path(target.as_bytes()))
        }
        EntryKind::Symlink => {
            let parent = match entry.path.rfind('/') {
                Some(pos) => &entry.path[..pos],
                None => "",
            };
            Some(normalize_member_path(format!("{}/{}", parent, target).as_bytes()))
        }
        _ => None,
    }
}

fn write_file(reader: &mut dyn Read, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let mut out = File::create(destination)
        .with_context(|| format!("Failed to create file: {}", destination.display()))?;
    io::copy(reader, &mut out)
        .with_context(|| format!("Failed to write file: {}", destination.display()))?;
    Ok(())
}

/// Single pass: writes the file at `wanted`, or unpacks every entry at or below it.
fn unpack(nested: &mut NestedArchive<'_>, wanted: &str, output_dir: &Path) -> Result<Unpacked> {
    let mut unpacked = 0;
    let mut is_directory = false;

    for entry in nested.entries()? {
        let mut entry = entry.context("Failed to read nested archive entry")?;
        let member = FileEntry::from_entry(&entry);

        if member.path == wanted && !member.is_dir() && !is_directory {
            if matches!(member.kind, EntryKind::Symlink | EntryKind::HardLink) {
                return Ok(match link_target(&member) {
                    Some(target) => Unpacked::Link { target },
                    None => Unpacked::Missing,
                });
            }
            let destination = output_dir.join(member.name());
            write_file(&mut entry, &destination)?;
            return Ok(Unpacked::Done(Extraction::File {
                path: member.path,
                destination,
            }));
        }

        if member.path != wanted && below(&member.path, wanted).is_none() {
            continue;
        }

        if !is_directory {
            fs::create_dir_all(output_dir).with_context(|| {
                format!("Failed to create directory: {}", output_dir.display())
            })?;
            is_directory = true;
        }

        match entry.unpack_in(output_dir) {
            Ok(_) => unpacked += 1,
            Err(e) if matches!(member.kind, EntryKind::Symlink | EntryKind::HardLink) => {
                warn!("Skipping link {}: {}", member.path, e);
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to extract {}", member.path));
            }
        }

        // Keep directories writable so their children can be unpacked
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if member.is_dir() {
                let dest = output_dir.join(&member.path);
                if let Ok(metadata) = fs::metadata(&dest) {
                    let mode = metadata.permissions().mode() | 0o700;
                    let _ = fs::set_permissions(&dest, fs::Permissions::from_mode(mode));
                }
            }
        }
    }

    if !is_directory {
        return Ok(Unpacked::Missing);
    }

    Ok(Unpacked::Done(Extraction::Directory {
        path: wanted.to_string(),
        output_dir: output_dir.to_path_buf(),
        entries: unpacked,
    }))
}

fn copy_member(nested: &mut NestedArchive<'_>, target: &str, destination: &Path) -> Result<bool> {
    for entry in nested.entries()? {
        let mut entry = entry.context("Failed to read nested archive entry")?;
        let member = FileEntry::from_entry(&entry);
        if member.path == target && member.kind == EntryKind::File {
            write_file(&mut entry, destination)?;
            return Ok(true);
        }
    }
    Ok(false)
}
