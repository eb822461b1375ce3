//! Build the ordered layer list of a saved image archive.
//!
//! [`Image`] is read once from the outer archive and never changes afterwards:
//! - `manifest.json` is a list; only its first element is used. It names the config
//!   member and the ordered layer tarball paths.
//! - Each [`Layer`] gets its `id` from the directory part of its tarball path.
//! - The config's `history` is walked in order and paired with layers. Entries marked
//!   `empty_layer` are skipped; surplus entries are dropped and layers left without an
//!   entry keep [`UNKNOWN_COMMAND`].
//! - When the config also satisfies the OCI image-config schema, an [`ImageSummary`]
//!   with architecture, OS and creation time is kept for display.
//!
//! Missing or malformed manifest/config members fail the whole load.

use crate::archive::OuterArchive;
use crate::notifier::Notifier;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const MANIFEST_NAME: &str = "manifest.json";
pub const UNKNOWN_COMMAND: &str = "Unknown command";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    /// Position in the manifest's layer list.
    pub index: usize,
    /// Directory inside the outer archive that holds this layer's tarball.
    pub id: String,
    /// Layer tarball path as written in the manifest.
    pub tarball: String,
    pub command: String,
    pub created: Option<DateTime<Utc>>,
}

impl Layer {
    /// The build command without the `/bin/sh -c` wrapper docker adds.
    pub fn short_command(&self) -> String {
        if self.command.contains("/bin/sh -c #(nop) ") {
            self.command
                .replace("/bin/sh -c #(nop) ", "")
                .trim_start()
                .to_string()
        } else if self.command.contains("/bin/sh -c ") {
            self.command
                .replace("/bin/sh -c ", "")
                .trim_start()
                .to_string()
        } else {
            self.command.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSummary {
    pub repo_tags: Vec<String>,
    pub architecture: Option<String>,
    pub os: Option<String>,
    pub created: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    #[serde(rename = "Config")]
    config: String,
    #[serde(rename = "Layers")]
    layers: Vec<String>,
    #[serde(default, rename = "RepoTags")]
    repo_tags: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDescriptor {
    #[serde(default)]
    history: Option<Vec<HistoryEntry>>,
}

/// One build step from the config's `history`. Only used while pairing.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct HistoryEntry {
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    created_by: Option<String>,
    #[serde(default)]
    empty_layer: Option<bool>,
}

impl HistoryEntry {
    fn is_empty_layer(&self) -> bool {
        self.empty_layer.unwrap_or(false)
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created
            .as_deref()
            .and_then(|created| DateTime::parse_from_rfc3339(created).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone)]
pub struct Image {
    source: PathBuf,
    summary: ImageSummary,
    layers: Vec<Layer>,
}

impl Image {
    pub fn new<P: Into<PathBuf>>(source: P, summary: ImageSummary, layers: Vec<Layer>) -> Self {
        Self {
            source: source.into(),
            summary,
            layers,
        }
    }

    /// Opens the archive at `path` and loads its layer list.
    pub fn load<P: AsRef<Path>>(path: P, notifier: &Notifier) -> Result<Self> {
        let archive = OuterArchive::open(path.as_ref())?;
        Self::from_archive(&archive, notifier)
    }

    pub fn from_archive(archive: &OuterArchive, notifier: &Notifier) -> Result<Self> {
        notifier.info(&format!("Reading {}...", archive.path().display()));

        let manifest_bytes = archive.extract_member(MANIFEST_NAME).context(
            "Invalid image archive: manifest.json not found. This does not appear to be a saved image",
        )?;
        let manifest: Vec<ManifestEntry> =
            serde_json::from_slice(&manifest_bytes).context("Failed to parse manifest.json")?;
        let manifest = manifest
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Empty manifest.json"))?;

        notifier.debug(&format!("Config member: {}", manifest.config));
        notifier.info("Reading image configuration...");

        let config_bytes = archive
            .extract_member(&manifest.config)
            .with_context(|| format!("Failed to read config file: {}", manifest.config))?;
        let config: ConfigDescriptor = serde_json::from_slice(&config_bytes)
            .with_context(|| format!("Failed to parse config file: {}", manifest.config))?;

        let mut summary = summarize_config(&config_bytes);
        summary.repo_tags = manifest.repo_tags.unwrap_or_default();

        let history = config.history.unwrap_or_default();
        let layers = build_layers(&manifest.layers, &history);

        notifier.info(&format!("Loaded {} layers", layers.len()));

        Ok(Self::new(archive.path(), summary, layers))
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn summary(&self) -> &ImageSummary {
        &self.summary
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// First repo tag, or the archive file name when the image is untagged.
    pub fn display_name(&self) -> String {
        match self.summary.repo_tags.first() {
            Some(tag) => tag.clone(),
            None => self
                .source
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.source.display().to_string()),
        }
    }
}

/// Directory part of a layer tarball path (`"abc/layer.tar"` → `"abc"`).
fn layer_id(tarball: &str) -> String {
    match tarball.rfind('/') {
        Some(pos) => tarball[..pos].to_string(),
        None => String::new(),
    }
}

fn summarize_config(config_bytes: &[u8]) -> ImageSummary {
    match serde_json::from_slice::<oci_spec::image::ImageConfiguration>(config_bytes) {
        Ok(config) => ImageSummary {
            repo_tags: Vec::new(),
            architecture: Some(config.architecture().to_string()),
            os: Some(config.os().to_string()),
            created: config.created().clone(),
        },
        Err(e) => {
            debug!("Config is not an OCI image configuration: {}", e);
            ImageSummary::default()
        }
    }
}

pub(crate) fn build_layers(tarballs: &[String], history: &[HistoryEntry]) -> Vec<Layer> {
    let mut layers: Vec<Layer> = tarballs
        .iter()
        .enumerate()
        .map(|(index, tarball)| Layer {
            index,
            id: layer_id(tarball),
            tarball: tarball.clone(),
            command: UNKNOWN_COMMAND.to_string(),
            created: None,
        })
        .collect();

    let mut cursor = 0;
    let mut dropped = 0;

    for entry in history.iter().filter(|entry| !entry.is_empty_layer()) {
        match layers.get_mut(cursor) {
            Some(layer) => {
                layer.command = entry
                    .created_by
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_COMMAND.to_string());
                layer.created = entry.created_at();
                cursor += 1;
            }
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        warn!(
            "{} history entries have no matching layer and were ignored",
            dropped
        );
    }
    if cursor < layers.len() {
        warn!(
            "{} layers have no history entry, command unknown",
            layers.len() - cursor
        );
    }

    layers
}
