//! Interactive navigation state machine.
//!
//! All interactive state lives in one [`NavState`]. [`dispatch`] applies exactly one
//! [`Key`] to it: a pending notice or prompt takes the key first, otherwise the handler
//! for the active [`View`] does. Handlers call into a [`FileIndex`] and turn any failure
//! into the status message; nothing here returns an error.
//!
//! View graph:
//! - `Layers` → `Files` (confirm), `Search` (`s`, all layers), `ConfirmQuit` (`q`)
//! - `Files` → deeper/shallower `Files`, `Layers` (back at the root), `Search` (`s`,
//!   scoped to the current directory), `ConfirmQuit` (`q`)
//! - `Search` → `Files` (confirm on a hit), `Layers`/`Files` (back or `q`)
//! - `ConfirmQuit` → exit (`q`/confirm) or the view it was entered from
//!
//! The current directory is a plain path string: descending sets it to the entry's
//! path, going back strips its last segment.

mod files;
mod layers;
mod prompt;
mod quit;
mod scroll;
mod search;

use crate::archive::{ArchiveError, FileEntry};
use crate::image::Image;
use crate::layer_files::{CrossLayerHits, FileIndex};
use std::path::Path;

pub use prompt::{Prompt, PromptKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Layers,
    Files,
    Search,
    ConfirmQuit,
}

/// Operator input, already decoded from the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Enter,
    Left,
    Esc,
    Backspace,
    Char(char),
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchResults {
    /// Hits within the selected layer.
    Layer(Vec<FileEntry>),
    AllLayers(CrossLayerHits),
}

impl SearchResults {
    pub fn is_cross_layer(&self) -> bool {
        matches!(self, SearchResults::AllLayers(_))
    }

    pub fn len(&self) -> usize {
        match self {
            SearchResults::Layer(hits) => hits.len(),
            SearchResults::AllLayers(hits) => hits.values().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(layer index, entry)` pairs in layer-then-archive order. Single-layer hits are
    /// attributed to `layer`.
    pub fn flatten(&self, layer: usize) -> Vec<(usize, &FileEntry)> {
        match self {
            SearchResults::Layer(hits) => hits.iter().map(|entry| (layer, entry)).collect(),
            SearchResults::AllLayers(hits) => hits
                .iter()
                .flat_map(|(index, entries)| entries.iter().map(move |entry| (*index, entry)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchState {
    pub query: String,
    pub results: SearchResults,
    /// Files selection and offset to restore when a single-layer search is left.
    return_to: (usize, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavState {
    pub view: View,
    pub selected_layer: usize,
    pub layer_offset: usize,
    pub selected_file: usize,
    pub file_offset: usize,
    pub current_path: String,
    /// Listing of `current_path` in the selected layer.
    pub files: Vec<FileEntry>,
    pub status: String,
    pub search: Option<SearchState>,
    pub previous_view: Option<View>,
    pub prompt: Option<Prompt>,
    /// Transient message; the next key only dismisses it.
    pub notice: Option<String>,
    /// Visible rows, set by the renderer before each frame.
    pub viewport: usize,
}

impl Default for NavState {
    fn default() -> Self {
        Self::new()
    }
}

impl NavState {
    pub fn new() -> Self {
        Self {
            view: View::Layers,
            selected_layer: 0,
            layer_offset: 0,
            selected_file: 0,
            file_offset: 0,
            current_path: String::new(),
            files: Vec::new(),
            status: String::new(),
            search: None,
            previous_view: None,
            prompt: None,
            notice: None,
            viewport: 1,
        }
    }

    /// Records the visible row count and scrolls so both selections stay visible.
    pub fn fit_viewport(&mut self, rows: usize) {
        self.viewport = rows.max(1);
        self.layer_offset = scroll::reveal(self.selected_layer, self.layer_offset, self.viewport);
        self.file_offset = scroll::reveal(self.selected_file, self.file_offset, self.viewport);
    }

    pub fn search_query(&self) -> &str {
        self.search.as_ref().map_or("", |search| search.query.as_str())
    }

    pub fn search_is_cross_layer(&self) -> bool {
        self.search
            .as_ref()
            .is_some_and(|search| search.results.is_cross_layer())
    }

    /// Search hits as displayed, see [`SearchResults::flatten`].
    pub fn search_rows(&self) -> Vec<(usize, &FileEntry)> {
        self.search
            .as_ref()
            .map(|search| search.results.flatten(self.selected_layer))
            .unwrap_or_default()
    }

    fn enter_quit(&mut self) {
        self.previous_view = Some(self.view);
        self.view = View::ConfirmQuit;
        self.status.clear();
    }

    fn open_search(&mut self, query: &str, results: SearchResults) {
        self.search = Some(SearchState {
            query: query.to_string(),
            results,
            return_to: (self.selected_file, self.file_offset),
        });
        self.view = View::Search;
        self.selected_file = 0;
        self.file_offset = 0;
        self.status = format!("Search results for '{}'", query);
    }
}

/// What a handler can reach besides the state.
pub struct Context<'a, F: FileIndex> {
    pub image: &'a Image,
    pub index: &'a F,
    /// Used when the extract prompt is submitted empty.
    pub output_dir: &'a Path,
}

/// Applies one key to `state`.
pub fn dispatch<F: FileIndex>(state: &mut NavState, ctx: &Context<'_, F>, key: Key) -> Flow {
    if state.notice.take().is_some() {
        return Flow::Continue;
    }
    if state.prompt.is_some() {
        prompt::handle(state, ctx, key);
        return Flow::Continue;
    }

    match state.view {
        View::Layers => layers::handle(state, ctx, key),
        View::Files => files::handle(state, ctx, key),
        View::Search => search::handle(state, ctx, key),
        View::ConfirmQuit => quit::handle(state, key),
    }
}

/// `path` without its last segment (`"usr/bin"` → `"usr"`, `"usr"` → `""`).
pub fn parent_path(path: &str) -> String {
    let path = path.trim_matches('/');
    match path.rfind('/') {
        Some(pos) => path[..pos].to_string(),
        None => String::new(),
    }
}

/// Status text for a failed file query.
fn describe(err: &anyhow::Error) -> String {
    match err.downcast_ref::<ArchiveError>() {
        Some(archive_err) => archive_err.to_string(),
        None => format!("{:#}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::EntryKind;

    fn entry(path: &str) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            kind: EntryKind::File,
            size: 0,
            link_target: None,
        }
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("usr/bin"), "usr");
        assert_eq!(parent_path("usr"), "");
        assert_eq!(parent_path(""), "");
        assert_eq!(parent_path("usr/bin/"), "usr");
    }

    #[test]
    fn test_flatten_cross_layer_results() {
        let mut hits = CrossLayerHits::new();
        hits.insert(2, vec![entry("b"), entry("a")]);
        hits.insert(0, vec![entry("z")]);
        let results = SearchResults::AllLayers(hits);

        let rows: Vec<(usize, &str)> = results
            .flatten(7)
            .into_iter()
            .map(|(layer, entry)| (layer, entry.path.as_str()))
            .collect();
        assert_eq!(rows, vec![(0, "z"), (2, "b"), (2, "a")]);
        assert_eq!(results.len(), 3);
        assert!(results.is_cross_layer());
    }

    #[test]
    fn test_flatten_single_layer_results() {
        let results = SearchResults::Layer(vec![entry("x")]);
        let rows = results.flatten(4);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, 4);
        assert!(!results.is_cross_layer());
    }

    #[test]
    fn test_fit_viewport_keeps_selection_visible() {
        let mut state = NavState::new();
        state.selected_layer = 10;
        state.selected_file = 3;
        state.fit_viewport(4);
        assert_eq!(state.layer_offset, 7);
        assert_eq!(state.file_offset, 0);

        state.fit_viewport(0);
        assert_eq!(state.viewport, 1);
        assert_eq!(state.layer_offset, 10);
        assert_eq!(state.file_offset, 3);
    }

    #[test]
    fn test_describe_prefers_typed_errors() {
        let err = anyhow::Error::from(ArchiveError::NoLayerArchive { layer: 3 })
            .context("Failed to extract");
        assert_eq!(
            describe(&err),
            "Could not find a filesystem archive for layer 3"
        );

        let err = anyhow::anyhow!("disk full").context("Failed to write file");
        assert_eq!(describe(&err), "Failed to write file: disk full");
    }
}
