use super::{
    describe, parent_path, scroll, Context, Flow, Key, NavState, Prompt, SearchResults, View,
};
use crate::layer_files::FileIndex;
use std::path::PathBuf;

pub(super) fn handle<F: FileIndex>(state: &mut NavState, ctx: &Context<'_, F>, key: Key) -> Flow {
    match key {
        Key::Up | Key::Char('k') => scroll::up(
            &mut state.selected_file,
            &mut state.file_offset,
            state.viewport,
        ),
        Key::Down | Key::Char('j') => scroll::down(
            &mut state.selected_file,
            &mut state.file_offset,
            state.files.len(),
            state.viewport,
        ),
        Key::Enter => open_entry(state, ctx),
        Key::Char('e') => {
            if let Some(entry) = state.files.get(state.selected_file) {
                state.prompt = Some(Prompt::extract_to(&entry.path));
            }
        }
        Key::Char('s') => state.prompt = Some(Prompt::search()),
        Key::Left | Key::Char('b') => go_back(state, ctx),
        Key::Char('q') => state.enter_quit(),
        _ => {}
    }
    Flow::Continue
}

fn open_entry<F: FileIndex>(state: &mut NavState, ctx: &Context<'_, F>) {
    let Some(entry) = state.files.get(state.selected_file) else {
        return;
    };

    if entry.is_dir() {
        let path = entry.path.clone();
        relist(state, ctx, path);
    } else {
        state.status = format!("{} is a file, press 'e' to extract.", entry.path);
    }
}

fn go_back<F: FileIndex>(state: &mut NavState, ctx: &Context<'_, F>) {
    if state.current_path.is_empty() {
        state.view = View::Layers;
        state.status.clear();
    } else {
        let parent = parent_path(&state.current_path);
        relist(state, ctx, parent);
    }
}

/// Lists `path` in the selected layer and makes it the current directory.
fn relist<F: FileIndex>(state: &mut NavState, ctx: &Context<'_, F>, path: String) {
    let Some(layer) = ctx.image.layer(state.selected_layer) else {
        return;
    };

    match ctx.index.list_children(layer, &path) {
        Ok(files) => {
            state.files = files;
            state.current_path = path;
            state.selected_file = 0;
            state.file_offset = 0;
            state.status.clear();
        }
        Err(e) => state.status = describe(&e),
    }
}

pub(super) fn run_search<F: FileIndex>(state: &mut NavState, ctx: &Context<'_, F>, query: &str) {
    let Some(layer) = ctx.image.layer(state.selected_layer) else {
        return;
    };

    match ctx.index.search(layer, query, &state.current_path) {
        Ok(hits) if hits.is_empty() => {
            state.status = format!("No results found for '{}'", query);
        }
        Ok(hits) => state.open_search(query, SearchResults::Layer(hits)),
        Err(e) => state.status = describe(&e),
    }
}

pub(super) fn run_extract<F: FileIndex>(
    state: &mut NavState,
    ctx: &Context<'_, F>,
    path: &str,
    output_dir: &str,
) {
    let Some(layer) = ctx.image.layer(state.selected_layer) else {
        return;
    };

    let output_dir = if output_dir.is_empty() {
        ctx.output_dir.to_path_buf()
    } else {
        PathBuf::from(output_dir)
    };

    state.status = match ctx.index.extract(layer, path, &output_dir) {
        Ok(extraction) => extraction.to_string(),
        Err(e) => describe(&e),
    };
}
