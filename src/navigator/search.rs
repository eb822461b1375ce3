use super::{describe, parent_path, scroll, Context, Flow, Key, NavState, View};
use crate::layer_files::FileIndex;

pub(super) fn handle<F: FileIndex>(state: &mut NavState, ctx: &Context<'_, F>, key: Key) -> Flow {
    match key {
        Key::Up | Key::Char('k') => scroll::up(
            &mut state.selected_file,
            &mut state.file_offset,
            state.viewport,
        ),
        Key::Down | Key::Char('j') => {
            let total = state.search.as_ref().map_or(0, |search| search.results.len());
            scroll::down(
                &mut state.selected_file,
                &mut state.file_offset,
                total,
                state.viewport,
            );
        }
        Key::Enter => open_hit(state, ctx),
        Key::Left | Key::Char('b') | Key::Char('q') => leave(state),
        _ => {}
    }
    Flow::Continue
}

/// Drops the results and returns to the view the search was started from.
fn leave(state: &mut NavState) {
    let search = state.search.take();
    state.status.clear();

    match search {
        Some(search) if !search.results.is_cross_layer() => {
            (state.selected_file, state.file_offset) = search.return_to;
            state.view = View::Files;
        }
        _ => {
            state.selected_file = 0;
            state.file_offset = 0;
            state.view = View::Layers;
        }
    }
}

/// Shows the directory holding the selected hit, with the hit selected and centered.
fn open_hit<F: FileIndex>(state: &mut NavState, ctx: &Context<'_, F>) {
    let Some((layer_index, target)) = state
        .search_rows()
        .get(state.selected_file)
        .map(|(layer, entry)| (*layer, entry.path.clone()))
    else {
        return;
    };
    let Some(layer) = ctx.image.layer(layer_index) else {
        return;
    };

    let directory = parent_path(&target);
    match ctx.index.list_children(layer, &directory) {
        Ok(files) => {
            // The listing may have changed since the search; fall back to the top
            let selected = files
                .iter()
                .position(|entry| entry.path == target)
                .unwrap_or(0);

            if state.search_is_cross_layer() {
                state.selected_layer = layer_index;
                state.layer_offset =
                    scroll::reveal(layer_index, state.layer_offset, state.viewport);
            }
            state.files = files;
            state.current_path = directory;
            state.selected_file = selected;
            state.file_offset = scroll::centered(selected, state.viewport);
            state.search = None;
            state.status.clear();
            state.view = View::Files;
        }
        Err(e) => state.status = describe(&e),
    }
}
