use super::{describe, scroll, Context, Flow, Key, NavState, Prompt, SearchResults, View};
use crate::layer_files::FileIndex;

pub(super) fn handle<F: FileIndex>(state: &mut NavState, ctx: &Context<'_, F>, key: Key) -> Flow {
    match key {
        Key::Up | Key::Char('k') => {
            scroll::up(
                &mut state.selected_layer,
                &mut state.layer_offset,
                state.viewport,
            );
            state.status.clear();
        }
        Key::Down | Key::Char('j') => {
            scroll::down(
                &mut state.selected_layer,
                &mut state.layer_offset,
                ctx.image.len(),
                state.viewport,
            );
            state.status.clear();
        }
        Key::Enter => open_layer(state, ctx),
        Key::Char('s') => state.prompt = Some(Prompt::search()),
        Key::Char('q') => state.enter_quit(),
        _ => {}
    }
    Flow::Continue
}

fn open_layer<F: FileIndex>(state: &mut NavState, ctx: &Context<'_, F>) {
    let Some(layer) = ctx.image.layer(state.selected_layer) else {
        state.status = "Image has no layers.".to_string();
        return;
    };

    match ctx.index.list_children(layer, "") {
        Ok(files) if files.is_empty() => {
            state.status.clear();
            state.notice = Some(format!("No files found in Layer {}.", layer.index));
        }
        Ok(files) => {
            state.files = files;
            state.current_path.clear();
            state.selected_file = 0;
            state.file_offset = 0;
            state.status.clear();
            state.view = View::Files;
        }
        Err(e) => state.status = describe(&e),
    }
}

pub(super) fn run_search<F: FileIndex>(state: &mut NavState, ctx: &Context<'_, F>, query: &str) {
    match ctx.index.search_all_layers(ctx.image.layers(), query) {
        Ok(hits) if hits.is_empty() => {
            state.status = format!("No results found for '{}'", query);
        }
        Ok(hits) => state.open_search(query, SearchResults::AllLayers(hits)),
        Err(e) => state.status = describe(&e),
    }
}
