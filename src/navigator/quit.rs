use super::{Flow, Key, NavState, View};

pub(super) fn handle(state: &mut NavState, key: Key) -> Flow {
    match key {
        Key::Char('q') | Key::Enter => Flow::Exit,
        _ => {
            state.view = state.previous_view.take().unwrap_or(View::Layers);
            Flow::Continue
        }
    }
}
