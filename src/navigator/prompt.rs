use super::{files, layers, Context, Key, NavState, View};
use crate::layer_files::FileIndex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptKind {
    Search,
    /// Output directory for extracting `path` from the selected layer.
    ExtractTo { path: String },
}

/// A line of text being typed by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub kind: PromptKind,
    pub input: String,
}

impl Prompt {
    pub fn search() -> Self {
        Self {
            kind: PromptKind::Search,
            input: String::new(),
        }
    }

    pub fn extract_to(path: &str) -> Self {
        Self {
            kind: PromptKind::ExtractTo {
                path: path.to_string(),
            },
            input: String::new(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self.kind {
            PromptKind::Search => "Enter search query: ",
            PromptKind::ExtractTo { .. } => "Enter output directory (empty for default): ",
        }
    }
}

pub(super) fn handle<F: FileIndex>(state: &mut NavState, ctx: &Context<'_, F>, key: Key) {
    let Some(prompt) = state.prompt.as_mut() else {
        return;
    };

    match key {
        Key::Char(c) => prompt.input.push(c),
        Key::Backspace => {
            prompt.input.pop();
        }
        Key::Esc => state.prompt = None,
        Key::Enter => {
            let Some(prompt) = state.prompt.take() else {
                return;
            };
            let input = prompt.input.trim();
            match (&prompt.kind, state.view) {
                (PromptKind::Search, View::Layers) => layers::run_search(state, ctx, input),
                (PromptKind::Search, View::Files) => files::run_search(state, ctx, input),
                (PromptKind::ExtractTo { path }, View::Files) => {
                    files::run_extract(state, ctx, path, input)
                }
                _ => {}
            }
        }
        _ => {}
    }
}
