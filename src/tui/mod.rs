//! Terminal front end: owns the terminal, feeds decoded keys into the navigator and
//! draws every frame from the resulting [`NavState`].

mod keys;
mod render;

use crate::image::Image;
use crate::layer_files::FileIndex;
use crate::navigator::{self, Context as NavContext, Flow, NavState};
use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use log::debug;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io::{self, IsTerminal};
use std::path::Path;

pub use keys::map_key;

/// Rows taken by the title, status and hint lines.
const CHROME_ROWS: u16 = 3;

/// Runs an interactive session over `image` until the operator quits.
pub fn run<F: FileIndex>(image: &Image, index: &F, output_dir: &Path) -> Result<()> {
    if !io::stdin().is_terminal() || !io::stdout().is_terminal() {
        anyhow::bail!("trawler requires an interactive terminal (TTY)");
    }

    let mut stdout = io::stdout();
    enable_raw_mode().context("enable raw mode")?;
    execute!(stdout, EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let ctx = NavContext {
        image,
        index,
        output_dir,
    };
    let res = run_loop(&mut terminal, &ctx);

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    res
}

fn run_loop<F: FileIndex>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ctx: &NavContext<'_, F>,
) -> Result<()> {
    let mut state = NavState::new();
    loop {
        let size = terminal.size().context("read terminal size")?;
        state.fit_viewport(size.height.saturating_sub(CHROME_ROWS) as usize);

        terminal
            .draw(|f| render::draw(f, &state, ctx.image))
            .context("draw")?;

        let key = match event::read().context("read event")? {
            Event::Key(k) if k.kind == KeyEventKind::Press => k,
            _ => continue,
        };
        if keys::is_interrupt(&key) {
            debug!("Interrupted");
            return Ok(());
        }

        if navigator::dispatch(&mut state, ctx, map_key(&key)) == Flow::Exit {
            return Ok(());
        }
    }
}
