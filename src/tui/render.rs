use crate::archive::{EntryKind, FileEntry};
use crate::image::Image;
use crate::navigator::{NavState, View};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

pub(super) fn draw(frame: &mut Frame, state: &NavState, image: &Image) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(frame.area());

    // The quit confirmation is drawn over the view it was entered from
    let view = match state.view {
        View::ConfirmQuit => state.previous_view.unwrap_or(View::Layers),
        view => view,
    };

    let (title, rows) = match view {
        View::Files => files_view(state, image),
        View::Search => search_view(state),
        _ => layers_view(state, image),
    };
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            title,
            Style::default().add_modifier(Modifier::BOLD),
        ))),
        chunks[0],
    );
    frame.render_widget(Paragraph::new(rows), chunks[1]);

    draw_status(frame, state, chunks[2]);
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            hints(state),
            Style::default().fg(Color::Gray),
        ))),
        chunks[3],
    );

    if state.view == View::ConfirmQuit {
        draw_popup(frame, "Quit", "Press 'q' or Enter to quit, any other key to stay.");
    } else if let Some(notice) = &state.notice {
        draw_popup(frame, "Notice", notice);
    }
}

fn layers_view<'a>(state: &NavState, image: &'a Image) -> (String, Vec<Line<'a>>) {
    let summary = image.summary();
    let mut title = format!("{} - {} layers", image.display_name(), image.len());
    if let (Some(os), Some(arch)) = (&summary.os, &summary.architecture) {
        title.push_str(&format!(" ({}/{})", os, arch));
    }

    let rows = visible(image.layers(), state.layer_offset, state.viewport)
        .map(|(i, layer)| {
            let created = layer
                .created
                .map(|created| format!("  {}", created.format("%Y-%m-%d %H:%M")))
                .unwrap_or_default();
            Line::from(vec![
                Span::styled(
                    format!("Layer {:>3}  ", layer.index),
                    Style::default().fg(Color::Cyan),
                ),
                Span::raw(layer.short_command()),
                Span::styled(created, Style::default().fg(Color::DarkGray)),
            ])
            .style(selection(i == state.selected_layer))
        })
        .collect();
    (title, rows)
}

fn files_view<'a>(state: &'a NavState, image: &Image) -> (String, Vec<Line<'a>>) {
    let layer = image
        .layer(state.selected_layer)
        .map(|layer| format!("Layer {} ({})", layer.index, layer.id))
        .unwrap_or_default();
    let title = format!("{}: /{}", layer, state.current_path);

    let rows = visible(&state.files, state.file_offset, state.viewport)
        .map(|(i, entry)| {
            entry_line(entry, entry.name()).style(selection(i == state.selected_file))
        })
        .collect();
    (title, rows)
}

fn search_view(state: &NavState) -> (String, Vec<Line<'_>>) {
    let hits = state.search_rows();
    let title = format!(
        "Search results for '{}' ({} matches{})",
        state.search_query(),
        hits.len(),
        if state.search_is_cross_layer() {
            ", all layers"
        } else {
            ""
        }
    );

    let cross_layer = state.search_is_cross_layer();
    let rows = visible(&hits, state.file_offset, state.viewport)
        .map(|(i, &(layer, entry))| {
            let mut line = entry_line(entry, &entry.path);
            if cross_layer {
                line.spans.insert(
                    0,
                    Span::styled(
                        format!("[Layer {}] ", layer),
                        Style::default().fg(Color::Cyan),
                    ),
                );
            }
            line.style(selection(i == state.selected_file))
        })
        .collect();
    (title, rows)
}

fn entry_line<'a>(entry: &'a FileEntry, label: &'a str) -> Line<'a> {
    match entry.kind {
        EntryKind::Directory => Line::from(Span::styled(
            format!("{}/", label),
            Style::default().fg(Color::Blue),
        )),
        EntryKind::Symlink | EntryKind::HardLink => {
            let target = entry.link_target.as_deref().unwrap_or("?");
            Line::from(vec![
                Span::styled(label, Style::default().fg(Color::Green)),
                Span::styled(
                    format!(" -> {}", target),
                    Style::default().fg(Color::DarkGray),
                ),
            ])
        }
        _ => Line::from(vec![
            Span::styled(label, Style::default().fg(Color::Green)),
            Span::styled(
                format!("  {}", human_size(entry.size)),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
    }
}

fn draw_status(frame: &mut Frame, state: &NavState, area: Rect) {
    match &state.prompt {
        Some(prompt) => {
            let line = Line::from(vec![
                Span::styled(prompt.label(), Style::default().fg(Color::Yellow)),
                Span::raw(prompt.input.as_str()),
            ]);
            frame.render_widget(Paragraph::new(line), area);
            let x = (prompt.label().len() + prompt.input.chars().count()) as u16;
            frame.set_cursor_position((area.x + x.min(area.width.saturating_sub(1)), area.y));
        }
        None => frame.render_widget(
            Paragraph::new(Span::styled(
                state.status.as_str(),
                Style::default().fg(Color::Yellow),
            )),
            area,
        ),
    }
}

fn hints(state: &NavState) -> &'static str {
    if state.prompt.is_some() {
        return "Enter: submit  Esc: cancel";
    }
    match state.view {
        View::Layers => "↑/↓: move  Enter: open layer  s: search all layers  q: quit",
        View::Files => "↑/↓: move  Enter: open  ←/b: back  e: extract  s: search here  q: quit",
        View::Search => "↑/↓: move  Enter: go to file  ←/b/q: back",
        View::ConfirmQuit => "q/Enter: quit  any other key: stay",
    }
}

fn draw_popup(frame: &mut Frame, title: &str, message: &str) {
    let area = frame.area();
    let w = area.width.saturating_sub(6).clamp(20, 60);
    let h = 5.min(area.height);
    let box_area = Rect {
        x: area.x + area.width.saturating_sub(w) / 2,
        y: area.y + area.height.saturating_sub(h) / 2,
        width: w.min(area.width),
        height: h,
    };

    frame.render_widget(Clear, box_area);
    frame.render_widget(
        Paragraph::new(message)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title(title.to_string())),
        box_area,
    );
}

/// Rows of `items` inside the viewport, with their absolute index.
fn visible<T>(items: &[T], offset: usize, viewport: usize) -> impl Iterator<Item = (usize, &T)> {
    items.iter().enumerate().skip(offset).take(viewport)
}

fn selection(selected: bool) -> Style {
    if selected {
        Style::default().fg(Color::Black).bg(Color::White)
    } else {
        Style::default()
    }
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(1023), "1023 B");
        assert_eq!(human_size(1536), "1.5 KiB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MiB");
    }

    #[test]
    fn test_visible_window() {
        let items = [10, 11, 12, 13, 14];
        let rows: Vec<(usize, &i32)> = visible(&items, 1, 3).collect();
        assert_eq!(rows, vec![(1, &11), (2, &12), (3, &13)]);
    }
}
