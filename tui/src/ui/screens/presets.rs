use std::time::Instant;

use crossterm::event::KeyCode;
use panel::{DeleteOutcome, Preset, PresetOrigin};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::Modifier,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::state::deck::DeckState;
use crate::ui::theme::Theme;

use super::{Action, Screen};

pub struct PresetsState {
    cursor: usize,
}

impl PresetsState {
    /// Builds the screen and refreshes the catalog on the way in.
    pub fn enter(deck: &mut DeckState) -> Self {
        deck.refresh_catalog();
        Self { cursor: 0 }
    }
}

pub fn handle_key(deck: &mut DeckState, state: &mut PresetsState, key: KeyCode) -> Action {
    deck.notice = None;

    match key {
        KeyCode::Up | KeyCode::Char('k') => {
            if state.cursor > 0 {
                state.cursor -= 1;
            }
            Action::None
        }
        KeyCode::Down | KeyCode::Char('j') => {
            if state.cursor + 1 < deck.catalog.len() {
                state.cursor += 1;
            }
            Action::None
        }
        KeyCode::Enter => apply_selected(deck, state),
        KeyCode::Char('d') => delete_selected(deck, state),
        KeyCode::Char('r') => {
            deck.refresh_catalog();
            state.cursor = state.cursor.min(deck.catalog.len().saturating_sub(1));
            Action::None
        }
        KeyCode::Esc | KeyCode::Char('q') => {
            Action::Transition(Screen::Menu(super::menu::MenuState::new()))
        }
        _ => Action::None,
    }
}

fn selected<'a>(deck: &'a DeckState, state: &PresetsState) -> Option<&'a Preset> {
    deck.catalog.iter().nth(state.cursor)
}

fn apply_selected(deck: &mut DeckState, state: &PresetsState) -> Action {
    let Some(preset) = selected(deck, state) else {
        return Action::None;
    };
    let name = preset.name.clone();
    let config = preset.config.clone();

    deck.form.apply_preset(Instant::now(), &config);
    deck.notice = Some(format!("loaded {name} into the form"));

    Action::Transition(Screen::Launch(super::launch::LaunchState::new()))
}

fn delete_selected(deck: &mut DeckState, state: &mut PresetsState) -> Action {
    let Some(preset) = selected(deck, state) else {
        return Action::None;
    };
    let id = preset.id.clone();
    let name = preset.name.clone();

    match deck.delete_preset(&id) {
        Ok(DeleteOutcome::Deleted(PresetOrigin::LocalOnly)) => {
            deck.notice = Some(format!("{name} removed from this machine"));
        }
        Ok(DeleteOutcome::Deleted(_)) => {
            deck.notice = Some(format!("{name} removed from the server"));
        }
        Ok(DeleteOutcome::Missing) => {
            deck.notice = Some(format!("{name} was already gone"));
        }
        Err(e) => {
            deck.notice = Some(e.to_string());
            return Action::None;
        }
    }

    deck.refresh_catalog();
    state.cursor = state.cursor.min(deck.catalog.len().saturating_sub(1));

    Action::None
}

pub fn draw(f: &mut Frame, deck: &DeckState, state: &PresetsState) {
    let area = f.size();
    f.render_widget(Block::default().style(Theme::base()), area);

    let outer = centered_rect(74, 90, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // title
            Constraint::Length(1), // tier summary or degradation note
            Constraint::Length(1), // spacer
            Constraint::Min(4),    // list
            Constraint::Length(1), // hint
        ])
        .split(outer);

    f.render_widget(
        Paragraph::new(Span::styled(
            "Preset Shelf",
            Theme::title().add_modifier(Modifier::BOLD),
        )),
        chunks[0],
    );
    draw_summary(f, chunks[1], deck);
    draw_list(f, chunks[3], deck, state);
    draw_hint(f, chunks[4]);

    if let Some(notice) = &deck.notice {
        draw_notice_bar(f, area, notice);
    }
}

fn draw_summary(f: &mut Frame, area: Rect, deck: &DeckState) {
    let line = match &deck.catalog.server_error {
        Some(reason) => Line::from(Span::styled(
            format!("server unreachable, local tiers only ({reason})"),
            Theme::warn(),
        )),
        None => Line::from(Span::styled(
            format!("{} presets across all tiers", deck.catalog.len()),
            Theme::muted(),
        )),
    };

    f.render_widget(Paragraph::new(line), area);
}

fn draw_list(f: &mut Frame, area: Rect, deck: &DeckState, state: &PresetsState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Theme::border())
        .title(" Presets ")
        .title_style(Theme::title());

    let inner = block.inner(area);
    f.render_widget(block, area);

    let tiers: [(&str, &[Preset]); 4] = [
        ("shipped", &deck.catalog.builtin),
        ("server", &deck.catalog.server_builtin),
        ("server, yours", &deck.catalog.server_user),
        ("this machine", &deck.catalog.local),
    ];

    let mut lines: Vec<Line> = Vec::new();
    let mut cursor_line = 0usize;
    let mut index = 0usize;

    for (tier_name, tier) in tiers {
        if tier.is_empty() {
            continue;
        }
        lines.push(Line::from(Span::styled(
            format!("[{tier_name}]"),
            Theme::muted(),
        )));

        for preset in tier {
            let is_selected = index == state.cursor;
            if is_selected {
                cursor_line = lines.len();
            }
            lines.push(preset_line(preset, is_selected));
            index += 1;
        }
    }

    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "nothing here yet, save one from the launch form",
            Theme::muted(),
        )));
    }

    // Keep the selection inside the box.
    let visible = inner.height.saturating_sub(1) as usize;
    let scroll = cursor_line.saturating_sub(visible) as u16;

    f.render_widget(Paragraph::new(lines).scroll((scroll, 0)), inner);
}

fn preset_line(preset: &Preset, is_selected: bool) -> Line<'static> {
    let (marker, name_style) = if is_selected {
        ("▶ ", Theme::title())
    } else {
        ("  ", Theme::text())
    };

    let mut spans = vec![
        Span::styled(marker, name_style),
        Span::styled(preset.name.clone(), name_style),
        Span::styled(format!("  ({})", preset.model_type), Theme::dim()),
    ];
    if !preset.description.is_empty() {
        spans.push(Span::styled(
            format!("  {}", preset.description),
            Theme::muted(),
        ));
    }

    Line::from(spans)
}

fn draw_hint(f: &mut Frame, area: Rect) {
    let hint = Paragraph::new(Line::from(vec![
        Span::styled("↑↓", Theme::dim()),
        Span::styled("  navigate   ", Theme::muted()),
        Span::styled("enter", Theme::dim()),
        Span::styled("  load   ", Theme::muted()),
        Span::styled("d", Theme::dim()),
        Span::styled("  delete   ", Theme::muted()),
        Span::styled("r", Theme::dim()),
        Span::styled("  refresh   ", Theme::muted()),
        Span::styled("esc", Theme::dim()),
        Span::styled("  back", Theme::muted()),
    ]))
    .alignment(Alignment::Center);

    f.render_widget(hint, area);
}

fn draw_notice_bar(f: &mut Frame, area: Rect, msg: &str) {
    let bar = Rect {
        x: area.x + 1,
        y: area.y + area.height - 1,
        width: area.width.saturating_sub(2),
        height: 1,
    };
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(" » ", Theme::warn()),
            Span::styled(msg, Theme::warn()),
        ])),
        bar,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vert[1])[1]
}
