use crossterm::event::KeyCode;
use ratatui::{
    layout::{Alignment, Rect},
    text::{Line, Span},
    widgets::{Block, Paragraph},
    Frame,
};

use crate::state::deck::DeckState;
use crate::ui::layout;
use crate::ui::theme::Theme;

use super::{Action, Screen};

pub struct MonitorState {
    show_logs: bool,
}

impl MonitorState {
    pub fn new() -> Self {
        Self { show_logs: true }
    }
}

pub fn handle_key(deck: &mut DeckState, state: &mut MonitorState, key: KeyCode) -> Action {
    deck.notice = None;

    match key {
        KeyCode::Char('t') => {
            state.show_logs = !state.show_logs;
            Action::None
        }
        KeyCode::Char('o') => open_web_dashboard(deck),
        KeyCode::Char('f') => Action::Transition(Screen::Launch(super::launch::LaunchState::new())),
        KeyCode::Esc | KeyCode::Char('q') => {
            Action::Transition(Screen::Menu(super::menu::MenuState::new()))
        }
        _ => Action::None,
    }
}

/// Hands the full dashboard off to the browser. The deck stays up, the
/// two are fine side by side.
fn open_web_dashboard(deck: &mut DeckState) -> Action {
    let url = format!("{}/dashboard", deck.api_base.trim_end_matches('/'));
    if let Err(e) = open::that(&url) {
        deck.notice = Some(format!("could not open {url}: {e}"));
    }

    Action::None
}

pub fn draw(f: &mut Frame, deck: &DeckState, state: &MonitorState) {
    let area = f.size();
    f.render_widget(Block::default().style(Theme::base()), area);

    let view = deck.panel_view();

    if view.job_id.is_none() {
        draw_empty(f, area);
        return;
    }

    let (main, hint) = layout::with_hint_bar(area);
    crate::ui::draw::dashboard(f, main, &view, state.show_logs);
    draw_hint(f, hint);

    if let Some(notice) = deck.notice.as_deref().or(view.notice.as_deref()) {
        draw_notice_bar(f, area, notice);
    }
}

fn draw_empty(f: &mut Frame, area: Rect) {
    let lines = vec![
        Line::from(Span::styled("nothing under watch", Theme::title())),
        Line::from(""),
        Line::from(Span::styled(
            "launch a run from the form, or start with --job <id>",
            Theme::muted(),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("f", Theme::dim()),
            Span::styled("  launch form    ", Theme::muted()),
            Span::styled("esc", Theme::dim()),
            Span::styled("  menu", Theme::muted()),
        ]),
    ];

    let y = (area.y + area.height / 2).saturating_sub(2);
    let centered = Rect {
        x: area.x,
        y: y.min(area.y + area.height.saturating_sub(5)),
        width: area.width,
        height: 5,
    };

    f.render_widget(
        Paragraph::new(lines).alignment(Alignment::Center),
        centered,
    );
}

fn draw_hint(f: &mut Frame, area: Rect) {
    let hint = Paragraph::new(Line::from(vec![
        Span::styled("t", Theme::dim()),
        Span::styled("  toggle feed   ", Theme::muted()),
        Span::styled("o", Theme::dim()),
        Span::styled("  web dashboard   ", Theme::muted()),
        Span::styled("f", Theme::dim()),
        Span::styled("  launch form   ", Theme::muted()),
        Span::styled("esc", Theme::dim()),
        Span::styled("  menu", Theme::muted()),
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
