use std::collections::HashSet;
use std::time::Instant;

use crossterm::event::KeyCode;
use panel::TuneDraft;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Modifier,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::state::deck::DeckState;
use crate::ui::theme::Theme;

use super::{Action, Screen};

/// One editable row: how to show the current value, and how to push a
/// committed line of text back into the draft.
struct Field {
    name: &'static str,
    get: fn(&TuneDraft) -> String,
    set: fn(&mut TuneDraft, &str) -> Result<(), String>,
}

const FIELDS: &[Field] = &[
    Field {
        name: "base_model",
        get: |d| d.base_model.clone(),
        set: |d, v| {
            d.base_model = v.trim().to_owned();
            Ok(())
        },
    },
    Field {
        name: "model_type",
        get: |d| d.model_type.clone(),
        set: |d, v| {
            d.model_type = v.trim().to_owned();
            Ok(())
        },
    },
    Field {
        name: "dataset_path",
        get: |d| d.dataset_path.clone(),
        set: |d, v| {
            d.dataset_path = v.trim().to_owned();
            Ok(())
        },
    },
    Field {
        name: "output_dir",
        get: |d| d.output_dir.clone(),
        set: |d, v| {
            d.output_dir = v.trim().to_owned();
            Ok(())
        },
    },
    Field {
        name: "project_name",
        get: |d| d.project_name.clone(),
        set: |d, v| {
            d.project_name = v.trim().to_owned();
            Ok(())
        },
    },
    Field {
        name: "learning_rate",
        get: |d| format!("{:e}", d.learning_rate),
        set: |d, v| {
            d.learning_rate = float(v)?;
            Ok(())
        },
    },
    Field {
        name: "epochs",
        get: |d| d.epochs.to_string(),
        set: |d, v| {
            d.epochs = whole(v)?;
            Ok(())
        },
    },
    Field {
        name: "batch_size",
        get: |d| d.batch_size.to_string(),
        set: |d, v| {
            d.batch_size = whole(v)?;
            Ok(())
        },
    },
    Field {
        name: "grad_accum",
        get: |d| d.grad_accum.to_string(),
        set: |d, v| {
            d.grad_accum = whole(v)?;
            Ok(())
        },
    },
    Field {
        name: "max_seq_len",
        get: |d| d.max_seq_len.to_string(),
        set: |d, v| {
            d.max_seq_len = whole(v)?;
            Ok(())
        },
    },
    Field {
        name: "warmup_ratio",
        get: |d| d.warmup_ratio.to_string(),
        set: |d, v| {
            d.warmup_ratio = float(v)?;
            Ok(())
        },
    },
    Field {
        name: "weight_decay",
        get: |d| d.weight_decay.to_string(),
        set: |d, v| {
            d.weight_decay = float(v)?;
            Ok(())
        },
    },
    Field {
        name: "lora_rank",
        get: |d| d.lora_rank.to_string(),
        set: |d, v| {
            d.lora_rank = whole(v)?;
            Ok(())
        },
    },
    Field {
        name: "lora_alpha",
        get: |d| d.lora_alpha.to_string(),
        set: |d, v| {
            d.lora_alpha = whole(v)?;
            Ok(())
        },
    },
    Field {
        name: "lora_dropout",
        get: |d| d.lora_dropout.to_string(),
        set: |d, v| {
            d.lora_dropout = float(v)?;
            Ok(())
        },
    },
    Field {
        name: "save_steps",
        get: |d| d.save_steps.to_string(),
        set: |d, v| {
            d.save_steps = whole(v)?;
            Ok(())
        },
    },
    Field {
        name: "logging_steps",
        get: |d| d.logging_steps.to_string(),
        set: |d, v| {
            d.logging_steps = whole(v)?;
            Ok(())
        },
    },
    Field {
        name: "mixed_precision",
        get: |d| d.mixed_precision.clone(),
        set: |d, v| {
            d.mixed_precision = v.trim().to_owned();
            Ok(())
        },
    },
    Field {
        name: "seed",
        get: |d| d.seed.map(|s| s.to_string()).unwrap_or_default(),
        set: |d, v| {
            let v = v.trim();
            d.seed = if v.is_empty() {
                None
            } else {
                Some(v.parse().map_err(|_| "not a whole number".to_owned())?)
            };
            Ok(())
        },
    },
    Field {
        name: "wandb_project",
        get: |d| d.wandb_project.clone(),
        set: |d, v| {
            d.wandb_project = v.trim().to_owned();
            Ok(())
        },
    },
    Field {
        name: "wandb_api_key",
        get: |d| d.wandb_api_key.clone(),
        set: |d, v| {
            d.wandb_api_key = v.trim().to_owned();
            Ok(())
        },
    },
    Field {
        name: "resume_from",
        get: |d| d.resume_from.clone(),
        set: |d, v| {
            d.resume_from = v.trim().to_owned();
            Ok(())
        },
    },
];

fn float(v: &str) -> Result<f64, String> {
    v.trim().parse().map_err(|_| "not a number".to_owned())
}

fn whole(v: &str) -> Result<u32, String> {
    v.trim().parse().map_err(|_| "not a whole number".to_owned())
}

enum Mode {
    /// Moving over rows.
    Browse,
    /// Editing the selected row.
    Edit(String),
    /// Capturing a name for a preset save.
    SaveName(String),
}

pub struct LaunchState {
    cursor: usize,
    mode: Mode,
}

impl LaunchState {
    pub fn new() -> Self {
        Self {
            cursor: 0,
            mode: Mode::Browse,
        }
    }
}

pub fn handle_key(deck: &mut DeckState, state: &mut LaunchState, key: KeyCode) -> Action {
    deck.notice = None;

    match state.mode {
        Mode::Browse => browse_key(deck, state, key),
        Mode::Edit(_) => edit_key(deck, state, key),
        Mode::SaveName(_) => save_name_key(deck, state, key),
    }
}

fn browse_key(deck: &mut DeckState, state: &mut LaunchState, key: KeyCode) -> Action {
    match key {
        KeyCode::Up | KeyCode::Char('k') => {
            if state.cursor > 0 {
                state.cursor -= 1;
            }
            Action::None
        }
        KeyCode::Down | KeyCode::Char('j') => {
            if state.cursor < FIELDS.len() - 1 {
                state.cursor += 1;
            }
            Action::None
        }
        KeyCode::Enter => {
            state.mode = Mode::Edit((FIELDS[state.cursor].get)(deck.form.draft()));
            Action::None
        }
        KeyCode::Char('l') => launch(deck),
        KeyCode::Char('s') => {
            state.mode = Mode::SaveName(String::new());
            Action::None
        }
        KeyCode::Char('p') => {
            Action::Transition(Screen::Presets(super::presets::PresetsState::enter(deck)))
        }
        KeyCode::Esc | KeyCode::Char('q') => {
            Action::Transition(Screen::Menu(super::menu::MenuState::new()))
        }
        _ => Action::None,
    }
}

fn edit_key(deck: &mut DeckState, state: &mut LaunchState, key: KeyCode) -> Action {
    let Mode::Edit(buffer) = &mut state.mode else {
        return Action::None;
    };

    match key {
        KeyCode::Char(c) => {
            buffer.push(c);
        }
        KeyCode::Backspace => {
            buffer.pop();
        }
        KeyCode::Esc => {
            state.mode = Mode::Browse;
        }
        KeyCode::Enter => {
            let text = buffer.trim().to_owned();
            let field = &FIELDS[state.cursor];

            // Parse against a copy, the draft only changes when the text
            // fits the field.
            let mut trial = deck.form.draft().clone();
            match (field.set)(&mut trial, &text) {
                Ok(()) => {
                    deck.form.edit(Instant::now(), |draft| *draft = trial);
                    state.mode = Mode::Browse;
                }
                Err(message) => deck.notice = Some(format!("{}: {message}", field.name)),
            }
        }
        _ => {}
    }

    Action::None
}

fn save_name_key(deck: &mut DeckState, state: &mut LaunchState, key: KeyCode) -> Action {
    let Mode::SaveName(buffer) = &mut state.mode else {
        return Action::None;
    };

    match key {
        KeyCode::Char(c) => {
            buffer.push(c);
        }
        KeyCode::Backspace => {
            buffer.pop();
        }
        KeyCode::Esc => {
            state.mode = Mode::Browse;
        }
        KeyCode::Enter => {
            let name = buffer.trim().to_owned();
            if name.is_empty() {
                deck.notice = Some("a preset needs a name".into());
                return Action::None;
            }

            match deck.save_preset(&name) {
                Ok(outcome) => {
                    deck.notice = Some(match outcome.fallback {
                        Some(reason) => format!("saved locally, server said no: {reason}"),
                        None => format!("saved to server as {}", outcome.preset.id),
                    });
                }
                Err(e) => deck.notice = Some(format!("preset not saved: {e}")),
            }
            state.mode = Mode::Browse;
        }
        _ => {}
    }

    Action::None
}

fn launch(deck: &mut DeckState) -> Action {
    if !deck.form.is_valid() {
        let first = match deck.form.errors().first() {
            Some(e) => e.to_string(),
            None => "invalid".into(),
        };
        deck.notice = Some(format!("cannot launch, {first}"));
        return Action::None;
    }

    match deck.launch() {
        Ok(id) => {
            deck.notice = Some(format!("launched {id}"));
            Action::Transition(Screen::Monitor(super::monitor::MonitorState::new()))
        }
        Err(e) => {
            deck.notice = Some(format!("launch failed: {e}"));
            Action::None
        }
    }
}

pub fn draw(f: &mut Frame, deck: &DeckState, state: &LaunchState) {
    let area = f.size();
    f.render_widget(Block::default().style(Theme::base()), area);

    let outer = centered_rect(86, 92, area);
    let rows = (FIELDS.len() as u16 + 1) / 2;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),        // title
            Constraint::Length(1),        // draft state
            Constraint::Length(1),        // spacer
            Constraint::Length(rows + 2), // field columns
            Constraint::Length(1),        // spacer
            Constraint::Length(3),        // verdict or save prompt
            Constraint::Min(0),           // spacer
            Constraint::Length(5),        // keybinds
        ])
        .split(outer);

    f.render_widget(
        Paragraph::new(Span::styled(
            "Launch a Fine Tune",
            Theme::title().add_modifier(Modifier::BOLD),
        )),
        chunks[0],
    );
    draw_draft_state(f, chunks[1], deck);
    draw_fields(f, chunks[3], deck, state);

    match &state.mode {
        Mode::SaveName(buffer) => draw_save_prompt(f, chunks[5], buffer),
        _ => draw_verdict(f, chunks[5], deck),
    }

    render_hints(f, chunks[7], hints_for(&state.mode));

    if let Some(notice) = &deck.notice {
        draw_notice_bar(f, area, notice);
    }
}

fn draw_draft_state(f: &mut Frame, area: Rect, deck: &DeckState) {
    let (text, style) = if deck.form.dirty() {
        ("● draft pending save", Theme::warn())
    } else {
        ("draft on disk", Theme::muted())
    };

    f.render_widget(Paragraph::new(Span::styled(text, style)), area);
}

fn draw_fields(f: &mut Frame, area: Rect, deck: &DeckState, state: &LaunchState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Theme::border())
        .title(" Configuration ")
        .title_style(Theme::title());

    let inner = block.inner(area);
    f.render_widget(block, area);

    let half = (FIELDS.len() + 1) / 2;
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(inner);

    draw_column(f, cols[0], deck, state, 0, half);
    draw_column(f, cols[1], deck, state, half, FIELDS.len());
}

fn draw_column(
    f: &mut Frame,
    area: Rect,
    deck: &DeckState,
    state: &LaunchState,
    from: usize,
    to: usize,
) {
    let draft = deck.form.draft();
    let broken: HashSet<&str> = deck.form.errors().iter().map(|e| e.field).collect();

    let lines = (from..to)
        .map(|idx| field_line(draft, state, idx, &broken))
        .collect::<Vec<_>>();

    f.render_widget(Paragraph::new(lines), area);
}

fn field_line(
    draft: &TuneDraft,
    state: &LaunchState,
    idx: usize,
    broken: &HashSet<&str>,
) -> Line<'static> {
    let field = &FIELDS[idx];
    let selected = idx == state.cursor;

    let name_style = if broken.contains(field.name) {
        Theme::error()
    } else if selected {
        Theme::title()
    } else {
        Theme::dim()
    };
    let marker = if selected { "▶ " } else { "  " };

    let mut spans = vec![
        Span::styled(marker.to_owned(), name_style),
        Span::styled(format!("{:<16}", field.name), name_style),
    ];

    match &state.mode {
        Mode::Edit(buffer) if selected => {
            spans.push(Span::styled(buffer.clone(), Theme::text()));
            spans.push(Span::styled("█".to_owned(), Theme::accent_cyan()));
        }
        _ => {
            let style = if selected { Theme::text() } else { Theme::muted() };
            spans.push(Span::styled((field.get)(draft), style));
        }
    }

    Line::from(spans)
}

fn draw_verdict(f: &mut Frame, area: Rect, deck: &DeckState) {
    let errors = deck.form.errors();

    let (message, style) = if errors.is_empty() {
        ("ready to launch".to_owned(), Theme::ok())
    } else {
        let shown = errors
            .iter()
            .take(2)
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let message = if errors.len() > 2 {
            format!("{shown}, and {} more", errors.len() - 2)
        } else {
            shown
        };
        (message, Theme::warn())
    };

    f.render_widget(
        Paragraph::new(Span::styled(message, style))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Theme::border())
                    .title(" Checks ")
                    .title_style(Theme::title()),
            )
            .wrap(Wrap { trim: true }),
        area,
    );
}

fn draw_save_prompt(f: &mut Frame, area: Rect, buffer: &str) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Theme::border())
        .title(" Save as preset ")
        .title_style(Theme::title());

    let inner = block.inner(area);
    f.render_widget(block, area);

    let display = if buffer.is_empty() {
        Line::from(vec![
            Span::styled("name", Theme::muted()),
            Span::styled("█", Theme::accent_cyan()),
        ])
    } else {
        Line::from(vec![
            Span::styled(buffer.to_owned(), Theme::ok()),
            Span::styled("█", Theme::accent_cyan()),
        ])
    };

    f.render_widget(Paragraph::new(display), inner);
}

fn hints_for(mode: &Mode) -> &'static [(&'static str, &'static str)] {
    match mode {
        Mode::Browse => &[
            ("enter", "edit field"),
            ("l", "launch"),
            ("s", "save as preset"),
            ("p", "preset shelf"),
            ("esc", "back to menu"),
        ],
        Mode::Edit(_) => &[("enter", "apply"), ("esc", "discard")],
        Mode::SaveName(_) => &[("enter", "save"), ("esc", "cancel")],
    }
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

fn render_hints(f: &mut Frame, area: Rect, hints: &[(&str, &str)]) {
    let key_col_width = hints
        .iter()
        .map(|(k, _)| k.len() as u16 + 2)
        .max()
        .unwrap_or(8)
        + 2;

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            hints
                .iter()
                .map(|_| Constraint::Length(1))
                .chain(std::iter::once(Constraint::Min(0)))
                .collect::<Vec<_>>(),
        )
        .split(area);

    for (i, (key, action)) in hints.iter().enumerate() {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(key_col_width), Constraint::Min(0)])
            .split(rows[i]);

        f.render_widget(
            Paragraph::new(Span::styled(format!("[{key}]"), Theme::accent_cyan())),
            cols[0],
        );
        f.render_widget(Paragraph::new(Span::styled(*action, Theme::dim())), cols[1]);
    }
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
