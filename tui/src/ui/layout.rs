use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Computes the dashboard regions.
///
/// # Returns
/// (header, progress, stats, logs_opt)
pub fn dashboard(area: Rect, show_logs: bool) -> (Rect, Rect, Rect, Option<Rect>) {
    let constraints = if show_logs {
        vec![
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Min(6),
        ]
    } else {
        vec![
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Min(6),
        ]
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    let header = chunks[0];
    let progress = chunks[1];
    let stats = chunks[2];
    let logs = if show_logs { Some(chunks[3]) } else { None };

    (header, progress, stats, logs)
}

/// Splits off the one line hint bar at the bottom.
pub fn with_hint_bar(area: Rect) -> (Rect, Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);

    (rows[0], rows[1])
}
