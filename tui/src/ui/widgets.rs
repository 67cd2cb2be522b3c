use panel::{FeedState, JobStatus, PanelView};
use ratatui::{
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Wrap},
};

use super::theme::Theme;

pub fn header<'a>(view: &'a PanelView) -> Paragraph<'a> {
    let job = view.job_id.as_deref().unwrap_or("-");

    let line1 = Line::from(vec![
        Span::styled("tunedeck", Theme::title()),
        Span::raw("  |  "),
        Span::raw(format!("job: {job}")),
        Span::raw("  |  "),
        Span::styled(view.status.label(), status_style(view.status)),
    ]);
    let line2 = Line::from(feed_spans(view));

    Paragraph::new(vec![line1, line2])
        .block(boxed(" Watch "))
        .wrap(Wrap { trim: true })
}

pub fn progress_gauge<'a>(view: &PanelView) -> Gauge<'a> {
    let ratio = view.progress.as_ref().and_then(|p| p.ratio());
    let label = match ratio {
        Some(r) => format!("{:.1}%", r * 100.0),
        None => "awaiting progress".into(),
    };

    Gauge::default()
        .block(boxed(" Progress "))
        .gauge_style(Theme::ok())
        .ratio(ratio.unwrap_or(0.0))
        .label(label)
}

pub fn run_stats<'a>(view: &PanelView) -> Paragraph<'a> {
    let lines = match &view.progress {
        Some(p) => vec![
            stat_line("step", counter(p.current_step, p.total_steps)),
            stat_line(
                "epoch",
                counter(p.current_epoch.map(u64::from), p.total_epochs.map(u64::from)),
            ),
            stat_line("loss", number(p.loss, |v| format!("{v:.4}"))),
            stat_line("lr", number(p.learning_rate, |v| format!("{v:.2e}"))),
        ],
        None => vec![Line::from(Span::styled("no snapshot yet", Theme::muted()))],
    };

    Paragraph::new(lines)
        .block(boxed(" Run "))
        .wrap(Wrap { trim: true })
}

pub fn feed_log<'a>(view: &'a PanelView, rows: usize) -> Paragraph<'a> {
    let tail = view.logs.iter().rev().take(rows).rev();

    let lines = tail
        .map(|l| Line::from(Span::styled(l.as_str(), Theme::dim())))
        .collect::<Vec<_>>();

    Paragraph::new(lines)
        .block(boxed(" Live Feed "))
        .wrap(Wrap { trim: true })
}

fn boxed(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Theme::border())
        .title(title)
        .title_style(Theme::title())
}

fn feed_spans(view: &PanelView) -> Vec<Span<'static>> {
    let (dot, style, word) = match view.feed {
        FeedState::Connected => ("●", Theme::ok(), "live"),
        FeedState::Connecting => ("◌", Theme::warn(), "connecting"),
        FeedState::Disconnected => ("○", Theme::muted(), "feed off"),
    };

    let mut spans = vec![Span::styled(format!("{dot} "), style), Span::styled(word, style)];
    if let Some(seen) = view.last_seen {
        spans.push(Span::styled(
            format!("   last frame {}s ago", seen.elapsed().as_secs()),
            Theme::muted(),
        ));
    }

    spans
}

fn stat_line(name: &'static str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{name:>6}  "), Theme::dim()),
        Span::styled(value, Theme::text()),
    ])
}

fn counter(current: Option<u64>, total: Option<u64>) -> String {
    match (current, total) {
        (Some(c), Some(t)) => format!("{c} / {t}"),
        (Some(c), None) => c.to_string(),
        _ => "-".into(),
    }
}

fn number(value: Option<f64>, fmt: impl Fn(f64) -> String) -> String {
    value.map(fmt).unwrap_or_else(|| "-".into())
}

fn status_style(status: JobStatus) -> Style {
    match status {
        JobStatus::Running => Theme::ok(),
        JobStatus::Completed => Theme::accent_cyan(),
        JobStatus::Failed => Theme::error(),
        JobStatus::Idle => Theme::muted(),
    }
}
