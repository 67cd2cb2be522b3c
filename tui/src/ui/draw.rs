use panel::PanelView;
use ratatui::{layout::Rect, Frame};

use super::{layout, widgets};

/// Draws the monitor dashboard.
pub fn dashboard(f: &mut Frame, area: Rect, view: &PanelView, show_logs: bool) {
    let (header_area, progress_area, stats_area, logs_area) = layout::dashboard(area, show_logs);

    f.render_widget(widgets::header(view), header_area);
    f.render_widget(widgets::progress_gauge(view), progress_area);
    f.render_widget(widgets::run_stats(view), stats_area);

    if let Some(logs) = logs_area {
        let rows = logs.height.saturating_sub(2) as usize;
        f.render_widget(widgets::feed_log(view, rows), logs);
    }
}
