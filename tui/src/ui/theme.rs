use ratatui::style::{Color, Modifier, Style};

/// Warm amber console theme.
///
/// Base aesthetic:
/// - amber foreground on a near-black background
/// - cool accents reserved for keys and statuses
pub struct Theme;

impl Theme {
    // Core palette
    pub const BG: Color = Color::Rgb(14, 10, 3);
    pub const FG_AMBER: Color = Color::Rgb(255, 183, 0);
    pub const FG_DIM: Color = Color::Rgb(196, 134, 0);
    pub const FG_MUTED: Color = Color::Rgb(115, 95, 60);

    // Accents (chosen to read against amber)
    pub const ACCENT_CYAN: Color = Color::Rgb(0, 224, 224);
    pub const ACCENT_GREEN: Color = Color::Rgb(110, 240, 120);
    pub const ACCENT_YELLOW: Color = Color::Rgb(255, 238, 90);
    pub const ACCENT_RED: Color = Color::Rgb(255, 82, 82);

    /// Default full-screen style.
    pub fn base() -> Style {
        Style::default().fg(Self::FG_AMBER).bg(Self::BG)
    }

    /// Panel borders.
    pub fn border() -> Style {
        Style::default().fg(Self::FG_DIM).bg(Self::BG)
    }

    /// Titles (bold amber).
    pub fn title() -> Style {
        Style::default()
            .fg(Self::FG_AMBER)
            .add_modifier(Modifier::BOLD)
    }

    /// Regular text.
    pub fn text() -> Style {
        Style::default().fg(Self::FG_AMBER)
    }

    /// Secondary/dim text.
    pub fn dim() -> Style {
        Style::default().fg(Self::FG_DIM)
    }

    /// Muted/disabled text.
    pub fn muted() -> Style {
        Style::default().fg(Self::FG_MUTED)
    }

    pub fn ok() -> Style {
        Style::default()
            .fg(Self::ACCENT_GREEN)
            .add_modifier(Modifier::BOLD)
    }

    pub fn warn() -> Style {
        Style::default()
            .fg(Self::ACCENT_YELLOW)
            .add_modifier(Modifier::BOLD)
    }

    pub fn error() -> Style {
        Style::default()
            .fg(Self::ACCENT_RED)
            .add_modifier(Modifier::BOLD)
    }

    pub fn accent_cyan() -> Style {
        Style::default()
            .fg(Self::ACCENT_CYAN)
            .add_modifier(Modifier::BOLD)
    }
}
