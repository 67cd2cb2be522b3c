pub mod launch;
pub mod menu;
pub mod monitor;
pub mod presets;

use crossterm::event::KeyCode;
use ratatui::Frame;

use crate::state::deck::DeckState;

pub enum Action {
    None,
    Quit,
    Transition(Screen),
}

pub enum Screen {
    Menu(menu::MenuState),
    Launch(launch::LaunchState),
    Presets(presets::PresetsState),
    Monitor(monitor::MonitorState),
}

impl Screen {
    pub fn draw(&self, f: &mut Frame, deck: &DeckState) {
        match self {
            Screen::Menu(s) => menu::draw(f, deck, s),
            Screen::Launch(s) => launch::draw(f, deck, s),
            Screen::Presets(s) => presets::draw(f, deck, s),
            Screen::Monitor(s) => monitor::draw(f, deck, s),
        }
    }

    pub fn handle_key(&mut self, deck: &mut DeckState, key: KeyCode) -> Action {
        match self {
            Screen::Menu(s) => menu::handle_key(deck, s, key),
            Screen::Launch(s) => launch::handle_key(deck, s, key),
            Screen::Presets(s) => presets::handle_key(deck, s, key),
            Screen::Monitor(s) => monitor::handle_key(deck, s, key),
        }
    }
}
