use std::io;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, DisableFocusChange, EnableFocusChange, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use panel::StateDir;
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::state::deck::{DeckArgs, DeckState};
use crate::ui::screens::{menu, Action, Screen};

const USAGE: &str = "\
tunedeck - terminal control deck for LLM fine tuning jobs

USAGE:
    tunedeck [OPTIONS]

OPTIONS:
    --job <ID>      watch this job id on startup
    --api <URL>     tuning server base url
                    (default http://127.0.0.1:7860, env TUNEDECK_API)
    --feed <ADDR>   live feed address, or 'off' to disable
                    (default 127.0.0.1:7861, env TUNEDECK_FEED)
    --demo          animate a canned job instead of talking to a server
    -h, --help      print this help";

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen, EnableFocusChange)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), DisableFocusChange, LeaveAlternateScreen);
    }
}

/// Runs the TUI application.
///
/// # Errors
/// Returns an error if terminal setup or rendering fails.
pub fn run() -> Result<()> {
    let args = match DeckArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }

    let store = StateDir::open_default();
    init_logging(&store);

    let runtime = tokio::runtime::Runtime::new()?;
    let mut deck = DeckState::new(&args, store, runtime.handle().clone());

    let _guard = TerminalGuard::enter()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut screen = Screen::Menu(menu::MenuState::new());

    loop {
        deck.tick();
        terminal.draw(|f| screen.draw(f, &deck))?;

        if event::poll(Duration::from_millis(120))? {
            match event::read()? {
                Event::Key(k) => {
                    if k.kind != KeyEventKind::Press {
                        continue;
                    }
                    match screen.handle_key(&mut deck, k.code) {
                        Action::Quit => break,
                        Action::Transition(next) => screen = next,
                        Action::None => {}
                    }
                }
                // Terminal focus doubles as panel visibility. Hidden decks
                // stop polling the server.
                Event::FocusGained => deck.monitor.set_visible(true),
                Event::FocusLost => deck.monitor.set_visible(false),
                _ => {}
            }
        }
    }

    deck.close();
    terminal.show_cursor()?;
    Ok(())
}

/// Sends log output to a file under the state directory, but only when
/// `RUST_LOG` asks for any. Logging to stdout would fight the deck for
/// the screen.
fn init_logging(store: &StateDir) {
    if std::env::var("RUST_LOG").is_err() {
        return;
    }

    let _ = std::fs::create_dir_all(store.root());
    if let Ok(file) = std::fs::File::create(store.root().join("tunedeck.log")) {
        env_logger::Builder::from_default_env()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
    }
}
