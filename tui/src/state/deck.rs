use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use log::warn;
use panel::{
    ApiClient, ApiError, DeleteOutcome, FormState, HttpApi, JobIdentityStore, Monitor, PanelError,
    PanelView, PresetCatalog, PresetResolver, SaveOutcome, StateDir,
};
use tokio::runtime::Handle;

use super::demo::DemoState;

const DEFAULT_API: &str = "http://127.0.0.1:7860";
const DEFAULT_FEED: &str = "127.0.0.1:7861";

/// Raw command line switches. Environment fallbacks are applied later, in
/// [`DeckState::new`].
#[derive(Debug, Default)]
pub struct DeckArgs {
    pub job: Option<String>,
    pub api: Option<String>,
    pub feed: Option<String>,
    pub demo: bool,
    pub help: bool,
}

impl DeckArgs {
    /// Parses the command line.
    ///
    /// # Errors
    /// A message naming the flag that broke, for the usage screen.
    pub fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
        let mut parsed = Self::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--job" => parsed.job = Some(value_for(&mut args, "--job")?),
                "--api" => parsed.api = Some(value_for(&mut args, "--api")?),
                "--feed" => parsed.feed = Some(value_for(&mut args, "--feed")?),
                "--demo" => parsed.demo = true,
                "--help" | "-h" => parsed.help = true,
                other => return Err(format!("unknown argument: {other}")),
            }
        }

        Ok(parsed)
    }
}

fn value_for(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    args.next().ok_or_else(|| format!("{flag} needs a value"))
}

/// Flag first, then environment, then the built in default.
fn setting(flag: Option<&str>, env_key: &str, default: &str) -> String {
    if let Some(value) = flag {
        return value.to_owned();
    }

    match std::env::var(env_key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_owned(),
    }
}

fn parse_feed(feed: &str) -> Option<SocketAddr> {
    if feed == "off" {
        return None;
    }

    match feed.parse() {
        Ok(addr) => Some(addr),
        Err(_) => {
            warn!("feed address {feed} does not parse, live feed disabled");
            None
        }
    }
}

/// Everything the screens share: the job monitor, the launch form, the
/// preset book and a one line notice.
pub struct DeckState {
    pub store: StateDir,
    pub api_base: String,
    pub monitor: Monitor,
    pub form: FormState,
    pub presets: PresetResolver,
    pub catalog: PresetCatalog,
    pub notice: Option<String>,
    pub demo: Option<DemoState>,
    handle: Handle,
}

impl DeckState {
    pub fn new(args: &DeckArgs, store: StateDir, handle: Handle) -> Self {
        let api_base = setting(args.api.as_deref(), "TUNEDECK_API", DEFAULT_API);
        let feed = setting(args.feed.as_deref(), "TUNEDECK_FEED", DEFAULT_FEED);

        let api: Arc<dyn ApiClient> = Arc::new(HttpApi::new(api_base.clone()));
        let mut monitor = Monitor::new(
            api.clone(),
            JobIdentityStore::new(store.clone()),
            parse_feed(&feed),
            handle.clone(),
        );
        if !args.demo {
            monitor.activate(None, args.job.as_deref());
        }

        let form = FormState::load(&store);
        let presets = PresetResolver::new(api, store.clone());

        Self {
            store,
            api_base,
            monitor,
            form,
            presets,
            catalog: PresetCatalog::default(),
            notice: None,
            demo: args.demo.then(DemoState::new),
            handle,
        }
    }

    /// Once per frame: apply pending monitor events, advance the canned
    /// job, flush a due autosave.
    pub fn tick(&mut self) {
        self.monitor.pump();
        if let Some(demo) = &mut self.demo {
            demo.tick();
        }
        if let Err(e) = self.form.autosave(Instant::now(), &self.store) {
            warn!("draft autosave failed: {e}");
            self.notice = Some(format!("draft autosave failed: {e}"));
        }
    }

    /// The view the monitor screen renders. The canned job wins while demo
    /// mode is on.
    pub fn panel_view(&self) -> PanelView {
        match &self.demo {
            Some(demo) => demo.view(),
            None => self.monitor.view().clone(),
        }
    }

    /// Launches from the current draft and puts the new job under watch.
    pub fn launch(&mut self) -> Result<String, ApiError> {
        let bag = self.form.config_bag();
        let handle = self.handle.clone();

        handle.block_on(self.monitor.start(&bag))
    }

    /// Stores the current draft as a named preset.
    pub fn save_preset(&mut self, name: &str) -> Result<SaveOutcome, PanelError> {
        let bag = self.form.config_bag();
        let handle = self.handle.clone();

        handle.block_on(self.presets.save(name, "", &bag))
    }

    pub fn delete_preset(&mut self, id: &str) -> Result<DeleteOutcome, PanelError> {
        let handle = self.handle.clone();

        handle.block_on(self.presets.delete(id))
    }

    /// Re-reads every preset tier. Called on entering the preset screen
    /// and after every mutation there.
    pub fn refresh_catalog(&mut self) {
        let handle = self.handle.clone();
        self.catalog = handle.block_on(self.presets.list());
    }

    /// Last writes before the terminal is handed back.
    pub fn close(&mut self) {
        // An exit flush does not wait out the debounce window.
        let due = Instant::now() + panel::form::DEBOUNCE;
        if let Err(e) = self.form.autosave(due, &self.store) {
            warn!("final draft flush failed: {e}");
        }
        self.monitor.shutdown();
    }
}
