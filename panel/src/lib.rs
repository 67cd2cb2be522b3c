pub mod api;
pub mod error;
pub mod form;
pub mod job;
pub mod presets;
pub mod session;
mod status;
mod stream;
pub mod store;
pub mod view;

pub use api::{ApiClient, ApiError, HttpApi};
pub use comms::specs::job::ProgressSnapshot;
pub use error::PanelError;
pub use form::{FormState, TuneDraft};
pub use job::JobIdentityStore;
pub use presets::{DeleteOutcome, Preset, PresetCatalog, PresetOrigin, PresetResolver, SaveOutcome};
pub use session::{Monitor, MonitorEvent};
pub use store::StateDir;
pub use view::{FeedState, JobStatus, PanelView};
