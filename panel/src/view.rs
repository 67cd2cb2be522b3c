use std::time::Instant;

use comms::specs::job::ProgressSnapshot;

/// What the watched job is doing, as far as the panel can tell.
///
/// `Idle` covers both "never started" and "finished some time ago". Once a
/// job settles back to `Idle` the two are indistinguishable on purpose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Word shown next to the job id.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Lifecycle of the live feed connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FeedState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Everything a presentation layer needs to draw the panel.
///
/// Only the monitor writes to this. Consumers read a snapshot per frame and
/// never hold it across await points.
#[derive(Debug, Clone, Default)]
pub struct PanelView {
    pub job_id: Option<String>,
    pub status: JobStatus,
    /// Latest known progress. Replaced wholesale on every update, a new
    /// snapshot with fewer fields still wins.
    pub progress: Option<ProgressSnapshot>,
    pub feed: FeedState,
    /// When the feed last proved it was alive, heartbeat or payload alike.
    pub last_seen: Option<Instant>,
    /// Append only log buffer. Trimming for display is the consumer's job.
    pub logs: Vec<String>,
    /// Last poll or feed failure worth surfacing, cleared on recovery.
    pub notice: Option<String>,
}

impl PanelView {
    /// Whether the live indicator should read as connected.
    pub fn live(&self) -> bool {
        self.feed == FeedState::Connected
    }
}
