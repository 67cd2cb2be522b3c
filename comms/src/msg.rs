use serde::{Deserialize, Serialize};

use crate::specs::job::ProgressSnapshot;

/// The opening frame a panel sends right after connecting. Everything that
/// follows on the channel travels server to client only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscribe {
    pub job_id: String,
}

/// The application layer message for the live feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMsg {
    /// One human readable training log line.
    Log { message: String },
    /// A full progress snapshot. Replaces whatever the panel held before,
    /// field by field merging is never attempted.
    Progress { data: ProgressSnapshot },
    /// Handshake acknowledgement, sent once per connection.
    Connected,
    /// Keepalive. Carries no payload, only freshens the connection.
    Heartbeat,
}
