use serde::{Deserialize, Serialize};

/// The reply to a job launch request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StartReply {
    pub job_id: String,
}

/// How a finished job ended, when the server distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Completed,
    Failed,
}

/// One answer from the status endpoint.
///
/// `is_training` is the only guaranteed field. Older servers omit both
/// `progress` and `state`, so those decode leniently.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusReply {
    pub is_training: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<JobOutcome>,
}

/// A point in time view of training progress.
///
/// Every field is optional. A server early in a run may only know the step
/// counters, loss and learning rate usually appear after the first logged
/// optimizer step.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProgressSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_epoch: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_epochs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
}

impl ProgressSnapshot {
    /// Completion in `[0.0, 1.0]` when both step counters are known.
    pub fn ratio(&self) -> Option<f64> {
        match (self.current_step, self.total_steps) {
            (Some(step), Some(total)) if total > 0 => {
                Some((step as f64 / total as f64).clamp(0.0, 1.0))
            }
            _ => None,
        }
    }
}
