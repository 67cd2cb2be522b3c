use std::{sync::Arc, time::Duration};

use log::{debug, warn};
use tokio::sync::{mpsc, watch};

use crate::{api::ApiClient, session::MonitorEvent};

/// Default spacing between status requests.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Polls the status endpoint for one job until the job stops running or a
/// request fails, reporting every answer as a [`MonitorEvent`].
///
/// Visibility gates the cadence. While `visible` is false no requests leave
/// at all, and the first poll after becoming visible again fires
/// immediately instead of waiting out a full interval.
pub(crate) async fn run(
    api: Arc<dyn ApiClient>,
    job_id: String,
    mut visible: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<MonitorEvent>,
    interval: Duration,
) {
    loop {
        while !*visible.borrow() {
            if visible.changed().await.is_err() {
                return;
            }
        }

        let report = api.training_status(&job_id).await;
        let done = match &report {
            Ok(reply) => !reply.is_training,
            // One failed poll ends the watch, there is no retry ladder.
            Err(_) => true,
        };

        let event = match report {
            Ok(reply) => MonitorEvent::Status(reply),
            Err(e) => {
                warn!(job_id = job_id.as_str(); "status poll failed: {e}");
                MonitorEvent::PollFailed(e.to_string())
            }
        };
        if events.send(event).is_err() {
            return;
        }

        if done {
            debug!(job_id = job_id.as_str(); "status poller finished");
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = visible.changed() => {
                if changed.is_err() {
                    return;
                }
                // Visibility flipped mid wait. The loop head re-evaluates,
                // a hidden panel parks and a freshly visible one polls now.
            }
        }
    }
}
