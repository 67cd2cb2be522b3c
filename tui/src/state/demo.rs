use std::time::Instant;

use panel::{FeedState, JobStatus, PanelView, ProgressSnapshot};

const TOTAL_STEPS: u64 = 400;
const TOTAL_EPOCHS: u32 = 3;

/// Canned state provider for `--demo`.
///
/// Animates one believable fine tuning run without a server, so the
/// monitor screen can be driven and styled offline.
#[derive(Debug)]
pub struct DemoState {
    tick: usize,
    view: PanelView,
}

impl DemoState {
    pub fn new() -> Self {
        let view = PanelView {
            job_id: Some("job-demo".into()),
            logs: vec!["demo mode, nothing here touches a server".into()],
            ..PanelView::default()
        };

        Self { tick: 0, view }
    }

    /// Returns the snapshot used by the UI.
    pub fn view(&self) -> PanelView {
        self.view.clone()
    }

    /// Advances the canned run.
    pub fn tick(&mut self) {
        self.tick += 1;

        // Phase progression
        if self.tick < 10 {
            self.view.status = JobStatus::Running;
            self.view.feed = FeedState::Connecting;
            return;
        }
        if self.tick == 10 {
            self.view.feed = FeedState::Connected;
            self.view.logs.push("live feed connected".into());
        }

        let step = (self.tick as u64 - 10).min(TOTAL_STEPS);
        if step < TOTAL_STEPS {
            self.view.last_seen = Some(Instant::now());
            self.view.progress = Some(snapshot_at(step));

            if step > 0 && step % 25 == 0 {
                self.view
                    .logs
                    .push(format!("step {step}/{TOTAL_STEPS} loss {:.3}", fake_loss(step)));
            }
        } else if self.view.status != JobStatus::Completed {
            self.view.status = JobStatus::Completed;
            self.view.feed = FeedState::Disconnected;
            self.view.progress = Some(snapshot_at(TOTAL_STEPS));
            self.view.logs.push("run complete, adapter saved".into());
        }
    }
}

fn snapshot_at(step: u64) -> ProgressSnapshot {
    let epoch = (step * u64::from(TOTAL_EPOCHS) / TOTAL_STEPS + 1).min(u64::from(TOTAL_EPOCHS));

    ProgressSnapshot {
        current_step: Some(step),
        total_steps: Some(TOTAL_STEPS),
        current_epoch: Some(epoch as u32),
        total_epochs: Some(TOTAL_EPOCHS),
        loss: Some(fake_loss(step)),
        learning_rate: Some(fake_lr(step)),
    }
}

fn fake_loss(step: u64) -> f64 {
    2.8 * (-(step as f64) / 180.0).exp() + 0.45
}

fn fake_lr(step: u64) -> f64 {
    let warmup = 12.0;
    let s = step as f64;

    if s < warmup {
        2e-4 * s / warmup
    } else {
        2e-4 * (1.0 - (s - warmup) / (TOTAL_STEPS as f64 - warmup)).max(0.0)
    }
}
