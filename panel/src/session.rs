use std::{net::SocketAddr, sync::Arc, time::Instant};

use comms::specs::job::{JobOutcome, ProgressSnapshot, StatusReply};
use log::{debug, info};
use serde_json::{Map, Value};
use tokio::{
    runtime::Handle,
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    api::{ApiClient, ApiError},
    job::JobIdentityStore,
    status, stream,
    view::{FeedState, JobStatus, PanelView},
};

/// Events applied to the panel view. Produced by the poll and feed tasks,
/// consumed only by [`Monitor`].
#[derive(Debug)]
pub enum MonitorEvent {
    /// One answer from the status endpoint.
    Status(StatusReply),
    /// The status endpoint could not be reached or answered garbage.
    PollFailed(String),
    /// The live feed finished its handshake.
    FeedConnected,
    /// One log line from the live feed.
    FeedLine(String),
    /// A fresh progress snapshot from the live feed.
    FeedProgress(ProgressSnapshot),
    /// The live feed proved it is still alive.
    FeedHeartbeat,
    /// The live feed ended, cleanly or not.
    FeedClosed,
}

/// Watches one fine tuning job and keeps a [`PanelView`] current.
///
/// The monitor owns both background tasks, the status poller and the live
/// feed pump. They report through an event channel that is replaced on
/// every re-activation, so events from a torn down watch can never leak
/// into the next one.
pub struct Monitor {
    api: Arc<dyn ApiClient>,
    ids: JobIdentityStore,
    feed_addr: Option<SocketAddr>,
    handle: Handle,
    view: PanelView,
    events_tx: mpsc::UnboundedSender<MonitorEvent>,
    events_rx: mpsc::UnboundedReceiver<MonitorEvent>,
    visible: watch::Sender<bool>,
    poll_interval: std::time::Duration,
    poll_task: Option<JoinHandle<()>>,
    stream_task: Option<JoinHandle<()>>,
}

impl Monitor {
    /// Creates an idle monitor. Nothing is watched until
    /// [`Monitor::activate`] or [`Monitor::start`] names a job.
    ///
    /// # Arguments
    /// * `api` - The server client used for status polls and launches.
    /// * `ids` - The durable job identity record.
    /// * `feed_addr` - Where the live feed listens, `None` disables it.
    /// * `handle` - The runtime that carries the background tasks.
    pub fn new(
        api: Arc<dyn ApiClient>,
        ids: JobIdentityStore,
        feed_addr: Option<SocketAddr>,
        handle: Handle,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (visible, _) = watch::channel(true);

        Self {
            api,
            ids,
            feed_addr,
            handle,
            view: PanelView::default(),
            events_tx,
            events_rx,
            visible,
            poll_interval: status::POLL_INTERVAL,
            poll_task: None,
            stream_task: None,
        }
    }

    /// Overrides the poll cadence, mainly so tests run in milliseconds.
    pub fn with_poll_interval(mut self, interval: std::time::Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn view(&self) -> &PanelView {
        &self.view
    }

    /// Launches a job from a config bag and starts watching it.
    ///
    /// # Returns
    /// The server assigned job id.
    pub async fn start(&mut self, config: &Map<String, Value>) -> Result<String, ApiError> {
        let id = self.api.start_training(config).await?;
        info!(job_id = id.as_str(); "training launched");
        self.activate(Some(&id), None);

        Ok(id)
    }

    /// Resolves which job to watch and arms the background tasks for it.
    ///
    /// A just launched id wins over an id handed over on startup, which
    /// wins over the durable record. Re-activating the job already under
    /// watch is a no-op, anything else tears the old watch down and starts
    /// clean.
    ///
    /// # Returns
    /// The id now being watched, or `None` when no source names one.
    pub fn activate(&mut self, launched: Option<&str>, handover: Option<&str>) -> Option<String> {
        let id = self.ids.resolve(launched, handover)?;

        let same = self.view.job_id.as_deref() == Some(id.as_str());
        let watching = self.poll_task.as_ref().is_some_and(|t| !t.is_finished());
        if !(same && watching) {
            self.rearm(id.clone());
        }

        Some(id)
    }

    /// Gates the poll cadence. Hidden panels stop polling entirely and a
    /// panel becoming visible again polls right away.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible.send_if_modified(|current| {
            if *current == visible {
                false
            } else {
                *current = visible;
                true
            }
        });
    }

    /// Applies every event that is already waiting, without blocking.
    /// Call once per frame.
    pub fn pump(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event);
        }
    }

    /// Waits for one event and applies it. Waits forever when no task is
    /// producing any, so callers pair it with a timeout.
    pub async fn drive(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.apply(event);
        }
    }

    /// Drops the watch without touching the durable record.
    pub fn shutdown(&mut self) {
        self.teardown();
    }

    fn rearm(&mut self, id: String) {
        self.teardown();

        // Fresh channel per watch. Tasks from the previous watch still
        // hold the old sender, their late events land nowhere.
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.events_tx = events_tx;
        self.events_rx = events_rx;

        self.view = PanelView {
            job_id: Some(id.clone()),
            ..PanelView::default()
        };
        self.spawn_poller(id);
    }

    fn spawn_poller(&mut self, id: String) {
        debug!(job_id = id.as_str(); "arming status poller");
        self.poll_task = Some(self.handle.spawn(status::run(
            self.api.clone(),
            id,
            self.visible.subscribe(),
            self.events_tx.clone(),
            self.poll_interval,
        )));
    }

    /// Arms the feed task unless one is already armed. Only ever called
    /// while the latest status report says the job is running, which is
    /// what makes the feed follow the poller rather than retry on its own.
    fn ensure_feed(&mut self) {
        if self.stream_task.is_some() {
            return;
        }
        let Some(addr) = self.feed_addr else { return };
        let Some(id) = self.view.job_id.clone() else {
            return;
        };

        debug!(job_id = id.as_str(); "arming live feed");
        self.view.feed = FeedState::Connecting;
        self.stream_task = Some(
            self.handle
                .spawn(stream::run(addr, id, self.events_tx.clone())),
        );
    }

    fn apply(&mut self, event: MonitorEvent) {
        match event {
            MonitorEvent::Status(reply) => self.on_status(reply),
            MonitorEvent::PollFailed(message) => self.finish(JobStatus::Idle, Some(message)),
            MonitorEvent::FeedConnected => {
                self.view.feed = FeedState::Connected;
                self.view.logs.push("live feed connected".into());
                self.view.last_seen = Some(Instant::now());
            }
            MonitorEvent::FeedLine(line) => {
                self.view.logs.push(line);
                self.view.last_seen = Some(Instant::now());
            }
            MonitorEvent::FeedProgress(snapshot) => {
                // Wholesale swap. A sparser snapshot still beats a fuller
                // older one.
                self.view.progress = Some(snapshot);
                self.view.last_seen = Some(Instant::now());
            }
            MonitorEvent::FeedHeartbeat => self.view.last_seen = Some(Instant::now()),
            MonitorEvent::FeedClosed => {
                // The task announced its own end, dropping the handle is
                // enough. The next running status report re-arms it.
                self.stream_task = None;
                self.view.feed = FeedState::Disconnected;
            }
        }
    }

    fn on_status(&mut self, reply: StatusReply) {
        if reply.is_training {
            if self.view.status != JobStatus::Running {
                if let Some(id) = &self.view.job_id {
                    info!(job_id = id.as_str(); "job is running");
                }
            }
            self.view.status = JobStatus::Running;
            self.view.notice = None;
            if let Some(progress) = reply.progress {
                self.view.progress = Some(progress);
            }
            self.ensure_feed();
            return;
        }

        let settled = match reply.state {
            Some(JobOutcome::Failed) => JobStatus::Failed,
            Some(JobOutcome::Completed) => JobStatus::Completed,
            // No explicit outcome: a job we saw running has completed, one
            // we never saw running was simply over before we looked.
            None if self.view.status == JobStatus::Running => JobStatus::Completed,
            None => JobStatus::Idle,
        };
        self.finish(settled, None);
    }

    /// Terminal handling. Order is load bearing: the stored id is
    /// forgotten first, the feed is torn down second, the view settles
    /// last. A feed reconnect can never race a job the poller has declared
    /// over.
    fn finish(&mut self, status: JobStatus, notice: Option<String>) {
        if let Some(id) = &self.view.job_id {
            info!(job_id = id.as_str(), status = status.label(); "watch finished");
        }

        self.ids.clear();
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
        self.poll_task = None;

        self.view.status = status;
        self.view.feed = FeedState::Disconnected;
        self.view.notice = notice;
    }

    fn teardown(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };
    use std::time::Duration;

    use async_trait::async_trait;
    use comms::specs::preset::{PresetRecord, PresetUpload};
    use tokio::time::timeout;

    use super::*;
    use crate::store::StateDir;

    /// Hangs on every request. For tests that drive `apply` by hand.
    struct NeverApi;

    #[async_trait]
    impl ApiClient for NeverApi {
        async fn start_training(&self, _: &Map<String, Value>) -> Result<String, ApiError> {
            std::future::pending().await
        }

        async fn training_status(&self, _: &str) -> Result<StatusReply, ApiError> {
            std::future::pending().await
        }

        async fn list_presets(&self) -> Result<Vec<PresetRecord>, ApiError> {
            std::future::pending().await
        }

        async fn fetch_preset(&self, _: &str) -> Result<Option<PresetRecord>, ApiError> {
            std::future::pending().await
        }

        async fn save_preset(&self, _: &PresetUpload) -> Result<PresetRecord, ApiError> {
            std::future::pending().await
        }

        async fn delete_preset(&self, _: &str) -> Result<bool, ApiError> {
            std::future::pending().await
        }
    }

    /// Serves a scripted sequence of status answers, then repeats the last.
    struct ScriptApi {
        script: Mutex<Vec<Result<StatusReply, u16>>>,
        polls: AtomicUsize,
    }

    impl ScriptApi {
        fn new(script: Vec<Result<StatusReply, u16>>) -> Self {
            Self {
                script: Mutex::new(script),
                polls: AtomicUsize::new(0),
            }
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ApiClient for ScriptApi {
        async fn start_training(&self, _: &Map<String, Value>) -> Result<String, ApiError> {
            Ok("job-scripted".into())
        }

        async fn training_status(&self, _: &str) -> Result<StatusReply, ApiError> {
            self.polls.fetch_add(1, Ordering::SeqCst);

            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            };

            next.map_err(|status| ApiError::Status {
                status,
                message: "scripted failure".into(),
            })
        }

        async fn list_presets(&self) -> Result<Vec<PresetRecord>, ApiError> {
            Ok(vec![])
        }

        async fn fetch_preset(&self, _: &str) -> Result<Option<PresetRecord>, ApiError> {
            Ok(None)
        }

        async fn save_preset(&self, _: &PresetUpload) -> Result<PresetRecord, ApiError> {
            Err(ApiError::Status {
                status: 500,
                message: "not in this test".into(),
            })
        }

        async fn delete_preset(&self, _: &str) -> Result<bool, ApiError> {
            Ok(false)
        }
    }

    fn running() -> StatusReply {
        StatusReply {
            is_training: true,
            progress: None,
            state: None,
        }
    }

    fn stopped(state: Option<JobOutcome>) -> StatusReply {
        StatusReply {
            is_training: false,
            progress: None,
            state,
        }
    }

    fn monitor_over(api: Arc<dyn ApiClient>, dir: &tempfile::TempDir) -> Monitor {
        let ids = JobIdentityStore::new(StateDir::new(dir.path()));
        Monitor::new(api, ids, None, Handle::current()).with_poll_interval(Duration::from_millis(10))
    }

    async fn drive_until(monitor: &mut Monitor, mut done: impl FnMut(&PanelView) -> bool) {
        timeout(Duration::from_secs(5), async {
            while !done(monitor.view()) {
                monitor.drive().await;
            }
        })
        .await
        .expect("monitor never reached the expected state");
    }

    #[tokio::test]
    async fn progress_is_replaced_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = monitor_over(Arc::new(NeverApi), &dir);

        let full = ProgressSnapshot {
            current_step: Some(3),
            total_steps: Some(100),
            ..ProgressSnapshot::default()
        };
        let sparse = ProgressSnapshot {
            current_step: Some(5),
            ..ProgressSnapshot::default()
        };
        let restored = ProgressSnapshot {
            current_step: Some(5),
            total_steps: Some(100),
            ..ProgressSnapshot::default()
        };

        monitor
            .events_tx
            .send(MonitorEvent::FeedProgress(full))
            .unwrap();
        monitor
            .events_tx
            .send(MonitorEvent::FeedProgress(sparse.clone()))
            .unwrap();
        monitor.pump();

        let progress = monitor.view().progress.clone().unwrap();
        assert_eq!(progress, sparse);
        assert_eq!(
            progress.total_steps, None,
            "stale totals must not survive the swap"
        );

        monitor
            .events_tx
            .send(MonitorEvent::FeedProgress(restored.clone()))
            .unwrap();
        monitor.pump();

        assert_eq!(monitor.view().progress.clone().unwrap(), restored);
    }

    #[tokio::test]
    async fn feed_connect_writes_a_confirmation_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = monitor_over(Arc::new(NeverApi), &dir);

        monitor.events_tx.send(MonitorEvent::FeedConnected).unwrap();
        monitor.pump();

        assert_eq!(monitor.view().feed, FeedState::Connected);
        assert_eq!(monitor.view().logs, vec!["live feed connected".to_owned()]);
    }

    #[tokio::test]
    async fn heartbeats_only_freshen_the_feed() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = monitor_over(Arc::new(NeverApi), &dir);

        monitor.events_tx.send(MonitorEvent::FeedConnected).unwrap();
        monitor.events_tx.send(MonitorEvent::FeedHeartbeat).unwrap();
        monitor.pump();

        assert!(monitor.view().live());
        assert!(monitor.view().last_seen.is_some());
        assert_eq!(
            monitor.view().logs.len(),
            1,
            "a heartbeat must not grow the log buffer"
        );
        assert!(monitor.view().progress.is_none());
    }

    #[tokio::test]
    async fn feed_close_resets_the_indicator() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = monitor_over(Arc::new(NeverApi), &dir);

        monitor.events_tx.send(MonitorEvent::FeedConnected).unwrap();
        monitor.events_tx.send(MonitorEvent::FeedClosed).unwrap();
        monitor.pump();

        assert!(!monitor.view().live());
        assert_eq!(monitor.view().feed, FeedState::Disconnected);
    }

    #[tokio::test]
    async fn running_then_silent_stop_reads_as_completed() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = monitor_over(Arc::new(NeverApi), &dir);

        monitor
            .events_tx
            .send(MonitorEvent::Status(running()))
            .unwrap();
        monitor
            .events_tx
            .send(MonitorEvent::Status(stopped(None)))
            .unwrap();
        monitor.pump();

        assert_eq!(monitor.view().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn stop_without_ever_running_reads_as_idle() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = monitor_over(Arc::new(NeverApi), &dir);

        monitor
            .events_tx
            .send(MonitorEvent::Status(stopped(None)))
            .unwrap();
        monitor.pump();

        assert_eq!(monitor.view().status, JobStatus::Idle);
    }

    #[tokio::test]
    async fn explicit_failure_tag_wins() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ScriptApi::new(vec![
            Ok(running()),
            Ok(stopped(Some(JobOutcome::Failed))),
        ]));
        let mut monitor = monitor_over(api, &dir);

        monitor.activate(Some("job-f"), None);
        drive_until(&mut monitor, |view| view.status.is_terminal()).await;

        assert_eq!(monitor.view().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn terminal_report_clears_identity_and_feed() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ScriptApi::new(vec![Ok(running()), Ok(stopped(None))]));
        let mut monitor = monitor_over(api, &dir);

        monitor.activate(Some("job-t"), None);
        drive_until(&mut monitor, |view| view.status.is_terminal()).await;

        assert_eq!(monitor.view().status, JobStatus::Completed);
        assert_eq!(monitor.view().feed, FeedState::Disconnected);

        // A restart over the same state directory finds nothing to resume.
        let fresh_ids = JobIdentityStore::new(StateDir::new(dir.path()));
        assert_eq!(fresh_ids.resolve(None, None), None);
    }

    #[tokio::test]
    async fn one_poll_failure_degrades_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ScriptApi::new(vec![Ok(running()), Err(502)]));
        let mut monitor = monitor_over(api.clone(), &dir);

        monitor.activate(Some("job-gone"), None);
        drive_until(&mut monitor, |view| {
            view.status == JobStatus::Idle && view.notice.is_some()
        })
        .await;

        let polls_at_failure = api.polls();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(api.polls(), polls_at_failure, "no retries after a failure");

        let fresh_ids = JobIdentityStore::new(StateDir::new(dir.path()));
        assert_eq!(fresh_ids.resolve(None, None), None);
    }

    #[tokio::test]
    async fn hidden_panels_stop_polling() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ScriptApi::new(vec![Ok(running())]));
        let mut monitor = monitor_over(api.clone(), &dir)
            .with_poll_interval(Duration::from_millis(20));

        monitor.activate(Some("job-v"), None);
        drive_until(&mut monitor, |view| view.status == JobStatus::Running).await;

        monitor.set_visible(false);
        // Let any poll that was already in flight land before measuring.
        tokio::time::sleep(Duration::from_millis(60)).await;
        let parked_at = api.polls();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(api.polls(), parked_at, "hidden panels must not poll");
    }

    #[tokio::test]
    async fn becoming_visible_polls_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ScriptApi::new(vec![Ok(running())]));
        // An interval far beyond the test timeout. Only the visibility
        // hand-off can deliver the second poll in time.
        let mut monitor =
            monitor_over(api.clone(), &dir).with_poll_interval(Duration::from_secs(120));

        monitor.activate(Some("job-w"), None);
        drive_until(&mut monitor, |view| view.status == JobStatus::Running).await;

        monitor.set_visible(false);
        monitor.set_visible(true);

        timeout(Duration::from_secs(2), monitor.drive())
            .await
            .expect("no out-of-cadence poll after becoming visible");
        assert!(api.polls() >= 2);
    }

    #[tokio::test]
    async fn reactivating_the_same_job_keeps_the_watch() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ScriptApi::new(vec![Ok(running())]));
        let mut monitor = monitor_over(api, &dir);

        monitor.activate(Some("job-same"), None);
        drive_until(&mut monitor, |view| view.status == JobStatus::Running).await;

        monitor.activate(None, Some("job-same"));

        assert_eq!(monitor.view().status, JobStatus::Running, "no reset");
    }

    #[tokio::test]
    async fn stale_events_cannot_cross_a_rearm() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = monitor_over(Arc::new(NeverApi), &dir);

        monitor.activate(Some("job-old"), None);
        let old_tx = monitor.events_tx.clone();

        monitor.activate(Some("job-new"), None);
        let _ = old_tx.send(MonitorEvent::FeedLine("ghost line".into()));
        monitor.pump();

        assert!(monitor.view().logs.is_empty());
        assert_eq!(monitor.view().job_id.as_deref(), Some("job-new"));
    }

    #[tokio::test]
    async fn start_activates_the_returned_id() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ScriptApi::new(vec![Ok(running())]));
        let mut monitor = monitor_over(api, &dir);

        let id = monitor.start(&Map::new()).await.unwrap();

        assert_eq!(id, "job-scripted");
        assert_eq!(monitor.view().job_id.as_deref(), Some("job-scripted"));
        drive_until(&mut monitor, |view| view.status == JobStatus::Running).await;
    }
}
