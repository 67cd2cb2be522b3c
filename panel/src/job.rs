use log::{debug, warn};

use crate::store::{CURRENT_JOB, StateDir};

/// Remembers which fine tuning job this panel is watching.
///
/// The id survives restarts through the durable record, so a panel opened
/// days after a launch still resolves the same job.
#[derive(Debug, Clone)]
pub struct JobIdentityStore {
    store: StateDir,
}

impl JobIdentityStore {
    pub fn new(store: StateDir) -> Self {
        Self { store }
    }

    /// Resolves the active job id from the highest priority source that has
    /// one: a just launched job, then an id handed over on startup, then the
    /// durable record. The winner is rewritten to the record so every later
    /// resolution agrees with this one.
    ///
    /// # Returns
    /// The active id, or `None` when no source knows of a job.
    pub fn resolve(&self, launched: Option<&str>, handover: Option<&str>) -> Option<String> {
        let id = non_empty(launched)
            .or_else(|| non_empty(handover))
            .map(str::to_owned)
            .or_else(|| self.store.read::<String>(CURRENT_JOB).filter(|s| !s.is_empty()))?;

        if let Err(e) = self.store.write(CURRENT_JOB, &id) {
            warn!(job_id = id.as_str(); "failed to persist job id: {e}");
        }

        Some(id)
    }

    /// Forgets the durable record. Later resolutions fall back to whatever
    /// the caller supplies, or to nothing.
    pub fn clear(&self) {
        debug!("clearing stored job id");
        if let Err(e) = self.store.remove(CURRENT_JOB) {
            warn!("failed to clear stored job id: {e}");
        }
    }
}

fn non_empty(source: Option<&str>) -> Option<&str> {
    source.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> JobIdentityStore {
        JobIdentityStore::new(StateDir::new(dir.path()))
    }

    #[test]
    fn launched_id_wins_over_everything() {
        let dir = tempfile::tempdir().unwrap();
        let ids = store_in(&dir);

        ids.resolve(None, Some("old-job"));
        let id = ids.resolve(Some("fresh-job"), Some("old-job"));

        assert_eq!(id.as_deref(), Some("fresh-job"));
    }

    #[test]
    fn handover_beats_stored_record() {
        let dir = tempfile::tempdir().unwrap();
        let ids = store_in(&dir);

        ids.resolve(Some("stored-job"), None);
        let id = ids.resolve(None, Some("handover-job"));

        assert_eq!(id.as_deref(), Some("handover-job"));
    }

    #[test]
    fn resolution_is_stable_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        store_in(&dir).resolve(Some("job-123"), None);

        // A fresh instance over the same directory models a restart.
        let id = store_in(&dir).resolve(None, None);
        assert_eq!(id.as_deref(), Some("job-123"));
    }

    #[test]
    fn winner_is_rewritten_to_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let ids = store_in(&dir);

        ids.resolve(None, Some("arg-job"));

        assert_eq!(ids.resolve(None, None).as_deref(), Some("arg-job"));
    }

    #[test]
    fn blank_sources_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ids = store_in(&dir);

        assert_eq!(ids.resolve(Some("  "), Some("")), None);
    }

    #[test]
    fn clear_forgets_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let ids = store_in(&dir);

        ids.resolve(Some("job-9"), None);
        ids.clear();

        assert_eq!(ids.resolve(None, None), None);
    }

    #[test]
    fn clear_without_record_is_fine() {
        let dir = tempfile::tempdir().unwrap();

        store_in(&dir).clear();
    }
}
