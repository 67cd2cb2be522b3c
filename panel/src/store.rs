use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use log::warn;
use serde::{Serialize, de::DeserializeOwned};

/// File name of the active job id record.
pub const CURRENT_JOB: &str = "current-job.json";
/// File name of the locally stored preset catalog.
pub const LOCAL_PRESETS: &str = "local-presets.json";
/// File name of the persisted launch form.
pub const FORM_CONFIG: &str = "form-config.json";

/// Durable panel state. One directory, one JSON file per record.
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// Creates a handle rooted at `root`. The directory is created lazily
    /// on the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves the default state directory.
    ///
    /// `TUNEDECK_STATE_DIR` wins when set, otherwise the state lives under
    /// the user's local share directory.
    pub fn default_root() -> PathBuf {
        if let Ok(dir) = env::var("TUNEDECK_STATE_DIR") {
            if !dir.is_empty() {
                return PathBuf::from(dir);
            }
        }

        match env::var("HOME") {
            Ok(home) if !home.is_empty() => PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("tunedeck")
                .join("state"),
            _ => env::temp_dir().join("tunedeck").join("state"),
        }
    }

    /// Opens the default state directory, see [`StateDir::default_root`].
    pub fn open_default() -> Self {
        Self::new(Self::default_root())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reads one record. A missing file is `None`. An unreadable or corrupt
    /// file is logged and treated as absent.
    pub fn read<T: DeserializeOwned>(&self, record: &str) -> Option<T> {
        let path = self.root.join(record);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(record = record; "failed to read state record: {e}");
                return None;
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(record = record; "discarding corrupt state record: {e}");
                None
            }
        }
    }

    /// Writes one record atomically. The payload lands in a sibling temp
    /// file first and is renamed over the target, so a crash mid write
    /// never leaves a half written record behind.
    pub fn write<T: Serialize>(&self, record: &str, value: &T) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;

        let path = self.root.join(record);
        let tmp = path.with_extension("json.tmp");
        let raw = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;

        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &path)
    }

    /// Removes one record. Removing a record that never existed is fine.
    pub fn remove(&self, record: &str) -> io::Result<()> {
        match fs::remove_file(self.root.join(record)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
