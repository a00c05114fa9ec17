use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::SensorFrame;
use super::Result;

/// Last-saved per-direction targets, kept across sessions.
///
/// `load` never fails: a missing or unreadable record is the initial
/// all-zero target. `save` replaces the whole record.
pub trait TargetStore: Send + Sync {
    fn load(&self) -> SensorFrame;
    fn save(&self, target: &SensorFrame) -> Result<()>;
}

/// On-disk record shape: the four-direction snapshot as field/value pairs
/// under a fixed `levels` key, plus the time it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTargets {
    levels: SensorFrame,
    saved_at: DateTime<Utc>,
}

/// JSON-file-backed target store.
pub struct FileTargetStore {
    path: PathBuf,
}

impl FileTargetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TargetStore for FileTargetStore {
    fn load(&self) -> SensorFrame {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return SensorFrame::default();
            }
            Err(e) => {
                log::warn!("Could not read {}: {}", self.path.display(), e);
                return SensorFrame::default();
            }
        };

        match serde_json::from_str::<StoredTargets>(&text) {
            Ok(stored) => stored.levels,
            Err(e) => {
                log::warn!("Ignoring corrupt target record {}: {}", self.path.display(), e);
                SensorFrame::default()
            }
        }
    }

    fn save(&self, target: &SensorFrame) -> Result<()> {
        let stored = StoredTargets {
            levels: *target,
            saved_at: Utc::now(),
        };
        let text = serde_json::to_string_pretty(&stored)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

/// In-memory target store for tests and hosts without a filesystem.
#[derive(Default)]
pub struct MemoryTargetStore {
    target: Mutex<SensorFrame>,
}

impl MemoryTargetStore {
    pub fn new(initial: SensorFrame) -> Self {
        Self {
            target: Mutex::new(initial),
        }
    }
}

impl TargetStore for MemoryTargetStore {
    fn load(&self) -> SensorFrame {
        *self.target.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn save(&self, target: &SensorFrame) -> Result<()> {
        *self.target.lock().unwrap_or_else(|e| e.into_inner()) = *target;
        Ok(())
    }
}
