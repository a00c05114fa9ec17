pub mod controller;
pub mod models;
pub mod store;

pub use controller::{reconcile_commands, SyncController, POLL_INTERVAL};
pub use models::{Direction, PadSnapshot, SensorFrame};
pub use store::{FileTargetStore, MemoryTargetStore, TargetStore};

#[derive(Debug, thiserror::Error)]
pub enum PadError {
    #[error("target {0} outside 0..=1000")]
    TargetOutOfRange(i32),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PadError>;
