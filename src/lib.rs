pub mod pad;
pub mod serial;

pub use pad::{Direction, PadSnapshot, SensorFrame, SyncController};
pub use serial::{ConnectionManager, LinkState};
