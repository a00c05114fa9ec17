use serde::{Deserialize, Serialize};

/// The four sensor channels of the pad. Fixed, closed set; the protocol
/// index of each direction is derived from
/// [`crate::serial::protocol::WIRE_ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];
}

/// One value per direction, in sensor units (nominally 0..=1000).
///
/// Observed frames store device values as reported; range is enforced only
/// on values this side sends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorFrame {
    pub up: i32,
    pub down: i32,
    pub left: i32,
    pub right: i32,
}

impl SensorFrame {
    pub fn get(&self, direction: Direction) -> i32 {
        match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
            Direction::Left => self.left,
            Direction::Right => self.right,
        }
    }

    pub fn set(&mut self, direction: Direction, value: i32) {
        match direction {
            Direction::Up => self.up = value,
            Direction::Down => self.down = value,
            Direction::Left => self.left = value,
            Direction::Right => self.right = value,
        }
    }
}

/// Everything the presentation layer needs to render one pad, published
/// atomically on every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PadSnapshot {
    /// User-desired thresholds, persisted across sessions.
    pub target: SensorFrame,
    /// Thresholds the device last reported as configured; absent until the
    /// first report arrives.
    pub thresholds: Option<SensorFrame>,
    /// Raw sensor levels the device last reported.
    pub levels: SensorFrame,
}
