use crate::pad::{Direction, SensorFrame};

use super::{Result, SerialError};

/// Wire order of the pad's sensor channels. A direction's command index is
/// its position here, and decoded report fields are assigned in this order.
/// If a board revision rewires the channels, this constant is the only thing
/// to touch.
pub const WIRE_ORDER: [Direction; 4] = [
    Direction::Up,
    Direction::Left,
    Direction::Down,
    Direction::Right,
];

/// Poll command requesting a fresh level report.
pub const POLL_LEVELS: &str = "v\n";

/// One decoded device-to-host report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFrame {
    /// `v <a> <b> <c> <d>` — current raw sensor levels.
    Levels(SensorFrame),
    /// `t <a> <b> <c> <d>` — thresholds currently configured on the device.
    Thresholds(SensorFrame),
}

/// Command index of a direction on the wire.
pub fn wire_index(direction: Direction) -> usize {
    // WIRE_ORDER lists every direction exactly once
    WIRE_ORDER
        .iter()
        .position(|&d| d == direction)
        .unwrap_or(0)
}

/// Encode a set-threshold command for one direction.
/// Format: `<index> <value>\n`, decimal, value in 0..=1000.
pub fn encode_set_threshold(direction: Direction, value: i32) -> Result<String> {
    if !(0..=1000).contains(&value) {
        return Err(SerialError::ProtocolError(format!(
            "threshold {} outside 0..=1000",
            value
        )));
    }
    Ok(format!("{} {}\n", wire_index(direction), value))
}

/// Decode one framed line into a device report.
/// Format: `<kind> <a> <b> <c> <d>`, kind `v` (levels) or `t` (thresholds),
/// four decimal integers in wire order. Lines of any other shape yield
/// `None`: they are logged and dropped without touching connection state.
/// Values are passed through as reported; range is only enforced on the
/// encode side.
pub fn decode_line(line: &str) -> Option<DeviceFrame> {
    let line = line.strip_suffix('\r').unwrap_or(line);

    let tokens: Vec<&str> = line.split(' ').collect();
    if tokens.len() != 5 {
        log::debug!("Ignoring line with {} tokens: {:?}", tokens.len(), line);
        return None;
    }

    let mut values = [0i32; 4];
    for (slot, token) in values.iter_mut().zip(&tokens[1..]) {
        match token.parse::<i32>() {
            Ok(value) => *slot = value,
            Err(_) => {
                log::debug!("Ignoring report with non-integer field {:?}: {:?}", token, line);
                return None;
            }
        }
    }

    let mut frame = SensorFrame::default();
    for (&direction, &value) in WIRE_ORDER.iter().zip(values.iter()) {
        frame.set(direction, value);
    }

    match tokens[0] {
        "v" => Some(DeviceFrame::Levels(frame)),
        "t" => Some(DeviceFrame::Thresholds(frame)),
        kind => {
            log::debug!("Ignoring report with unknown kind {:?}: {:?}", kind, line);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_levels_in_wire_order() {
        let frame = decode_line("v 10 20 30 40").unwrap();
        match frame {
            DeviceFrame::Levels(levels) => {
                assert_eq!(levels.up, 10);
                assert_eq!(levels.left, 20);
                assert_eq!(levels.down, 30);
                assert_eq!(levels.right, 40);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_decode_thresholds() {
        let frame = decode_line("t 100 200 300 400").unwrap();
        assert!(matches!(frame, DeviceFrame::Thresholds(_)));
    }

    #[test]
    fn test_encode_uses_wire_index() {
        assert_eq!(encode_set_threshold(Direction::Down, 500).unwrap(), "2 500\n");
        assert_eq!(encode_set_threshold(Direction::Up, 0).unwrap(), "0 0\n");
        assert_eq!(encode_set_threshold(Direction::Right, 1000).unwrap(), "3 1000\n");
    }

    #[test]
    fn test_encode_rejects_out_of_range() {
        assert!(encode_set_threshold(Direction::Up, -1).is_err());
        assert!(encode_set_threshold(Direction::Up, 1001).is_err());
    }

    #[test]
    fn test_decode_ignores_wrong_arity() {
        assert_eq!(decode_line("x 1 2"), None);
        assert_eq!(decode_line(""), None);
        assert_eq!(decode_line("v 1 2 3 4 5"), None);
    }

    #[test]
    fn test_decode_ignores_non_integer_fields() {
        assert_eq!(decode_line("v 1 2 three 4"), None);
    }

    #[test]
    fn test_decode_ignores_unknown_kind() {
        assert_eq!(decode_line("z 1 2 3 4"), None);
    }

    #[test]
    fn test_decode_passes_out_of_range_values_through() {
        match decode_line("v 0 2000 -5 40").unwrap() {
            DeviceFrame::Levels(levels) => {
                assert_eq!(levels.left, 2000);
                assert_eq!(levels.down, -5);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_decode_strips_trailing_carriage_return() {
        assert!(decode_line("v 1 2 3 4\r").is_some());
    }
}
