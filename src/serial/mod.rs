pub mod connection;
pub mod framing;
pub mod port;
pub mod protocol;

pub use connection::{next_state, ConnectionManager, LinkEvent, LinkState};
pub use framing::LineFramer;
pub use port::{PortProvider, SystemPorts};
pub use protocol::{DeviceFrame, POLL_LEVELS, WIRE_ORDER};

/// Fixed baud rate of the pad firmware's serial console.
pub const BAUD_RATE: u32 = 9600;

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("capability unsupported")]
    CapabilityUnsupported,

    #[error("could not connect to port: {0}")]
    PortUnavailable(String),

    #[error("connect() is only valid while disconnected or failed")]
    AlreadyActive,

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
