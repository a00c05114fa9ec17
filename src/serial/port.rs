use tokio::io::{AsyncRead, AsyncWrite};

use super::{Result, SerialError};

/// Byte stream of an open serial device.
pub trait SerialIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> SerialIo for T {}

/// Host-supplied capability for requesting an open serial device.
///
/// The manager treats the absence of a provider as "host offers no serial
/// access"; a provider that cannot enumerate ports at all reports
/// `CapabilityUnsupported` itself. Tests substitute in-memory duplex streams.
#[async_trait::async_trait]
pub trait PortProvider: Send + Sync {
    /// Request a port from the host and open it at the given baud rate.
    async fn request(&self, baud_rate: u32) -> Result<Box<dyn SerialIo>>;
}

/// Opens ports from the host's serial enumeration.
pub struct SystemPorts {
    port_name: Option<String>,
}

impl SystemPorts {
    /// Open a specific port by name.
    pub fn named(port_name: impl Into<String>) -> Self {
        Self {
            port_name: Some(port_name.into()),
        }
    }

    /// Open the first port the host enumerates.
    pub fn first_available() -> Self {
        Self { port_name: None }
    }
}

#[async_trait::async_trait]
impl PortProvider for SystemPorts {
    async fn request(&self, baud_rate: u32) -> Result<Box<dyn SerialIo>> {
        let name = match &self.port_name {
            Some(name) => name.clone(),
            None => {
                let ports = serialport::available_ports()
                    .map_err(|_| SerialError::CapabilityUnsupported)?;
                ports
                    .first()
                    .map(|p| p.port_name.clone())
                    .ok_or_else(|| {
                        SerialError::PortUnavailable("no serial ports present".to_string())
                    })?
            }
        };

        log::info!("Opening serial port {} at {} baud", name, baud_rate);
        let stream = tokio_serial::SerialStream::open(&tokio_serial::new(&name, baud_rate))
            .map_err(|e| SerialError::PortUnavailable(e.to_string()))?;
        Ok(Box::new(stream))
    }
}
