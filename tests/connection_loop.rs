use std::sync::Arc;

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;

use padlink::serial::port::{PortProvider, SerialIo};
use padlink::serial::{ConnectionManager, LinkState, Result, SerialError};

/// Stands in for the host's serial stack: hands out one in-memory stream,
/// then reports the port as unavailable.
struct FakeHost {
    stream: Mutex<Option<DuplexStream>>,
}

impl FakeHost {
    fn with_device() -> (Arc<Self>, DuplexStream) {
        let (host_side, device_side) = duplex(256);
        (
            Arc::new(Self {
                stream: Mutex::new(Some(host_side)),
            }),
            device_side,
        )
    }
}

#[async_trait::async_trait]
impl PortProvider for FakeHost {
    async fn request(&self, _baud_rate: u32) -> Result<Box<dyn SerialIo>> {
        match self.stream.lock().await.take() {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(SerialError::PortUnavailable("device busy".to_string())),
        }
    }
}

#[tokio::test]
async fn test_connect_then_lines_flow_across_chunk_boundaries() {
    let (provider, mut device) = FakeHost::with_device();
    let manager = ConnectionManager::new(Some(provider));

    manager.connect().await.unwrap();
    assert_eq!(manager.current_state(), LinkState::Connected);

    let mut lines = manager.subscribe_lines();
    device.write_all(b"v 1 2").await.unwrap();
    device.write_all(b" 3 4\nt 5").await.unwrap();
    device.write_all(b" 6 7 8\n").await.unwrap();

    assert_eq!(lines.recv().await.unwrap(), "v 1 2 3 4");
    assert_eq!(lines.recv().await.unwrap(), "t 5 6 7 8");
}

#[tokio::test]
async fn test_write_reaches_the_device() {
    let (provider, mut device) = FakeHost::with_device();
    let manager = ConnectionManager::new(Some(provider));
    manager.connect().await.unwrap();

    manager.write("2 500\n").await;

    let mut buf = [0u8; 32];
    let n = device.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"2 500\n");
}

#[tokio::test]
async fn test_write_while_disconnected_is_dropped() {
    let (provider, mut device) = FakeHost::with_device();
    let manager = ConnectionManager::new(Some(provider));

    // Not connected: the write completes immediately and sends nothing.
    manager.write("0 1\n").await;
    assert_eq!(manager.current_state(), LinkState::Disconnected);

    manager.connect().await.unwrap();
    manager.write("0 1\n").await;
    let mut buf = [0u8; 32];
    let n = device.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"0 1\n");
}

#[tokio::test]
async fn test_device_removal_forces_disconnected_mid_read() {
    let (provider, mut device) = FakeHost::with_device();
    let manager = ConnectionManager::new(Some(provider));
    manager.connect().await.unwrap();

    let mut lines = manager.subscribe_lines();
    let mut state_rx = manager.state_receiver();

    // One complete line, one buffered partial, then the hardware goes away.
    device.write_all(b"v 1 2 3 4\nt 9").await.unwrap();
    assert_eq!(lines.recv().await.unwrap(), "v 1 2 3 4");
    drop(device);

    state_rx
        .wait_for(|state| *state == LinkState::Disconnected)
        .await
        .unwrap();

    // The buffered partial is discarded, not emitted.
    assert!(lines.try_recv().is_err());
}

#[tokio::test]
async fn test_missing_capability_fails_connect() {
    let manager = ConnectionManager::new(None);

    let err = manager.connect().await.unwrap_err();
    assert!(matches!(err, SerialError::CapabilityUnsupported));
    assert_eq!(
        manager.current_state(),
        LinkState::Failed("capability unsupported".to_string())
    );
}

#[tokio::test]
async fn test_open_failure_is_recoverable_by_retry() {
    let (provider, _device) = FakeHost::with_device();
    let manager = ConnectionManager::new(Some(provider));

    manager.connect().await.unwrap();
    manager.close().await;
    assert_eq!(manager.current_state(), LinkState::Disconnected);

    // The fake host has no stream left: request fails, state carries the
    // fixed user-facing message.
    let err = manager.connect().await.unwrap_err();
    assert!(matches!(err, SerialError::PortUnavailable(_)));
    assert_eq!(
        manager.current_state(),
        LinkState::Failed("could not connect to port".to_string())
    );

    // connect() is still legal from Failed; it just fails the same way.
    assert!(manager.connect().await.is_err());
}

#[tokio::test]
async fn test_connect_while_connected_is_rejected() {
    let (provider, _device) = FakeHost::with_device();
    let manager = ConnectionManager::new(Some(provider));
    manager.connect().await.unwrap();

    let err = manager.connect().await.unwrap_err();
    assert!(matches!(err, SerialError::AlreadyActive));
    assert_eq!(manager.current_state(), LinkState::Connected);
}

#[tokio::test]
async fn test_double_close_is_a_no_op() {
    let (provider, _device) = FakeHost::with_device();
    let manager = ConnectionManager::new(Some(provider));
    manager.connect().await.unwrap();

    manager.close().await;
    assert_eq!(manager.current_state(), LinkState::Disconnected);
    manager.close().await;
    assert_eq!(manager.current_state(), LinkState::Disconnected);
}
