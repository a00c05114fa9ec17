use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::time::timeout;

use super::framing::LineFramer;
use super::port::{PortProvider, SerialIo};
use super::{Result, SerialError, BAUD_RATE};

/// Connection lifecycle. Exactly one variant is active; transitions are
/// computed by [`next_state`] and mirrored to subscribers over a watch
/// channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

/// Connection-affecting events, as observed by the manager.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    ConnectRequested,
    CapabilityMissing,
    Opened,
    OpenFailed(String),
    /// End-of-stream, read error, hardware removal, or explicit close.
    StreamClosed,
}

/// Pure transition table for the connection lifecycle.
/// Events that are not meaningful in the current state leave it unchanged.
pub fn next_state(state: &LinkState, event: &LinkEvent) -> LinkState {
    match (state, event) {
        (LinkState::Disconnected | LinkState::Failed(_), LinkEvent::ConnectRequested) => {
            LinkState::Connecting
        }
        (LinkState::Disconnected | LinkState::Failed(_), LinkEvent::CapabilityMissing) => {
            LinkState::Failed("capability unsupported".to_string())
        }
        (LinkState::Connecting, LinkEvent::CapabilityMissing) => {
            LinkState::Failed("capability unsupported".to_string())
        }
        (LinkState::Connecting, LinkEvent::Opened) => LinkState::Connected,
        (LinkState::Connecting, LinkEvent::OpenFailed(_)) => {
            LinkState::Failed("could not connect to port".to_string())
        }
        (LinkState::Connected, LinkEvent::StreamClosed) => LinkState::Disconnected,
        (current, _) => current.clone(),
    }
}

struct WriteRequest {
    text: String,
    done: oneshot::Sender<()>,
}

struct ActiveLink {
    write_tx: mpsc::Sender<WriteRequest>,
    shutdown_tx: mpsc::Sender<()>,
    reader: tokio::task::JoinHandle<()>,
}

/// Owns the physical port and drives the connection state machine.
///
/// While connected, a read task pumps decoded chunks through a [`LineFramer`]
/// and republishes complete lines on a broadcast channel, and a write task
/// drains outgoing commands; the two halves of the stream are owned by those
/// tasks and the port closes exactly once, when both are dropped.
pub struct ConnectionManager {
    provider: Option<Arc<dyn PortProvider>>,
    state_tx: watch::Sender<LinkState>,
    line_tx: broadcast::Sender<String>,
    active: Arc<Mutex<Option<ActiveLink>>>,
}

impl ConnectionManager {
    /// A manager built without a provider models a host with no serial
    /// access: `connect()` fails immediately with `capability unsupported`.
    pub fn new(provider: Option<Arc<dyn PortProvider>>) -> Self {
        let (state_tx, _) = watch::channel(LinkState::Disconnected);
        let (line_tx, _) = broadcast::channel(64);
        Self {
            provider,
            state_tx,
            line_tx,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Manager over the host's own serial enumeration.
    pub fn system() -> Self {
        Self::new(Some(Arc::new(super::port::SystemPorts::first_available())))
    }

    pub fn current_state(&self) -> LinkState {
        self.state_tx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.state_tx.borrow(), LinkState::Connected)
    }

    /// Subscribe to connection state changes.
    pub fn state_receiver(&self) -> watch::Receiver<LinkState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to complete lines received from the device.
    pub fn subscribe_lines(&self) -> broadcast::Receiver<String> {
        self.line_tx.subscribe()
    }

    /// Request a port from the host and bring the link up.
    /// Only valid from `Disconnected` or `Failed`.
    pub async fn connect(&self) -> Result<()> {
        {
            let current = self.state_tx.borrow();
            if !matches!(*current, LinkState::Disconnected | LinkState::Failed(_)) {
                return Err(SerialError::AlreadyActive);
            }
        }

        let provider = match &self.provider {
            Some(provider) => provider.clone(),
            None => {
                self.apply(LinkEvent::CapabilityMissing);
                return Err(SerialError::CapabilityUnsupported);
            }
        };

        self.apply(LinkEvent::ConnectRequested);

        match provider.request(BAUD_RATE).await {
            Ok(stream) => {
                self.apply(LinkEvent::Opened);
                self.install(stream).await;
                log::info!("Connected at {} baud", BAUD_RATE);
                Ok(())
            }
            Err(SerialError::CapabilityUnsupported) => {
                log::error!("Host offers no serial capability");
                self.apply(LinkEvent::CapabilityMissing);
                Err(SerialError::CapabilityUnsupported)
            }
            Err(e) => {
                log::error!("Port request failed: {}", e);
                self.apply(LinkEvent::OpenFailed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Forward a command to the device. Dropped unless the link is
    /// `Connected`; otherwise completion is awaited, so a slow device
    /// backpressures the caller.
    pub async fn write(&self, text: &str) {
        if !self.is_connected() {
            log::debug!("Dropping write while not connected: {:?}", text);
            return;
        }

        let write_tx = {
            let guard = self.active.lock().await;
            match guard.as_ref() {
                Some(link) => link.write_tx.clone(),
                None => return,
            }
        };

        let (done_tx, done_rx) = oneshot::channel();
        let request = WriteRequest {
            text: text.to_string(),
            done: done_tx,
        };
        if write_tx.send(request).await.is_ok() {
            // The writer drops the acknowledgement if the port dies mid-write.
            let _ = done_rx.await;
        }
    }

    /// Tear the link down. Safe to call in any state; double-close is a
    /// no-op.
    pub async fn close(&self) {
        let link = { self.active.lock().await.take() };
        let Some(link) = link else { return };

        let _ = link.shutdown_tx.send(()).await;
        if timeout(Duration::from_secs(2), link.reader).await.is_err() {
            log::warn!("Read task did not stop within 2s");
        }
        self.apply(LinkEvent::StreamClosed);
    }

    fn apply(&self, event: LinkEvent) {
        apply_event(&self.state_tx, event);
    }

    async fn install(&self, stream: Box<dyn SerialIo>) {
        let (read_half, write_half) = tokio::io::split(stream);
        let (write_tx, write_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(write_task(write_half, write_rx));
        let reader = tokio::spawn(read_task(
            read_half,
            self.line_tx.clone(),
            shutdown_rx,
            self.state_tx.clone(),
            self.active.clone(),
        ));

        let mut guard = self.active.lock().await;
        *guard = Some(ActiveLink {
            write_tx,
            shutdown_tx,
            reader,
        });
    }
}

fn apply_event(state_tx: &watch::Sender<LinkState>, event: LinkEvent) {
    state_tx.send_modify(|state| {
        let next = next_state(state, &event);
        if *state != next {
            log::info!("Link {:?} -> {:?} on {:?}", state, next, event);
        }
        *state = next;
    });
}

/// Pumps decoded chunks through the framer and republishes complete lines.
/// Ends on end-of-stream, read error, or shutdown signal; whichever side
/// still owns the link performs the `StreamClosed` transition.
async fn read_task(
    mut read_half: ReadHalf<Box<dyn SerialIo>>,
    line_tx: broadcast::Sender<String>,
    mut shutdown_rx: mpsc::Receiver<()>,
    state_tx: watch::Sender<LinkState>,
    active: Arc<Mutex<Option<ActiveLink>>>,
) {
    let mut framer = LineFramer::new();
    let mut buf = [0u8; 512];

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                // Explicit close; the closer owns the state transition.
                return;
            }
            read = read_half.read(&mut buf) => match read {
                Ok(0) => {
                    log::info!("Serial stream ended");
                    break;
                }
                Ok(n) => {
                    // Protocol alphabet is ASCII; anything else decodes lossily.
                    let chunk = String::from_utf8_lossy(&buf[..n]);
                    for line in framer.push(&chunk) {
                        let _ = line_tx.send(line);
                    }
                }
                Err(e) => {
                    log::warn!("Serial read failed: {}", e);
                    break;
                }
            }
        }
    }

    let owned = { active.lock().await.take().is_some() };
    if owned {
        apply_event(&state_tx, LinkEvent::StreamClosed);
    }
}

/// Accepts outgoing text and writes it to the device, acknowledging each
/// request once the transport has taken the bytes.
async fn write_task(
    mut write_half: WriteHalf<Box<dyn SerialIo>>,
    mut write_rx: mpsc::Receiver<WriteRequest>,
) {
    while let Some(request) = write_rx.recv().await {
        if let Err(e) = write_half.write_all(request.text.as_bytes()).await {
            log::warn!("Serial write failed: {}", e);
            break;
        }
        if let Err(e) = write_half.flush().await {
            log::warn!("Serial flush failed: {}", e);
            break;
        }
        let _ = request.done.send(());
    }
}
