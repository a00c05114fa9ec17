use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::MissedTickBehavior;

use crate::serial::protocol::{
    decode_line, encode_set_threshold, DeviceFrame, POLL_LEVELS, WIRE_ORDER,
};
use crate::serial::{ConnectionManager, LinkState};

use super::models::{Direction, PadSnapshot, SensorFrame};
use super::store::TargetStore;
use super::{PadError, Result};

/// How often a fresh level reading is requested while connected.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Frames {
    target: SensorFrame,
    thresholds: Option<SensorFrame>,
    levels: SensorFrame,
}

/// Keeps the device's thresholds converged to the user's target and the
/// observed levels/thresholds fresh for display, without redundant writes.
///
/// The three frames live here as explicit owned fields; the presentation
/// layer watches [`PadSnapshot`]s and calls [`set_target`](Self::set_target).
pub struct SyncController {
    connection: Arc<ConnectionManager>,
    store: Arc<dyn TargetStore>,
    frames: Mutex<Frames>,
    snapshot_tx: watch::Sender<PadSnapshot>,
}

/// Commands needed to converge the device on `target`, one per mismatched
/// direction in wire order. A direction whose target already equals the
/// last observed threshold emits nothing; a never-observed threshold counts
/// as 0.
pub fn reconcile_commands(target: &SensorFrame, observed: Option<&SensorFrame>) -> Vec<String> {
    let observed = observed.copied().unwrap_or_default();
    WIRE_ORDER
        .iter()
        .filter_map(|&direction| {
            let want = target.get(direction);
            if want == observed.get(direction) {
                return None;
            }
            match encode_set_threshold(direction, want) {
                Ok(command) => Some(command),
                Err(e) => {
                    log::warn!("Skipping {:?} during reconciliation: {}", direction, e);
                    None
                }
            }
        })
        .collect()
}

impl SyncController {
    /// Seeds the target frame from the store; observed frames start empty
    /// and are populated only from decoded device reports.
    pub fn new(connection: Arc<ConnectionManager>, store: Arc<dyn TargetStore>) -> Self {
        let target = store.load();
        let frames = Frames {
            target,
            thresholds: None,
            levels: SensorFrame::default(),
        };
        let (snapshot_tx, _) = watch::channel(PadSnapshot {
            target,
            thresholds: None,
            levels: SensorFrame::default(),
        });
        Self {
            connection,
            store,
            frames: Mutex::new(frames),
            snapshot_tx,
        }
    }

    /// Subscribe to presentation snapshots.
    pub fn snapshot_receiver(&self) -> watch::Receiver<PadSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> PadSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Record a new desired threshold for one direction.
    ///
    /// Validates the range, persists the full target snapshot, and runs a
    /// reconciliation pass. Out-of-range values mutate nothing and send
    /// nothing.
    pub async fn set_target(&self, direction: Direction, value: i32) -> Result<()> {
        if !(0..=1000).contains(&value) {
            return Err(PadError::TargetOutOfRange(value));
        }

        let (target, commands) = {
            let mut frames = self.frames.lock().await;
            frames.target.set(direction, value);
            (
                frames.target,
                reconcile_commands(&frames.target, frames.thresholds.as_ref()),
            )
        };

        self.store.save(&target)?;
        self.publish().await;
        for command in commands {
            self.connection.write(&command).await;
        }
        Ok(())
    }

    /// Drive polling and reconciliation. Waits for the link to come up,
    /// runs until it leaves `Connected`, then waits for the next
    /// user-initiated reconnect. Returns when the connection manager is
    /// gone.
    pub async fn run(&self) {
        let mut state_rx = self.connection.state_receiver();
        loop {
            while !matches!(*state_rx.borrow_and_update(), LinkState::Connected) {
                if state_rx.changed().await.is_err() {
                    return;
                }
            }
            self.run_connected(&mut state_rx).await;
        }
    }

    async fn run_connected(&self, state_rx: &mut watch::Receiver<LinkState>) {
        let mut lines = self.connection.subscribe_lines();
        let mut poll = tokio::time::interval(POLL_INTERVAL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Converge thresholds as soon as the link comes up.
        self.reconcile().await;

        loop {
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err()
                        || !matches!(*state_rx.borrow_and_update(), LinkState::Connected)
                    {
                        log::info!("Sync loop stopped: link left Connected");
                        return;
                    }
                }
                line = lines.recv() => match line {
                    Ok(line) => self.handle_line(&line).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!("Sync loop lagged, dropped {} device lines", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
                _ = poll.tick() => self.connection.write(POLL_LEVELS).await,
            }
        }
    }

    async fn handle_line(&self, line: &str) {
        match decode_line(line) {
            Some(DeviceFrame::Levels(frame)) => {
                self.frames.lock().await.levels = frame;
                self.publish().await;
            }
            Some(DeviceFrame::Thresholds(frame)) => {
                {
                    self.frames.lock().await.thresholds = Some(frame);
                }
                self.publish().await;
                self.reconcile().await;
            }
            None => {}
        }
    }

    /// One reconciliation pass: at most one write per mismatched direction,
    /// issued without waiting for the device's acknowledgement in between.
    async fn reconcile(&self) {
        let commands = {
            let frames = self.frames.lock().await;
            reconcile_commands(&frames.target, frames.thresholds.as_ref())
        };
        for command in commands {
            self.connection.write(&command).await;
        }
    }

    async fn publish(&self) {
        let frames = self.frames.lock().await;
        self.snapshot_tx.send_replace(PadSnapshot {
            target: frames.target,
            thresholds: frames.thresholds,
            levels: frames.levels,
        });
    }
}
