// Copyright 2024 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Background reconnection of offline drives.
//!
//! The monitor publishes the state it has actually entered on a second watch
//! channel, so [`ConnectionMonitor::pause`] can wait until no reconnect pass
//! is running before the caller touches the disk table.

use crate::topology::Topology;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    Paused,
}

#[derive(Debug)]
pub struct ConnectionMonitor {
    ctrl_tx: watch::Sender<MonitorState>,
    ack_rx: watch::Receiver<MonitorState>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionMonitor {
    /// Start reconnecting offline drives of `topology` every `interval`.
    pub fn spawn(topology: Arc<Topology>, interval: Duration, cancel: CancellationToken) -> Self {
        let (ctrl_tx, ctrl_rx) = watch::channel(MonitorState::Running);
        let (ack_tx, ack_rx) = watch::channel(MonitorState::Running);

        let handle = tokio::spawn(run_monitor(topology, interval, ctrl_rx, ack_tx, cancel.clone()));

        Self {
            ctrl_tx,
            ack_rx,
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Stop reconnecting. Returns once the monitor is idle, or has exited.
    pub async fn pause(&self) {
        self.ctrl_tx.send_replace(MonitorState::Paused);

        let mut ack = self.ack_rx.clone();
        if ack.wait_for(|s| *s == MonitorState::Paused).await.is_err() {
            debug!("connection monitor already stopped");
        }
    }

    pub fn resume(&self) {
        self.ctrl_tx.send_replace(MonitorState::Running);
    }

    /// The state the monitor last acknowledged.
    pub fn state(&self) -> MonitorState {
        *self.ack_rx.borrow()
    }

    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("connection monitor ended abnormally: {e}");
            }
        }
    }
}

async fn run_monitor(
    topology: Arc<Topology>,
    interval: Duration,
    mut ctrl_rx: watch::Receiver<MonitorState>,
    ack_tx: watch::Sender<MonitorState>,
    cancel: CancellationToken,
) {
    info!("connection monitor started, interval {interval:?}");

    loop {
        let desired = *ctrl_rx.borrow_and_update();
        ack_tx.send_replace(desired);

        match desired {
            MonitorState::Paused => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    res = ctrl_rx.changed() => {
                        if res.is_err() {
                            break;
                        }
                    }
                }
            }
            MonitorState::Running => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    res = ctrl_rx.changed() => {
                        if res.is_err() {
                            break;
                        }
                        continue;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }

                topology.connect_disks().await;
            }
        }
    }

    info!("connection monitor exit");
}
