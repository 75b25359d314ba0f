//! ==============================================================================
//! session.rs - single-writer owner of history and toggle state
//! ==============================================================================
//!
//! purpose:
//!     everything that mutates monitor state funnels through one tokio task:
//!     - inbound events from the subscription (`on_event`)
//!     - user toggles (`toggle`)
//!     - completions of the remote writes those toggles started
//!
//! ```text
//!     the task processes commands one at a time, so the history bank and
//!     the toggle controller need no locks of their own. after every command
//!     the task renders a `MonitorView` into shared state for readers.
//! ```
//!
//! architecture:
//!
//! ```text
//!     subscription ──┐                     ┌── write task (timeout) ──┐
//!                    ▼                     │                          │
//!     http toggle ─► mpsc<Command> ─► session task ◄──────────────────┘
//!                                          │      (WriteFinished)
//!                                          ▼
//!                                Arc<RwLock<MonitorView>> ─► http readers
//!
//! ```
//! relationships:
//!     - owns: history.rs (HistoryBank), toggle.rs (OptimisticToggleController)
//!     - uses: backend.rs (ControlWriter for remote writes)
//!     - used by: subscription.rs, server.rs, main.rs
//!
//! ==============================================================================

use crate::backend::ControlWriter;
use crate::config::MonitorConfig;
use crate::domain::{ActuatorKey, SensorKey, SensorReading};
use crate::error::ControlError;
use crate::history::HistoryBank;
use crate::inbound::InboundEvent;
use crate::toggle::{ActuatorState, Completion, OptimisticToggleController, WriteTicket};

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;

const COMMAND_QUEUE: usize = 64;

// ==============================================================================
// view - what readers see
// ==============================================================================

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct SensorCard {
    pub key: SensorKey,
    pub title: &'static str,
    pub unit: &'static str,
    /// latest value, none until the first reading arrives
    pub value: Option<f64>,
    pub display: Option<String>,
    pub status: Option<String>,
    pub alert: bool,
    /// rolling window, oldest first
    pub series: Vec<f64>,
    pub range: Option<(f64, f64)>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct MonitorView {
    pub sensors: Vec<SensorCard>,
    pub actuators: BTreeMap<ActuatorKey, ActuatorState>,
    /// last write failure, cleared by the next successful write
    pub notice: Option<String>,
    /// unix timestamp (ms) of the last render
    pub last_update: u64,
    /// readings folded in since start
    pub received: u64,
}

impl MonitorView {
    pub fn card(&self, key: SensorKey) -> Option<&SensorCard> {
        self.sensors.iter().find(|c| c.key == key)
    }

    /// displayed switch value
    pub fn switch(&self, key: ActuatorKey) -> Option<bool> {
        self.actuators.get(&key).map(|s| s.pending)
    }
}

pub type SharedView = Arc<RwLock<MonitorView>>;

// ==============================================================================
// commands
// ==============================================================================

enum Command {
    Inbound(InboundEvent),
    Toggle {
        key: ActuatorKey,
        value: bool,
        reply: oneshot::Sender<ActuatorState>,
    },
    WriteFinished {
        ticket: WriteTicket,
        result: Result<(), ControlError>,
    },
    /// answered once every earlier command has been applied and rendered
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub history_capacity: usize,
    pub write_timeout: Duration,
    pub show_sensor_data: bool,
}

impl SessionOptions {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            history_capacity: config.history.capacity,
            write_timeout: config.control.write_timeout(),
            show_sensor_data: config.logging.show_sensor_data,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

// ==============================================================================
// handle - clone-able entry point
// ==============================================================================

#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
    view: SharedView,
}

impl SessionHandle {
    /// Feed one push event into the session.
    pub async fn on_event(&self, event: InboundEvent) -> Result<()> {
        self.tx
            .send(Command::Inbound(event))
            .await
            .map_err(|_| anyhow!("session closed"))
    }

    /// Flip a switch optimistically and start the remote write.
    ///
    /// Returns as soon as the local state has changed; the write outcome
    /// shows up later in the view.
    pub async fn toggle(&self, key: ActuatorKey, value: bool) -> Result<ActuatorState> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Toggle { key, value, reply })
            .await
            .map_err(|_| anyhow!("session closed"))?;
        rx.await.map_err(|_| anyhow!("session closed"))
    }

    /// Wait until everything sent so far is visible in the view.
    pub async fn flush(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(reply))
            .await
            .map_err(|_| anyhow!("session closed"))?;
        rx.await.map_err(|_| anyhow!("session closed"))
    }

    pub fn view(&self) -> SharedView {
        self.view.clone()
    }

    pub async fn snapshot(&self) -> MonitorView {
        self.view.read().await.clone()
    }
}

// ==============================================================================
// session task
// ==============================================================================

struct Session<W> {
    history: HistoryBank,
    toggles: OptimisticToggleController,
    writer: Arc<W>,
    // weak so that dropping every handle ends the task
    completions: mpsc::WeakSender<Command>,
    view: SharedView,
    write_timeout: Duration,
    show_sensor_data: bool,
    received: u64,
    notice: Option<String>,
}

/// Start the session task.
pub fn spawn<W: ControlWriter>(
    writer: Arc<W>,
    options: SessionOptions,
) -> (SessionHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
    let view = SharedView::default();

    let session = Session {
        history: HistoryBank::new(options.history_capacity),
        toggles: OptimisticToggleController::default(),
        writer,
        completions: tx.downgrade(),
        view: view.clone(),
        write_timeout: options.write_timeout,
        show_sensor_data: options.show_sensor_data,
        received: 0,
        notice: None,
    };

    let task = tokio::spawn(session.run(rx));
    (SessionHandle { tx, view }, task)
}

impl<W: ControlWriter> Session<W> {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        self.publish().await;

        while let Some(cmd) = rx.recv().await {
            self.handle(cmd).await;
        }

        tracing::debug!("session closed");
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            // everything queued before it has already been published
            Command::Flush(reply) => {
                let _ = reply.send(());
                return;
            }
            Command::Inbound(event) => self.apply_event(event),
            Command::Toggle { key, value, reply } => {
                let ticket = self.toggles.set(key, value);
                tracing::info!(%key, value, "toggle requested");
                self.start_write(ticket);
                let _ = reply.send(self.toggles.state_of(key));
            }
            Command::WriteFinished { ticket, result } => self.finish_write(ticket, result),
        }
        self.publish().await;
    }

    fn apply_event(&mut self, event: InboundEvent) {
        let decoded = event.decode();

        for r in decoded.readings {
            self.received += 1;
            if self.show_sensor_data {
                tracing::info!(
                    "[{}] {} ({})",
                    r.sensor.title(),
                    r.sensor.format_value(r.value),
                    r.status
                );
            } else {
                tracing::debug!(sensor = %r.sensor, value = r.value, status = %r.status, "reading");
            }
            self.history.record(SensorReading {
                sensor: r.sensor,
                value: r.value,
                status: r.status,
                received_at: self.received,
            });
        }

        for (key, value) in decoded.actuators {
            if self.toggles.is_in_flight(key) {
                tracing::debug!(%key, value, "remote value noted, local write still in flight");
            }
            self.toggles.observe_remote(key, value);
        }
    }

    fn start_write(&self, ticket: WriteTicket) {
        let writer = self.writer.clone();
        let completions = self.completions.clone();
        let limit = self.write_timeout;

        tokio::spawn(async move {
            let write = writer.write(ticket.key, ticket.value);
            let result = match tokio::time::timeout(limit, write).await {
                Ok(result) => result,
                Err(_) => Err(ControlError::Timeout(limit)),
            };
            if let Some(tx) = completions.upgrade() {
                let _ = tx.send(Command::WriteFinished { ticket, result }).await;
            }
        });
    }

    fn finish_write(&mut self, ticket: WriteTicket, result: Result<(), ControlError>) {
        match self.toggles.complete(ticket, result) {
            Completion::Confirmed { key, value } => {
                tracing::info!(%key, value, "toggle confirmed");
                self.notice = None;
            }
            Completion::RolledBack { key, restored, error } => {
                tracing::warn!(%key, restored, "toggle failed, reverted: {}", error);
                self.notice = Some(format!("{} could not be switched: {}", key, error));
            }
            Completion::Stale { key } => {
                tracing::debug!(%key, "ignoring reply for superseded write");
            }
        }
    }

    async fn publish(&self) {
        let rendered = self.render();
        *self.view.write().await = rendered;
    }

    fn render(&self) -> MonitorView {
        let sensors = self
            .history
            .tracks()
            .map(|(key, track)| {
                let latest = track.latest.as_ref();
                SensorCard {
                    key,
                    title: key.title(),
                    unit: key.unit(),
                    value: latest.map(|r| r.value),
                    display: latest.map(|r| key.format_value(r.value)),
                    status: latest.map(|r| r.status.clone()),
                    alert: latest.is_some_and(SensorReading::is_alert),
                    series: track.buffer.snapshot(),
                    range: track.buffer.normalized_range(),
                }
            })
            .collect();

        let actuators = ActuatorKey::ALL
            .into_iter()
            .map(|key| (key, self.toggles.state_of(key)))
            .collect();

        MonitorView {
            sensors,
            actuators,
            notice: self.notice.clone(),
            last_update: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            received: self.received,
        }
    }
}
