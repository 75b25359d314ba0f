//! ==============================================================================
//! backend.rs - remote store abstraction
//! ==============================================================================
//!
//! purpose:
//!     the seam between the session and whatever hosts the sensor and control
//!     documents. the session only ever sees two traits:
//!     - PushSource: "give me the current documents as inbound events"
//!     - ControlWriter: "set this actuator child to this value"
//!
//! implementations:
//!     - RtdbClient: realtime-database style REST api (GET/PUT `<path>.json`)
//!     - MemoryBackend: in-process documents, for tests and `--offline` runs
//!
//! relationships:
//!     - used by: subscription.rs (PushSource), session.rs (ControlWriter)
//!     - uses: inbound.rs (wraps fetched trees into InboundEvent)
//!
//! ==============================================================================

use crate::config::BackendConfig;
use crate::domain::ActuatorKey;
use crate::error::ControlError;
use crate::inbound::InboundEvent;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub trait PushSource: Send + Sync + 'static {
    /// current state of the watched documents
    fn fetch(&self) -> impl Future<Output = Result<Vec<InboundEvent>>> + Send;
}

pub trait ControlWriter: Send + Sync + 'static {
    fn write(&self, key: ActuatorKey, value: bool)
        -> impl Future<Output = Result<(), ControlError>> + Send;
}

// ==============================================================================
// REST IMPLEMENTATION
// ==============================================================================

#[derive(Clone)]
pub struct RtdbClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    sensors_path: String,
    control_path: String,
}

impl RtdbClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            http,
            base_url: config.database_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone().filter(|t| !t.is_empty()),
            sensors_path: config.sensors_path.clone(),
            control_path: config.control_path.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_matches('/'))
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.query(&[("auth", token.as_str())]),
            None => builder,
        }
    }

    async fn get_tree(&self, path: &str) -> Result<Value> {
        let url = self.url(path);
        let resp = self
            .request(self.http.get(&url))
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GET {} returned {}: {}", url, status, body.trim());
        }
        resp.json::<Value>()
            .await
            .with_context(|| format!("GET {} returned invalid json", url))
    }
}

impl PushSource for RtdbClient {
    async fn fetch(&self) -> Result<Vec<InboundEvent>> {
        let sensors = self.get_tree(&self.sensors_path).await?;
        let control = self.get_tree(&self.control_path).await?;
        Ok(vec![
            InboundEvent::from_sensor_tree(sensors),
            InboundEvent::from_control_tree(control),
        ])
    }
}

impl ControlWriter for RtdbClient {
    async fn write(&self, key: ActuatorKey, value: bool) -> Result<(), ControlError> {
        let path = format!("{}/{}", self.control_path.trim_matches('/'), key.remote_key());
        let url = self.url(&path);
        let resp = self.request(self.http.put(&url)).json(&value).send().await?;

        let status = resp.status();
        if status.is_success() {
            tracing::debug!(%key, value, "control write acknowledged");
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(ControlError::Rejected(format!("{} {}", status, body.trim())))
        }
    }
}

// ==============================================================================
// IN-MEMORY IMPLEMENTATION
// ==============================================================================

/// How `MemoryBackend` answers control writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    Accept,
    Reject(String),
    /// never answers; exercises the write timeout
    Hang,
}

#[derive(Debug)]
struct MemoryDocs {
    sensors: Vec<Value>,
    control: Map<String, Value>,
    mode: WriteMode,
    writes: Vec<(ActuatorKey, bool)>,
}

/// Documents held in process. Accepted writes show up in the next fetch.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    docs: Arc<Mutex<MemoryDocs>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            docs: Arc::new(Mutex::new(MemoryDocs {
                sensors: Vec::new(),
                control: Map::new(),
                mode: WriteMode::Accept,
                writes: Vec::new(),
            })),
        }
    }

    /// Sample documents for running without a database.
    pub fn demo() -> Self {
        let backend = Self::new();
        backend.set_sensors(vec![
            serde_json::json!({"type": "temp", "value": 22.5, "status": "Normal"}),
            serde_json::json!({"type": "humi", "value": 61, "status": "Normal"}),
            serde_json::json!({"type": "water", "value": 78, "status": "Normal"}),
            serde_json::json!({"type": "ph", "value": 6.8, "status": "Alert"}),
            serde_json::json!({"type": "illum", "value": 850, "status": "Warning"}),
        ]);
        backend
    }

    pub fn set_sensors(&self, docs: Vec<Value>) {
        self.lock().sensors = docs;
    }

    pub fn set_control(&self, key: ActuatorKey, value: bool) {
        self.lock()
            .control
            .insert(key.remote_key().to_string(), Value::Bool(value));
    }

    pub fn set_write_mode(&self, mode: WriteMode) {
        self.lock().mode = mode;
    }

    /// Every write attempt, accepted or not, in arrival order.
    pub fn writes(&self) -> Vec<(ActuatorKey, bool)> {
        self.lock().writes.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryDocs> {
        // poisoning is harmless here, every update is a single assignment
        self.docs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PushSource for MemoryBackend {
    async fn fetch(&self) -> Result<Vec<InboundEvent>> {
        let (sensors, control) = {
            let docs = self.lock();
            (docs.sensors.clone(), docs.control.clone())
        };
        Ok(vec![
            InboundEvent::SensorDocuments(sensors),
            InboundEvent::ControlDocument(control),
        ])
    }
}

impl ControlWriter for MemoryBackend {
    async fn write(&self, key: ActuatorKey, value: bool) -> Result<(), ControlError> {
        let mode = {
            let mut docs = self.lock();
            docs.writes.push((key, value));
            if docs.mode == WriteMode::Accept {
                docs.control
                    .insert(key.remote_key().to_string(), Value::Bool(value));
            }
            docs.mode.clone()
        };

        match mode {
            WriteMode::Accept => Ok(()),
            WriteMode::Reject(reason) => Err(ControlError::Rejected(reason)),
            WriteMode::Hang => std::future::pending::<Result<(), ControlError>>().await,
        }
    }
}
