//! ==============================================================================
//! greenhouse-link - sensor mirror and actuator control core
//! ==============================================================================
//!
//! purpose:
//!     keeps a live, render-ready picture of a greenhouse whose sensors and
//!     switches live in a remote json database:
//!     - rolling per-sensor windows for sparklines (history.rs)
//!     - optimistic switches with rollback on failed writes (toggle.rs)
//!
//! data flow:
//!
//! ```text
//!     remote db ──fetch──► subscription ──InboundEvent──► session ──► MonitorView
//!         ▲                                                  │             │
//!         └──────────────── ControlWriter::write ◄───────────┘        server (json)
//!
//! ```
//! ==============================================================================

pub mod backend;
pub mod config;
pub mod domain;
pub mod error;
pub mod history;
pub mod inbound;
pub mod server;
pub mod session;
pub mod subscription;
pub mod toggle;

pub use domain::{ActuatorKey, SensorKey, SensorReading};
pub use error::ControlError;
pub use history::SensorHistoryBuffer;
pub use toggle::OptimisticToggleController;
