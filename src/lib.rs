//! `soilwatch-monitor`: polling monitor for soil sensor readings.
//!
//! Polls the readings endpoint for one unit, keeps the latest reading set,
//! derives summary metrics and correlation results after every refresh, and
//! exports reports on demand. The binary wires these pieces to the terminal.
//!
//! Modules follow the Explicit Module Boundary Pattern (EMBP): each one talks
//! to its siblings through the re-exports here rather than reaching into
//! their internals.

pub mod config;
pub mod console;
pub mod correlation;
pub mod error;
pub mod export;
pub mod fetch;
pub mod identity;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod render;
pub mod scheduler;

pub use config::Config;
pub use correlation::{CorrelationEngine, CorrelationPanel};
pub use error::{ExportError, FetchError};
pub use fetch::{FetchStatus, HttpReadingsClient, ReadingsSource};
pub use metrics::{aggregate, MetricsSnapshot};
pub use models::{Reading, ReadingStatus, Window};
pub use monitor::{DashboardSnapshot, Monitor, RefreshOutcome};
pub use scheduler::Trigger;
