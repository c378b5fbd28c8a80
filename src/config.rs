//! Configuration loader for the `soilwatch-monitor` service.
//!
//! All runtime settings and their defaults are read here from environment
//! variables (with optional `.env` support provided by the caller), so no
//! other module calls `env::var` directly.
//!
use std::{env, path::PathBuf, time::Duration};

use anyhow::{anyhow, Result};

use crate::Window;

/// Parse an optional environment variable into `$ty`, with a default value.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional, non-empty string environment variable.
macro_rules! optional_env {
    ($var_name:expr) => {
        env::var($var_name).ok().filter(|v| !v.trim().is_empty())
    };
}

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8002";
pub const DEFAULT_RESOURCE: &str = "unity";
pub const DEFAULT_LOCAL_STORE: &str = "soilwatch-local.json";

/// Strongly typed application configuration.
///
/// Immutable after loading; one snapshot for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Readings API base URL.
    pub api_url: String,

    /// Path segment before `/monitoring/{id}`.
    pub api_resource: String,

    /// Period of the refresh timer.
    pub update_interval: Duration,

    /// Delay before the first refresh after start-up.
    pub initial_delay: Duration,

    /// Window selected at start-up.
    pub default_window: Window,

    /// Rows shown in the collapsed table.
    pub table_preview_rows: usize,

    /// Explicit unit id; first in the identity chain.
    pub unit_id: Option<String>,

    /// Persisted local key/value store (JSON object).
    pub local_store_path: PathBuf,

    /// Persisted session key/value store; empty in-memory store when unset.
    pub session_store_path: Option<PathBuf>,

    /// Where exported reports are written.
    pub export_dir: PathBuf,
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `SOIL_API_URL` – readings API base URL (default: `http://127.0.0.1:8002`)
/// - `SOIL_API_RESOURCE` – resource path segment (default: `unity`)
/// - `UPDATE_INTERVAL_SECS` – refresh period (default: 30)
/// - `INITIAL_DELAY_MS` – delay before the first refresh (default: 1000)
/// - `DEFAULT_WINDOW` – `1h`, `6h`, `24h` or `7d` (default: `24h`)
/// - `TABLE_PREVIEW_ROWS` – collapsed table size (default: 5)
/// - `SOILWATCH_UNIT_ID` – explicit unit id
/// - `LOCAL_STORE_PATH` – local store file (default: `soilwatch-local.json`)
/// - `SESSION_STORE_PATH` – session store file
/// - `EXPORT_DIR` – report directory (default: `.`)
///
/// Returns an error if any variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let api_url = optional_env!("SOIL_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let api_resource =
        optional_env!("SOIL_API_RESOURCE").unwrap_or_else(|| DEFAULT_RESOURCE.to_string());
    let update_interval_secs = parse_env!("UPDATE_INTERVAL_SECS", u64, 30);
    let initial_delay_ms = parse_env!("INITIAL_DELAY_MS", u64, 1000);
    let default_window = parse_env!("DEFAULT_WINDOW", Window, Window::default());
    let table_preview_rows = parse_env!("TABLE_PREVIEW_ROWS", usize, 5);

    if update_interval_secs == 0 {
        return Err(anyhow!("Invalid UPDATE_INTERVAL_SECS: must be greater than zero"));
    }

    Ok(Config {
        api_url,
        api_resource,
        update_interval: Duration::from_secs(update_interval_secs),
        initial_delay: Duration::from_millis(initial_delay_ms),
        default_window,
        table_preview_rows,
        unit_id: optional_env!("SOILWATCH_UNIT_ID"),
        local_store_path: optional_env!("LOCAL_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_STORE)),
        session_store_path: optional_env!("SESSION_STORE_PATH").map(PathBuf::from),
        export_dir: optional_env!("EXPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  SOIL_API_URL         : {}", self.api_url);
        tracing::info!("  SOIL_API_RESOURCE    : {}", self.api_resource);
        tracing::info!("  UPDATE_INTERVAL_SECS : {}", self.update_interval.as_secs());
        tracing::info!("  INITIAL_DELAY_MS     : {}", self.initial_delay.as_millis());
        tracing::info!("  DEFAULT_WINDOW       : {}", self.default_window);
        tracing::info!("  TABLE_PREVIEW_ROWS   : {}", self.table_preview_rows);
        tracing::info!(
            "  SOILWATCH_UNIT_ID    : {}",
            self.unit_id.as_deref().unwrap_or("(unset)")
        );
        tracing::info!("  LOCAL_STORE_PATH     : {}", self.local_store_path.display());
        tracing::info!(
            "  SESSION_STORE_PATH   : {}",
            self.session_store_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(in-memory)".to_string())
        );
        tracing::info!("  EXPORT_DIR           : {}", self.export_dir.display());
    }
}
