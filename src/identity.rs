//! Resolution of the unit identifier whose readings are fetched.
//!
//! Candidates are checked in a fixed order and the first usable one wins:
//!
//! 1. the in-process global (explicit override)
//! 2. local store, key `unityId`
//! 3. session store, key `unity_id`
//! 4. local store, key `unity_id` (placeholder values skipped)
//! 5. [`DEFAULT_UNIT_ID`]
//!
//! Empty strings count as absent.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

// ---

pub const DEFAULT_UNIT_ID: &str = "clienteekko3408";

const LOCAL_PRIMARY_KEY: &str = "unityId";
const SESSION_KEY: &str = "unity_id";
const LOCAL_LEGACY_KEY: &str = "unity_id";

/// Values under the legacy local key left behind by test setups.
const PLACEHOLDER_IDS: [&str; 2] = ["unity_default", "unity_test123"];

/// Read-only view of a persisted key/value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory store, used for the session store and in tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore(HashMap<String, String>);

impl MemoryStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

/// Store backed by a flat JSON object on disk.
///
/// Read on every lookup so edits made by other processes are picked up. A
/// missing file is an empty store; an unreadable one is logged and treated
/// the same way.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    // ---
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> HashMap<String, serde_json::Value> {
        // ---
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                tracing::warn!("Cannot read store {}: {}", self.path.display(), e);
                return HashMap::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!("Ignoring malformed store {}: {}", self.path.display(), e);
            HashMap::new()
        })
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        // ---
        match self.load().remove(key)? {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Where the resolved identifier came from; logged on every resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Global,
    LocalPrimary,
    Session,
    LocalLegacy,
    Default,
}

pub struct IdentityResolver {
    // ---
    global: Option<String>,
    local: Box<dyn KeyValueStore>,
    session: Box<dyn KeyValueStore>,
}

impl IdentityResolver {
    // ---
    pub fn new(
        global: Option<String>,
        local: Box<dyn KeyValueStore>,
        session: Box<dyn KeyValueStore>,
    ) -> Self {
        Self {
            global,
            local,
            session,
        }
    }

    /// Resolve the current unit identifier.
    pub fn resolve(&self) -> String {
        self.resolve_with_source().0
    }

    pub fn resolve_with_source(&self) -> (String, IdentitySource) {
        // ---
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());

        let candidates = [
            (non_empty(self.global.clone()), IdentitySource::Global),
            (non_empty(self.local.get(LOCAL_PRIMARY_KEY)), IdentitySource::LocalPrimary),
            (non_empty(self.session.get(SESSION_KEY)), IdentitySource::Session),
            (
                non_empty(self.local.get(LOCAL_LEGACY_KEY))
                    .filter(|id| !PLACEHOLDER_IDS.contains(&id.as_str())),
                IdentitySource::LocalLegacy,
            ),
        ];

        for (value, source) in candidates {
            if let Some(id) = value {
                tracing::debug!(?source, "Unit id resolved: {}", id);
                return (id, source);
            }
        }

        tracing::warn!("Unit id not found, falling back to {}", DEFAULT_UNIT_ID);
        (DEFAULT_UNIT_ID.to_string(), IdentitySource::Default)
    }
}
