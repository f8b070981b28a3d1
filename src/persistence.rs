//! Persistence layer for refreshed credentials
//!
//! The auth controller only needs "an object with get/set config". This
//! module defines that seam as [`ConfigStore`] and provides a JSON-file
//! backed implementation plus an in-memory one.

use crate::error::Result;
use crate::logging::get_logger;
use serde_json::{Map, Value};
use std::path::Path;

/// Key holding the bearer token
pub const TOKEN_KEY: &str = "token";
/// Key holding the token expiry as RFC 3339
pub const TOKEN_EXPIRY_KEY: &str = "token_expiry";

/// Key/value configuration store owned by the host
pub trait ConfigStore: Send {
    /// Read a value
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a value; implementations persist immediately
    fn set(&mut self, key: &str, value: Value) -> Result<()>;
}

/// File-backed store
pub struct PersistenceManager {
    file_path: String,
    state: Map<String, Value>,
    logger: crate::logging::StructuredLogger,
}

impl PersistenceManager {
    /// Create a new persistence manager
    pub fn new(file_path: &str) -> Self {
        let logger = get_logger("persistence");

        Self {
            file_path: file_path.to_string(),
            state: Map::new(),
            logger,
        }
    }

    /// Create and load in one step
    pub fn open(file_path: &str) -> Result<Self> {
        let mut mgr = Self::new(file_path);
        mgr.load()?;
        Ok(mgr)
    }

    /// Load state from disk
    pub fn load(&mut self) -> Result<()> {
        let path = Path::new(&self.file_path);

        if !path.exists() {
            self.logger
                .info("No persistent state file found, using defaults");
            return Ok(());
        }

        let contents = std::fs::read_to_string(path)?;
        self.state = match serde_json::from_str::<Value>(&contents)? {
            Value::Object(map) => map,
            _ => {
                self.logger
                    .warn("Persistent state is not a JSON object, ignoring it");
                Map::new()
            }
        };
        self.logger.info("Loaded persistent state from disk");

        Ok(())
    }

    /// Save state to disk
    pub fn save(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.state)?;
        std::fs::write(&self.file_path, contents)?;
        self.logger.debug("Saved persistent state to disk");

        Ok(())
    }
}

impl ConfigStore for PersistenceManager {
    fn get(&self, key: &str) -> Option<Value> {
        self.state.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.state.insert(key.to_string(), value);
        self.save()
    }
}

/// In-memory store for embedding and tests
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Map<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.state.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.state.insert(key.to_string(), value);
        Ok(())
    }
}
