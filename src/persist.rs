//! Snapshot persistence for draft, archive, and active-session pointer.
//!
//! Storage failure is never allowed to interrupt a conversation: a failed
//! save is retried once, then the store flips to degraded and the engine
//! keeps running in memory only.

use crate::logging::emit_persistence_degraded;
use crate::types::{Message, Session};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub messages: Vec<Message>,
    pub archived_sessions: Vec<Session>,
    pub active_session_id: Option<String>,
}

pub struct StateStore {
    path: Option<PathBuf>,
    degraded: bool,
}

impl StateStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            degraded: false,
        }
    }

    /// In-memory-only store; every save is a no-op.
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Missing, unreadable, or corrupt state files all start the engine
    /// fresh rather than failing startup.
    pub fn load(&self) -> Option<EngineSnapshot> {
        let path = self.path.as_ref()?;
        let raw = fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn save(&mut self, snapshot: &EngineSnapshot) {
        let Some(path) = self.path.clone() else {
            return;
        };
        if self.degraded {
            return;
        }

        if write_snapshot(&path, snapshot).is_ok() {
            return;
        }
        // One retry covers transient contention; after that, degrade.
        if let Err(error) = write_snapshot(&path, snapshot) {
            self.degraded = true;
            emit_persistence_degraded(&path.display().to_string(), &error);
        }
    }
}

fn write_snapshot(path: &PathBuf, snapshot: &EngineSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create state directory {}", parent.display()))?;
        }
    }
    let serialized =
        serde_json::to_string_pretty(snapshot).context("Failed to serialize engine snapshot")?;
    fs::write(path, serialized).with_context(|| format!("Failed to write {}", path.display()))
}
