//! Sync progress persistence
//!
//! The cursor and the push registration are kept apart from the records so
//! that clearing or rebuilding the record store never loses them, and vice
//! versa.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::models::{DeviceState, SyncCursor};

/// Trait for cursor and device state persistence
///
/// Reads and writes are atomic: a reader sees either the old or the new
/// value, never a torn one.
pub trait CursorStore: Send + Sync {
    /// Get the cursor for an account
    fn load_cursor(&self, account_id: &str) -> Result<Option<SyncCursor>>;

    /// Save the cursor (upsert by account), returning the cursor now stored
    ///
    /// A stored cursor that is already further along is kept, so passes
    /// finishing out of order never move it backwards.
    fn save_cursor(&self, cursor: SyncCursor) -> Result<SyncCursor>;

    /// Forget the cursor so the next pass downloads a full snapshot
    fn clear_cursor(&self, account_id: &str) -> Result<()>;

    /// Get the push registration of this device
    fn load_device(&self) -> Result<Option<DeviceState>>;

    fn save_device(&self, device: DeviceState) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    cursors: BTreeMap<String, SyncCursor>,
    #[serde(default)]
    device: Option<DeviceState>,
}

/// In-memory cursor store
#[derive(Default)]
pub struct InMemoryCursorStore {
    state: RwLock<PersistedState>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CursorStore for InMemoryCursorStore {
    fn load_cursor(&self, account_id: &str) -> Result<Option<SyncCursor>> {
        Ok(self.state.read().cursors.get(account_id).cloned())
    }

    fn save_cursor(&self, cursor: SyncCursor) -> Result<SyncCursor> {
        let mut state = self.state.write();
        let stored = state.cursors.get(&cursor.account_id).cloned();
        let kept = cursor.merged(stored.as_ref());
        state.cursors.insert(kept.account_id.clone(), kept.clone());
        Ok(kept)
    }

    fn clear_cursor(&self, account_id: &str) -> Result<()> {
        self.state.write().cursors.remove(account_id);
        Ok(())
    }

    fn load_device(&self) -> Result<Option<DeviceState>> {
        Ok(self.state.read().device.clone())
    }

    fn save_device(&self, device: DeviceState) -> Result<()> {
        self.state.write().device = Some(device);
        Ok(())
    }
}

/// Cursor store backed by a single JSON file
///
/// Every write rewrites the whole file through a temp file and rename.
/// The mutex serializes read-modify-write cycles within this process.
pub struct FileCursorStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCursorStore {
    /// Default file name inside the config directory
    pub const FILE_NAME: &'static str = "sync-state.json";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store in the linksync config directory
    pub fn in_config_dir() -> Result<Self> {
        let dir = config::ensure_config_dir()?;
        Ok(Self::new(dir.join(Self::FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<PersistedState> {
        let state: Option<PersistedState> = config::load_json_file_opt(&self.path)
            .with_context(|| format!("Failed to read sync state from {:?}", self.path))?;
        Ok(state.unwrap_or_default())
    }

    fn update<T>(&self, change: impl FnOnce(&mut PersistedState) -> T) -> Result<T> {
        let _guard = self.lock.lock();
        let mut state = self.read()?;
        let result = change(&mut state);
        config::save_json_file(&self.path, &state)
            .with_context(|| format!("Failed to write sync state to {:?}", self.path))?;
        debug!("Saved sync state to {:?}", self.path);
        Ok(result)
    }
}

impl CursorStore for FileCursorStore {
    fn load_cursor(&self, account_id: &str) -> Result<Option<SyncCursor>> {
        Ok(self.read()?.cursors.remove(account_id))
    }

    fn save_cursor(&self, cursor: SyncCursor) -> Result<SyncCursor> {
        self.update(|state| {
            let stored = state.cursors.get(&cursor.account_id).cloned();
            let kept = cursor.merged(stored.as_ref());
            state.cursors.insert(kept.account_id.clone(), kept.clone());
            kept
        })
    }

    fn clear_cursor(&self, account_id: &str) -> Result<()> {
        self.update(|state| {
            state.cursors.remove(account_id);
        })
    }

    fn load_device(&self) -> Result<Option<DeviceState>> {
        Ok(self.read()?.device)
    }

    fn save_device(&self, device: DeviceState) -> Result<()> {
        self.update(|state| state.device = Some(device))
    }
}
