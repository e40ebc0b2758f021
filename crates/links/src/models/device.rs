//! Push registration state of this device

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Push registration for this device
///
/// A registration is only valid for the app version that created it; a new
/// version registers again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub push_id: String,
    pub app_version: u32,
    pub registered_at: DateTime<Utc>,
}

impl DeviceState {
    pub fn new(push_id: impl Into<String>, app_version: u32) -> Self {
        Self {
            push_id: push_id.into(),
            app_version,
            registered_at: Utc::now(),
        }
    }

    pub fn is_valid_for(&self, app_version: u32) -> bool {
        !self.push_id.is_empty() && self.app_version == app_version
    }
}
