use std::{sync::Mutex, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// OS presence as reported by the host's idle detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum IdleState {
    Active,
    Idle,
    Locked,
}

/// Queries the engine makes back into the browser.
#[async_trait]
pub trait BrowserHost: Send + Sync {
    /// URL of the active tab in the focused window, if any.
    async fn active_tab_url(&self) -> Result<Option<String>>;

    async fn query_idle_state(&self, threshold: Duration) -> Result<IdleState>;
}

/// Host whose answers are whatever was last reported to it. Used by the
/// stdin bridge, where every event carries the URL it refers to.
#[derive(Debug)]
pub struct ReportedHost {
    active_url: Mutex<Option<String>>,
    idle_state: Mutex<IdleState>,
}

impl Default for ReportedHost {
    fn default() -> Self {
        Self {
            active_url: Mutex::new(None),
            idle_state: Mutex::new(IdleState::Active),
        }
    }
}

impl ReportedHost {
    pub fn report_active_url(&self, url: Option<String>) {
        let mut guard = match self.active_url.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = url;
    }

    pub fn report_idle_state(&self, state: IdleState) {
        let mut guard = match self.idle_state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = state;
    }
}

#[async_trait]
impl BrowserHost for ReportedHost {
    async fn active_tab_url(&self) -> Result<Option<String>> {
        let guard = match self.active_url.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(guard.clone())
    }

    async fn query_idle_state(&self, _threshold: Duration) -> Result<IdleState> {
        let guard = match self.idle_state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(*guard)
    }
}
