use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    host::{BrowserHost, IdleState},
    settings::AppSettings,
    tracker::{AttributionTracker, PauseReason},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Inactivity after which the host reports the user as idle.
pub const IDLE_THRESHOLD: Duration = Duration::from_secs(300);

/// What the monitor last acted on. `Locked` dominates `Idle`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum PresenceState {
    #[default]
    Active,
    Idle,
    Locked,
}

struct MonitorState {
    presence: PresenceState,
    idle_tracking_enabled: bool,
}

/// Turns OS lock/idle/active signals into tracker pauses and resumes.
#[derive(Clone)]
pub struct IdlePresenceMonitor {
    state: Arc<Mutex<MonitorState>>,
    tracker: AttributionTracker,
    host: Arc<dyn BrowserHost>,
}

impl IdlePresenceMonitor {
    pub fn new(
        tracker: AttributionTracker,
        host: Arc<dyn BrowserHost>,
        idle_tracking_enabled: bool,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(MonitorState {
                presence: PresenceState::Active,
                idle_tracking_enabled,
            })),
            tracker,
            host,
        }
    }

    pub async fn presence(&self) -> PresenceState {
        self.state.lock().await.presence
    }

    pub async fn idle_tracking_enabled(&self) -> bool {
        self.state.lock().await.idle_tracking_enabled
    }

    /// Applies the host's current idle state. A failed query leaves the
    /// monitor `Active`.
    pub async fn initialize(&self) {
        match self.host.query_idle_state(IDLE_THRESHOLD).await {
            Ok(IdleState::Active) => {}
            Ok(state) => self.handle_signal(state).await,
            Err(err) => log_warn!("Failed to query initial idle state: {err:#}"),
        }
    }

    pub async fn handle_signal(&self, signal: IdleState) {
        let mut state = self.state.lock().await;

        match signal {
            IdleState::Locked => {
                if state.presence == PresenceState::Locked {
                    return;
                }
                log_info!("System locked, flushing and pausing");
                self.tracker.flush_time_only().await;
                self.tracker.pause(PauseReason::Locked).await;
                state.presence = PresenceState::Locked;
            }
            IdleState::Idle => {
                if !state.idle_tracking_enabled || state.presence != PresenceState::Active {
                    return;
                }
                log_info!("User idle, pausing");
                self.tracker.pause(PauseReason::Idle).await;
                state.presence = PresenceState::Idle;
            }
            IdleState::Active => {
                let previous = state.presence;
                state.presence = PresenceState::Active;
                match previous {
                    PresenceState::Locked => {
                        log_info!("System unlocked, re-initializing tracker");
                        self.tracker.initialize().await;
                    }
                    PresenceState::Idle => {
                        log_info!("User active again, resuming");
                        self.tracker.resume_from(PauseReason::Idle).await;
                    }
                    PresenceState::Active => {}
                }
            }
        }
    }

    /// Turning idle tracking off while idle resumes right away.
    pub async fn set_idle_tracking(&self, enabled: bool) {
        let mut state = self.state.lock().await;
        if state.idle_tracking_enabled == enabled {
            return;
        }
        state.idle_tracking_enabled = enabled;
        log_info!("Idle tracking {}", if enabled { "enabled" } else { "disabled" });

        if !enabled && state.presence == PresenceState::Idle {
            state.presence = PresenceState::Active;
            self.tracker.resume_from(PauseReason::Idle).await;
        }
    }

    /// Follows the idle preference until `cancel_token` fires or the settings
    /// store goes away.
    pub fn watch_preferences(
        &self,
        mut settings: watch::Receiver<AppSettings>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = settings.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let enabled = settings.borrow_and_update().idle_tracking_enabled;
                        monitor.set_idle_tracking(enabled).await;
                    }
                    _ = cancel_token.cancelled() => break,
                }
            }
        })
    }
}
