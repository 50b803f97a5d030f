use std::{env, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{error, info, warn};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    badge::{BadgeSurface, SchedulerConfig},
    clock::Clock,
    db::Database,
    events::{EngineEvent, EngineReply},
    host::BrowserHost,
    idle::IdlePresenceMonitor,
    settings::SettingsStore,
    tracker::{AttributionTracker, PauseReason, TrackerConfig},
};

const DATA_DIR_ENV: &str = "WYD_DATA_DIR";
const DEBUG_ENV: &str = "WYD_DEBUG";
const DEFAULT_DATA_DIR: &str = ".wyd";
const DB_FILE: &str = "wyd.sqlite3";
const SETTINGS_FILE: &str = "settings.json";
const DEBUG_ROLLOVER_CHECK: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub debug: bool,
    pub tracker: TrackerConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            debug: false,
            tracker: TrackerConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(dir) = env::var_os(DATA_DIR_ENV).filter(|dir| !dir.is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }

        config.debug = env::var(DEBUG_ENV)
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true"))
            .unwrap_or(false);
        if config.debug {
            config.tracker.rollover_check_interval = DEBUG_ROLLOVER_CHECK;
        }

        config
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }
}

/// Owns every component and routes inbound events to them in arrival order.
pub struct Engine {
    db: Database,
    settings: Arc<SettingsStore>,
    host: Arc<dyn BrowserHost>,
    tracker: AttributionTracker,
    idle: IdlePresenceMonitor,
    cancel_token: CancellationToken,
    preference_task: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn open(
        config: &EngineConfig,
        host: Arc<dyn BrowserHost>,
        surface: Arc<dyn BadgeSurface>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("Failed to create data dir {}", config.data_dir.display())
        })?;

        let db = Database::new(config.db_path())?;
        let settings = Arc::new(SettingsStore::new(config.settings_path())?);

        let tracker = AttributionTracker::new(
            db.clone(),
            surface,
            clock,
            host.clone(),
            settings.clone(),
            config.tracker.clone(),
            config.scheduler.clone(),
        );
        let idle = IdlePresenceMonitor::new(
            tracker.clone(),
            host.clone(),
            settings.idle_tracking_enabled(),
        );

        Ok(Self {
            db,
            settings,
            host,
            tracker,
            idle,
            cancel_token: CancellationToken::new(),
            preference_task: Mutex::new(None),
        })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn tracker(&self) -> &AttributionTracker {
        &self.tracker
    }

    pub fn idle(&self) -> &IdlePresenceMonitor {
        &self.idle
    }

    /// Derives the first target, applies the OS idle state and starts
    /// following the idle preference.
    pub async fn start(&self) {
        self.tracker.initialize().await;
        self.idle.initialize().await;

        let task = self
            .idle
            .watch_preferences(self.settings.subscribe(), self.cancel_token.clone());
        if let Some(previous) = self.preference_task.lock().await.replace(task) {
            previous.abort();
        }

        info!("Engine started");
    }

    /// Routes one event. Only `ExportRequested` and `ClearData` produce a
    /// reply; failures are logged and yield none.
    pub async fn handle(&self, event: EngineEvent) -> Option<EngineReply> {
        match event {
            EngineEvent::TargetActivated { url } => {
                self.tracker.set_target(url.as_deref()).await;
            }
            EngineEvent::TargetUrlChanged { url } => {
                let domain = self.tracker.resolve_domain(url.as_deref());
                if domain != self.tracker.current_domain().await {
                    self.tracker.set_target(url.as_deref()).await;
                }
            }
            EngineEvent::FocusLost => self.tracker.release_focus().await,
            EngineEvent::FocusGained { url } => {
                if let Some(url) = self.url_or_active_tab(url).await {
                    self.tracker.regain_focus(url.as_deref()).await;
                }
            }
            EngineEvent::PopupOpened => {
                self.tracker.flush_time_only().await;
                self.tracker.pause(PauseReason::Popup).await;
            }
            EngineEvent::PopupClosed { url } => {
                if let Some(url) = self.url_or_active_tab(url).await {
                    self.tracker.reconcile_active(url.as_deref()).await;
                }
            }
            EngineEvent::SystemSuspending => self.tracker.teardown().await,
            EngineEvent::SystemStarting => self.tracker.initialize().await,
            EngineEvent::IdleSignal { state } => self.idle.handle_signal(state).await,
            EngineEvent::PreferenceChanged {
                idle_tracking_enabled,
            } => {
                if let Err(err) = self
                    .settings
                    .set_idle_tracking_enabled(idle_tracking_enabled)
                {
                    error!("Failed to persist idle tracking preference: {err:#}");
                }
                self.idle.set_idle_tracking(idle_tracking_enabled).await;
            }
            EngineEvent::FlushRequested => self.tracker.flush_time_only().await,
            EngineEvent::SettingsChanged => match self.settings.reload() {
                Ok(()) => {
                    self.idle
                        .set_idle_tracking(self.settings.idle_tracking_enabled())
                        .await;
                    info!("Settings reloaded");
                }
                Err(err) => error!("Failed to reload settings: {err:#}"),
            },
            EngineEvent::ClearData { date } => return self.clear_data(date).await,
            EngineEvent::ExportRequested => return self.export().await,
        }
        None
    }

    async fn clear_data(&self, date: Option<NaiveDate>) -> Option<EngineReply> {
        let result = match date {
            Some(date) => self.db.clear_day(date).await,
            None => self.db.clear_all().await,
        };

        match result {
            Ok(removed) => {
                self.tracker.refresh_badge().await;
                Some(EngineReply::Cleared { date, removed })
            }
            Err(err) => {
                error!("Failed to clear stored data: {err:#}");
                None
            }
        }
    }

    async fn export(&self) -> Option<EngineReply> {
        let exported = async {
            let available_dates = self.db.available_dates().await?;
            let site_info = self.db.site_info().await?;
            anyhow::Ok(EngineReply::Export {
                available_dates,
                site_info,
            })
        };

        match exported.await {
            Ok(reply) => Some(reply),
            Err(err) => {
                error!("Failed to export stored data: {err:#}");
                None
            }
        }
    }

    /// Flushes everything and stops background tasks.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        if let Some(task) = self.preference_task.lock().await.take() {
            if let Err(err) = task.await {
                warn!("Preference watcher ended abnormally: {err}");
            }
        }
        self.tracker.teardown().await;
        info!("Engine stopped");
    }

    /// `None` when the host query failed; the event is dropped in that case.
    async fn url_or_active_tab(&self, url: Option<String>) -> Option<Option<String>> {
        if url.is_some() {
            return Some(url);
        }
        match self.host.active_tab_url().await {
            Ok(url) => Some(url),
            Err(err) => {
                error!("Failed to query active tab: {err:#}");
                None
            }
        }
    }
}
