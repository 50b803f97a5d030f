use std::{sync::Arc, time::Duration};

use chrono::NaiveDate;
use log::{debug, error, info};
use serde::Serialize;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    badge::{BadgeSurface, PresenceScheduler, SchedulerConfig},
    clock::Clock,
    db::Database,
    host::BrowserHost,
    settings::SettingsStore,
};

use super::{
    domain::domain_from_url,
    state::{AttributionTarget, PauseReason, TrackerStatus},
};

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// How often a live target checks for a calendar-day change. Must stay
    /// well under a day so no boundary is skipped.
    pub rollover_check_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            rollover_check_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    pub status: TrackerStatus,
    pub domain: Option<String>,
    pub current_day: NaiveDate,
    pub dwell_seconds: u64,
    pub pause_reason: Option<PauseReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushKind {
    /// Time plus one session.
    Session,
    TimeOnly,
}

struct TrackerState {
    target: AttributionTarget,
    status: TrackerStatus,
    pause_reason: Option<PauseReason>,
    rollover: Option<JoinHandle<()>>,
    /// Identifies the current rollover checker; stale ones do nothing.
    epoch: u64,
}

struct TrackerInner {
    state: Mutex<TrackerState>,
    db: Database,
    badge: PresenceScheduler,
    clock: Arc<dyn Clock>,
    host: Arc<dyn BrowserHost>,
    settings: Arc<SettingsStore>,
    target_tx: watch::Sender<AttributionTarget>,
    config: TrackerConfig,
}

/// Decides which domain is receiving attention and moves its dwell time into
/// the aggregate store.
///
/// Every public operation holds the state lock for its whole duration, so
/// operations triggered by different event sources never interleave.
#[derive(Clone)]
pub struct AttributionTracker {
    inner: Arc<TrackerInner>,
}

impl AttributionTracker {
    pub fn new(
        db: Database,
        surface: Arc<dyn BadgeSurface>,
        clock: Arc<dyn Clock>,
        host: Arc<dyn BrowserHost>,
        settings: Arc<SettingsStore>,
        config: TrackerConfig,
        badge_config: SchedulerConfig,
    ) -> Self {
        let target = AttributionTarget::new(clock.today());
        let (target_tx, target_rx) = watch::channel(target.clone());
        let badge = PresenceScheduler::new(
            db.clone(),
            surface,
            clock.clone(),
            target_rx,
            badge_config,
        );

        Self {
            inner: Arc::new(TrackerInner {
                state: Mutex::new(TrackerState {
                    target,
                    status: TrackerStatus::Idle,
                    pause_reason: None,
                    rollover: None,
                    epoch: 0,
                }),
                db,
                badge,
                clock,
                host,
                settings,
                target_tx,
                config,
            }),
        }
    }

    pub fn badge(&self) -> &PresenceScheduler {
        &self.inner.badge
    }

    /// Billable domain for `url` under the current ignore list.
    pub fn resolve_domain(&self, url: Option<&str>) -> Option<String> {
        domain_from_url(url, &self.inner.settings.ignored_domains())
    }

    pub async fn current_domain(&self) -> Option<String> {
        self.inner.state.lock().await.target.domain.clone()
    }

    pub async fn status(&self) -> TrackerStatus {
        self.inner.state.lock().await.status
    }

    pub async fn current_dwell_seconds(&self) -> u64 {
        let state = self.inner.state.lock().await;
        state.target.dwell_secs(self.inner.clock.now())
    }

    pub async fn snapshot(&self) -> TrackerSnapshot {
        let state = self.inner.state.lock().await;
        TrackerSnapshot {
            status: state.status,
            domain: state.target.domain.clone(),
            current_day: state.target.current_day,
            dwell_seconds: state.target.dwell_secs(self.inner.clock.now()),
            pause_reason: state.pause_reason,
        }
    }

    /// Fully flushes the current target and starts a fresh window for the
    /// domain of `url`. Repeating the same domain still flushes and counts a
    /// session; the sub-second remainder carries into the new window.
    pub async fn set_target(&self, url: Option<&str>) {
        let domain = self.resolve_domain(url);
        let mut state = self.inner.state.lock().await;
        self.flush_locked(&mut state, FlushKind::Session).await;
        self.retarget_locked(&mut state, domain, url).await;
    }

    /// Flushes with a session increment. The only path that counts sessions.
    pub async fn record_session(&self) {
        let mut state = self.inner.state.lock().await;
        self.flush_locked(&mut state, FlushKind::Session).await;
    }

    pub async fn flush_time_only(&self) {
        let mut state = self.inner.state.lock().await;
        self.flush_locked(&mut state, FlushKind::TimeOnly).await;
    }

    /// Stops accrual, keeping the dwell time so far in memory.
    pub async fn pause(&self, reason: PauseReason) {
        let mut state = self.inner.state.lock().await;
        if state.status != TrackerStatus::Tracking {
            debug!("pause({reason:?}) ignored while {:?}", state.status);
            return;
        }

        self.stop_rollover(&mut state);
        state.target.freeze(self.inner.clock.now());
        state.status = TrackerStatus::Paused;
        state.pause_reason = Some(reason);
        self.publish_target(&state);
        self.inner.badge.pause().await;

        info!(
            "Tracking paused ({reason:?}) with {}s unflushed",
            state.target.accumulated_secs()
        );
    }

    pub async fn resume(&self) {
        let mut state = self.inner.state.lock().await;
        self.resume_locked(&mut state).await;
    }

    /// Resumes only a pause caused by `reason`, so one source can't undo
    /// another's pause.
    pub async fn resume_from(&self, reason: PauseReason) {
        let mut state = self.inner.state.lock().await;
        if state.pause_reason == Some(reason) {
            self.resume_locked(&mut state).await;
        }
    }

    /// Window focus left the browser: persist what we have and blank the
    /// indicator until focus returns.
    pub async fn release_focus(&self) {
        let mut state = self.inner.state.lock().await;
        if state.status != TrackerStatus::Tracking {
            return;
        }

        self.flush_locked(&mut state, FlushKind::TimeOnly).await;
        self.stop_rollover(&mut state);
        state.target.freeze(self.inner.clock.now());
        state.status = TrackerStatus::Paused;
        state.pause_reason = Some(PauseReason::FocusLost);
        self.publish_target(&state);
        self.inner.badge.clear().await;

        info!("Browser lost focus, tracking paused");
    }

    /// Browser window regained focus showing `url`. Pauses owned by idle,
    /// lock or popup handling are left alone.
    pub async fn regain_focus(&self, url: Option<&str>) {
        let domain = self.resolve_domain(url);
        let mut state = self.inner.state.lock().await;

        match (state.status, state.pause_reason) {
            (TrackerStatus::Idle, _) | (TrackerStatus::Paused, Some(PauseReason::FocusLost)) => {}
            (TrackerStatus::Tracking, _) => {
                if state.target.domain == domain {
                    return;
                }
            }
            (TrackerStatus::Paused, reason) => {
                debug!("Focus regained while paused ({reason:?}); leaving paused");
                return;
            }
        }

        if domain.is_some() && state.target.domain == domain {
            self.resume_locked(&mut state).await;
        } else {
            self.flush_locked(&mut state, FlushKind::Session).await;
            self.retarget_locked(&mut state, domain, url).await;
        }
    }

    /// Re-resolves the active tab after the popup closed: same domain resumes,
    /// anything else re-targets.
    pub async fn reconcile_active(&self, url: Option<&str>) {
        let domain = self.resolve_domain(url);
        let mut state = self.inner.state.lock().await;

        if domain.is_some() && state.target.domain == domain {
            if state.status == TrackerStatus::Paused {
                self.resume_locked(&mut state).await;
            }
        } else if state.target.domain != domain {
            self.flush_locked(&mut state, FlushKind::Session).await;
            self.retarget_locked(&mut state, domain, url).await;
        }
    }

    /// Runs one day-boundary check. Returns whether the day rolled over.
    pub async fn check_day_rollover(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        if state.status != TrackerStatus::Tracking {
            return false;
        }
        let rolled = self.roll_day_locked(&mut state).await;
        if rolled {
            self.inner.badge.start().await;
        }
        rolled
    }

    /// Derives the target from the host's active tab.
    pub async fn initialize(&self) {
        {
            let mut state = self.inner.state.lock().await;
            if state.status == TrackerStatus::Idle {
                state.target.current_day = self.inner.clock.today();
            }
        }

        match self.inner.host.active_tab_url().await {
            Ok(Some(url)) => self.set_target(Some(&url)).await,
            Ok(None) => info!("No active tab to track"),
            Err(err) => error!("Error during initialization: {err:#}"),
        }
    }

    /// Full flush, then cancels every timer and drops the target.
    pub async fn teardown(&self) {
        let mut state = self.inner.state.lock().await;
        self.flush_locked(&mut state, FlushKind::Session).await;
        self.stop_rollover(&mut state);
        self.inner.badge.clear().await;

        state.target.clear(self.inner.clock.today());
        state.status = TrackerStatus::Idle;
        state.pause_reason = None;
        self.publish_target(&state);

        info!("Tracker torn down");
    }

    pub async fn refresh_badge(&self) {
        self.inner.badge.refresh().await;
    }

    async fn retarget_locked(
        &self,
        state: &mut TrackerState,
        domain: Option<String>,
        url: Option<&str>,
    ) {
        self.stop_rollover(state);
        state.target.retarget(domain.clone(), self.inner.clock.now());
        state.pause_reason = None;
        self.publish_target(state);

        match domain {
            Some(domain) => {
                state.status = TrackerStatus::Tracking;
                self.inner.badge.start().await;
                self.spawn_rollover(state);
                info!("Now tracking {domain}");
            }
            None => {
                state.status = TrackerStatus::Idle;
                self.inner.badge.clear().await;
                info!("Not tracking {}: no billable domain", url.unwrap_or("<none>"));
            }
        }
    }

    async fn resume_locked(&self, state: &mut TrackerState) {
        if state.status != TrackerStatus::Paused {
            return;
        }
        let Some(domain) = state.target.domain.clone() else {
            return;
        };

        // Time held while paused belongs to the day it was earned on.
        self.roll_day_locked(state).await;

        state.target.thaw(self.inner.clock.now());
        state.status = TrackerStatus::Tracking;
        state.pause_reason = None;
        self.publish_target(state);
        self.inner.badge.resume().await;
        self.spawn_rollover(state);

        info!("Resumed tracking for {domain}");
    }

    /// Moves the target's dwell time into the store. On failure the time stays
    /// in memory for the next flush.
    async fn flush_locked(&self, state: &mut TrackerState, kind: FlushKind) -> bool {
        let Some(domain) = state.target.domain.clone() else {
            return false;
        };

        let now = self.inner.clock.now();
        let total = state.target.dwell_secs(now);
        if total == 0 {
            return false;
        }

        let day = state.target.current_day;
        let result = match kind {
            FlushKind::Session => self.inner.db.record_session(&domain, total, day).await,
            FlushKind::TimeOnly => self.inner.db.record_time_only(&domain, total, day).await,
        };

        match result {
            Ok(_) => {
                state.target.mark_flushed(total, now);
                self.publish_target(state);
                self.inner.badge.refresh().await;
                true
            }
            Err(err) => {
                error!("Failed to flush {total}s for {domain} on {day}: {err:#}");
                false
            }
        }
    }

    async fn roll_day_locked(&self, state: &mut TrackerState) -> bool {
        let today = self.inner.clock.today();
        if today == state.target.current_day {
            return false;
        }

        info!(
            "Date changed from {} to {}",
            state.target.current_day, today
        );
        self.flush_locked(state, FlushKind::TimeOnly).await;
        state.target.roll_to(today, self.inner.clock.now());
        self.publish_target(state);
        true
    }

    async fn rollover_tick(&self, epoch: u64) {
        let mut state = self.inner.state.lock().await;
        if state.epoch != epoch || state.status != TrackerStatus::Tracking {
            return;
        }
        if self.roll_day_locked(&mut state).await {
            self.inner.badge.start().await;
        }
    }

    fn spawn_rollover(&self, state: &mut TrackerState) {
        self.stop_rollover(state);

        let epoch = state.epoch;
        let period = self.inner.config.rollover_check_interval;
        let weak = Arc::downgrade(&self.inner);

        state.rollover = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                AttributionTracker { inner }.rollover_tick(epoch).await;
            }
        }));
    }

    fn stop_rollover(&self, state: &mut TrackerState) {
        state.epoch = state.epoch.wrapping_add(1);
        if let Some(handle) = state.rollover.take() {
            handle.abort();
        }
    }

    fn publish_target(&self, state: &TrackerState) {
        self.inner.target_tx.send_replace(state.target.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        badge::RecordingSurface,
        clock::ManualClock,
        host::ReportedHost,
    };
    use chrono::{Local, TimeZone};

    struct Harness {
        tracker: AttributionTracker,
        db: Database,
        clock: Arc<ManualClock>,
        host: Arc<ReportedHost>,
        surface: Arc<RecordingSurface>,
        settings: Arc<SettingsStore>,
        _dir: tempfile::TempDir,
    }

    fn harness_at(h: u32, m: u32, s: u32) -> Harness {
        harness_with(h, m, s, TrackerConfig::default())
    }

    fn harness_with(h: u32, m: u32, s: u32, config: TrackerConfig) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")).unwrap());
        let start = Local.with_ymd_and_hms(2026, 3, 1, h, m, s).single().unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let host = Arc::new(ReportedHost::default());
        let surface = Arc::new(RecordingSurface::default());
        let tracker = AttributionTracker::new(
            db.clone(),
            surface.clone(),
            clock.clone(),
            host.clone(),
            settings.clone(),
            config,
            SchedulerConfig::default(),
        );
        Harness {
            tracker,
            db,
            clock,
            host,
            surface,
            settings,
            _dir: dir,
        }
    }

    fn harness() -> Harness {
        harness_at(10, 0, 0)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[tokio::test]
    async fn set_target_tracks_http_domains_only() {
        let h = harness();

        h.tracker.set_target(Some("https://a.com/x")).await;
        assert_eq!(h.tracker.status().await, TrackerStatus::Tracking);
        assert_eq!(h.tracker.current_domain().await.as_deref(), Some("a.com"));

        h.tracker.set_target(Some("chrome://settings")).await;
        assert_eq!(h.tracker.status().await, TrackerStatus::Idle);
        assert_eq!(h.tracker.current_domain().await, None);
        assert_eq!(h.surface.last_text().as_deref(), Some(""));
    }

    #[tokio::test]
    async fn switching_targets_records_one_session_for_the_previous_domain() {
        let h = harness();

        h.tracker.set_target(Some("https://a.com/")).await;
        h.clock.advance_secs(40);
        h.tracker.set_target(Some("https://b.com/")).await;

        let stats = h.db.day_stats(day(1)).await.unwrap();
        assert_eq!(stats.record("a.com").time, 40);
        assert_eq!(stats.record("a.com").sessions, 1);
        assert_eq!(stats.record("b.com").sessions, 0);
        assert_eq!(h.tracker.current_dwell_seconds().await, 0);
    }

    #[tokio::test]
    async fn repeated_activation_of_same_domain_counts_each_time() {
        let h = harness();

        h.tracker.set_target(Some("https://a.com/1")).await;
        h.clock.advance_secs(10);
        h.tracker.set_target(Some("https://a.com/2")).await;
        h.clock.advance_secs(10);
        h.tracker.set_target(Some("https://a.com/3")).await;

        let record = h.db.day_stats(day(1)).await.unwrap().record("a.com");
        assert_eq!(record.time, 20);
        assert_eq!(record.sessions, 2);
    }

    #[tokio::test]
    async fn flush_time_only_never_counts_sessions() {
        let h = harness();

        h.tracker.set_target(Some("https://a.com/")).await;
        h.clock.advance_secs(15);
        h.tracker.flush_time_only().await;
        h.clock.advance_secs(5);
        h.tracker.flush_time_only().await;

        let record = h.db.day_stats(day(1)).await.unwrap().record("a.com");
        assert_eq!(record.time, 20);
        assert_eq!(record.sessions, 0);
    }

    #[tokio::test]
    async fn pause_excludes_the_gap() {
        let h = harness();

        h.tracker.set_target(Some("https://a.com/")).await;
        h.clock.advance_secs(200);
        h.tracker.pause(PauseReason::Idle).await;
        assert_eq!(h.tracker.current_dwell_seconds().await, 200);

        h.clock.advance_secs(50);
        assert_eq!(h.tracker.current_dwell_seconds().await, 200);

        h.tracker.resume().await;
        assert_eq!(h.tracker.current_dwell_seconds().await, 200);
        h.clock.advance_secs(5);
        assert_eq!(h.tracker.current_dwell_seconds().await, 205);
    }

    #[tokio::test]
    async fn resume_without_pause_is_a_no_op() {
        let h = harness();
        h.tracker.set_target(Some("https://a.com/")).await;
        h.clock.advance_secs(30);

        h.tracker.resume().await;

        assert_eq!(h.tracker.current_dwell_seconds().await, 30);
        assert_eq!(h.tracker.status().await, TrackerStatus::Tracking);
    }

    #[tokio::test]
    async fn day_rollover_splits_time_without_sessions() {
        let h = harness_at(23, 59, 0);

        h.tracker.set_target(Some("https://a.com/")).await;
        h.clock.advance_secs(45);
        assert!(!h.tracker.check_day_rollover().await);

        h.clock.advance_secs(30);
        assert!(h.tracker.check_day_rollover().await);
        h.clock.advance_secs(20);
        h.tracker.flush_time_only().await;

        let old = h.db.day_stats(day(1)).await.unwrap().record("a.com");
        let new = h.db.day_stats(day(2)).await.unwrap().record("a.com");
        assert_eq!(old.time, 75);
        assert_eq!(new.time, 20);
        assert_eq!(old.sessions + new.sessions, 0);
        assert_eq!(h.tracker.snapshot().await.current_day, day(2));
    }

    #[tokio::test]
    async fn paused_time_is_credited_to_the_day_it_was_earned() {
        let h = harness_at(23, 58, 0);

        h.tracker.set_target(Some("https://a.com/")).await;
        h.clock.advance_secs(60);
        h.tracker.pause(PauseReason::Idle).await;
        h.clock.advance_secs(3600);
        h.tracker.resume().await;
        h.clock.advance_secs(10);
        h.tracker.flush_time_only().await;

        assert_eq!(h.db.total_time("a.com", day(1)).await.unwrap(), 60);
        assert_eq!(h.db.total_time("a.com", day(2)).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn release_and_regain_focus() {
        let h = harness();

        h.tracker.set_target(Some("https://a.com/")).await;
        h.clock.advance_secs(30);
        h.tracker.release_focus().await;

        let snapshot = h.tracker.snapshot().await;
        assert_eq!(snapshot.status, TrackerStatus::Paused);
        assert_eq!(snapshot.pause_reason, Some(PauseReason::FocusLost));
        assert_eq!(h.surface.last_text().as_deref(), Some(""));
        assert_eq!(h.db.total_time("a.com", day(1)).await.unwrap(), 30);

        h.clock.advance_secs(100);
        h.tracker.regain_focus(Some("https://a.com/other")).await;
        assert_eq!(h.tracker.status().await, TrackerStatus::Tracking);
        h.clock.advance_secs(5);
        assert_eq!(h.tracker.current_dwell_seconds().await, 5);
    }

    #[tokio::test]
    async fn regain_focus_respects_idle_pause() {
        let h = harness();

        h.tracker.set_target(Some("https://a.com/")).await;
        h.tracker.pause(PauseReason::Idle).await;
        h.tracker.regain_focus(Some("https://b.com/")).await;

        let snapshot = h.tracker.snapshot().await;
        assert_eq!(snapshot.status, TrackerStatus::Paused);
        assert_eq!(snapshot.domain.as_deref(), Some("a.com"));
    }

    #[tokio::test]
    async fn reconcile_active_resumes_or_retargets() {
        let h = harness();

        h.tracker.set_target(Some("https://a.com/")).await;
        h.tracker.pause(PauseReason::Popup).await;
        h.tracker.reconcile_active(Some("https://a.com/")).await;
        assert_eq!(h.tracker.status().await, TrackerStatus::Tracking);

        h.tracker.pause(PauseReason::Popup).await;
        h.tracker.reconcile_active(Some("https://b.com/")).await;
        assert_eq!(h.tracker.current_domain().await.as_deref(), Some("b.com"));
        assert_eq!(h.tracker.status().await, TrackerStatus::Tracking);
    }

    #[tokio::test]
    async fn ignored_domains_are_not_billable() {
        let h = harness();
        h.settings.add_ignored_domain("example.com").unwrap();

        h.tracker.set_target(Some("https://docs.example.com/")).await;
        assert_eq!(h.tracker.status().await, TrackerStatus::Idle);
    }

    #[tokio::test]
    async fn initialize_uses_the_active_tab() {
        let h = harness();
        h.host.report_active_url(Some("https://a.com/".into()));

        h.tracker.initialize().await;

        assert_eq!(h.tracker.current_domain().await.as_deref(), Some("a.com"));
    }

    #[tokio::test]
    async fn teardown_flushes_and_goes_idle() {
        let h = harness();

        h.tracker.set_target(Some("https://a.com/")).await;
        h.clock.advance_secs(12);
        h.tracker.teardown().await;

        let record = h.db.day_stats(day(1)).await.unwrap().record("a.com");
        assert_eq!(record.time, 12);
        assert_eq!(record.sessions, 1);
        assert_eq!(h.tracker.status().await, TrackerStatus::Idle);
        assert!(!h.tracker.badge().snapshot().await.ticking);
        assert_eq!(h.surface.last_text().as_deref(), Some(""));
    }

    #[tokio::test]
    async fn badge_shows_persisted_plus_live() {
        let h = harness();
        h.db.record_time_only("a.com", 100, day(1)).await.unwrap();

        h.tracker.set_target(Some("https://a.com/")).await;
        h.clock.advance_secs(25);
        h.tracker.refresh_badge().await;

        assert_eq!(h.surface.last_text().as_deref(), Some("2m"));
        h.tracker.teardown().await;
    }

    fn after_midnight(secs: u32) -> chrono::DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, 0, 0, secs).single().unwrap()
    }

    #[tokio::test]
    async fn fractional_gaps_between_activations_are_not_lost() {
        let h = harness();

        h.tracker.set_target(Some("https://a.com/")).await;
        for _ in 0..11 {
            h.clock.advance_millis(1500);
            h.tracker.set_target(Some("https://a.com/")).await;
        }

        let record = h.db.day_stats(day(1)).await.unwrap().record("a.com");
        assert_eq!(record.time, 16);
        assert_eq!(record.sessions, 11);
    }

    #[tokio::test]
    async fn activations_under_a_second_apart_still_accrue() {
        let h = harness();

        h.tracker.set_target(Some("https://a.com/")).await;
        for _ in 0..10 {
            h.clock.advance_millis(400);
            h.tracker.set_target(Some("https://a.com/")).await;
        }
        h.tracker.flush_time_only().await;

        assert_eq!(h.db.total_time("a.com", day(1)).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn rollover_task_splits_time_at_midnight() {
        let h = harness_with(
            23,
            59,
            50,
            TrackerConfig {
                rollover_check_interval: Duration::from_millis(20),
            },
        );
        h.tracker.set_target(Some("https://a.com/")).await;

        h.clock.set(after_midnight(10));
        for _ in 0..100 {
            if h.tracker.snapshot().await.current_day == day(2) {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(h.tracker.snapshot().await.current_day, day(2));
        let old = h.db.day_stats(day(1)).await.unwrap().record("a.com");
        assert_eq!(old.time, 20);
        assert_eq!(old.sessions, 0);
        h.tracker.teardown().await;
    }

    #[tokio::test]
    async fn stale_rollover_tick_is_ignored() {
        let h = harness_with(
            23,
            59,
            50,
            TrackerConfig {
                rollover_check_interval: Duration::from_secs(3600),
            },
        );
        h.tracker.set_target(Some("https://a.com/")).await;
        let stale = h.tracker.inner.state.lock().await.epoch;

        h.tracker.set_target(Some("https://b.com/")).await;
        h.clock.set(after_midnight(10));
        h.tracker.rollover_tick(stale).await;

        assert_eq!(h.tracker.snapshot().await.current_day, day(1));
        assert_eq!(h.db.total_time("b.com", day(1)).await.unwrap(), 0);

        let live = h.tracker.inner.state.lock().await.epoch;
        h.tracker.rollover_tick(live).await;
        assert_eq!(h.tracker.snapshot().await.current_day, day(2));
        assert_eq!(h.db.total_time("b.com", day(1)).await.unwrap(), 20);
        h.tracker.teardown().await;
    }

    #[tokio::test]
    async fn failed_flush_keeps_time_for_the_next_one() {
        let h = harness();
        h.tracker.set_target(Some("https://a.com/")).await;
        h.clock.advance_secs(30);

        h.db.execute(|conn| {
            conn.execute_batch("ALTER TABLE site_stats RENAME TO site_stats_parked")?;
            Ok(())
        })
        .await
        .unwrap();
        h.tracker.flush_time_only().await;
        assert_eq!(h.tracker.current_dwell_seconds().await, 30);

        h.db.execute(|conn| {
            conn.execute_batch("ALTER TABLE site_stats_parked RENAME TO site_stats")?;
            Ok(())
        })
        .await
        .unwrap();
        h.clock.advance_secs(5);
        h.tracker.flush_time_only().await;

        assert_eq!(h.db.total_time("a.com", day(1)).await.unwrap(), 35);
        assert_eq!(h.tracker.current_dwell_seconds().await, 0);
        h.tracker.teardown().await;
    }
}
