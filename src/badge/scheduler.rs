use std::{sync::Arc, time::Duration};

use anyhow::Result;
use serde::Serialize;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{clock::Clock, db::Database, tracker::AttributionTarget};

use super::{format::format_badge_text, surface::BadgeSurface};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const BADGE_COLOR: &str = "#4361ee";

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Tick period while the persisted total is under `slow_threshold_secs`.
    pub fast_interval: Duration,
    pub slow_interval: Duration,
    pub slow_threshold_secs: u64,
    /// Chance, per tick, of re-reading the persisted total to re-pick the
    /// interval.
    pub resample_probability: f64,
    pub color: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fast_interval: Duration::from_millis(1000),
            slow_interval: Duration::from_millis(5000),
            slow_threshold_secs: 60,
            resample_probability: 0.2,
            color: BADGE_COLOR.to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn interval_for(&self, persisted_total_secs: u64) -> Duration {
        if persisted_total_secs < self.slow_threshold_secs {
            self.fast_interval
        } else {
            self.slow_interval
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BadgeState {
    pub paused: bool,
    pub current_interval_ms: u64,
    pub ticking: bool,
}

#[derive(Default)]
struct BadgeInner {
    paused: bool,
    current_interval: Duration,
    ticker: Option<JoinHandle<()>>,
    /// Bumped whenever the ticker is replaced or stopped; a ticker whose
    /// epoch is stale exits on its next wake-up.
    epoch: u64,
}

impl BadgeInner {
    fn stop_ticker(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }
}

struct BadgeContext {
    db: Database,
    surface: Arc<dyn BadgeSurface>,
    clock: Arc<dyn Clock>,
    target: watch::Receiver<AttributionTarget>,
    config: SchedulerConfig,
}

impl BadgeContext {
    /// Text for persisted total + live dwell of the current target, or `None`
    /// when there is no target.
    async fn render(&self) -> Result<Option<String>> {
        let target = self.target.borrow().clone();
        let Some(domain) = target.domain.as_deref() else {
            return Ok(None);
        };

        let stored = self.db.total_time(domain, target.current_day).await?;
        let total = stored.saturating_add(target.dwell_secs(self.clock.now()));
        let text = format_badge_text(total);
        log_debug!("badge tick for {domain}: {total}s -> {text}");
        Ok(Some(text))
    }

    fn show(&self, text: Option<&str>) {
        match text {
            Some(text) => {
                self.surface.set_text(text);
                self.surface.set_color(&self.config.color);
            }
            None => self.surface.set_text(""),
        }
    }

    async fn publish(&self) -> Result<()> {
        let text = self.render().await?;
        self.show(text.as_deref());
        Ok(())
    }

    async fn desired_interval(&self) -> Result<Option<Duration>> {
        let target = self.target.borrow().clone();
        let Some(domain) = target.domain.as_deref() else {
            return Ok(None);
        };
        let stored = self.db.total_time(domain, target.current_day).await?;
        Ok(Some(self.config.interval_for(stored)))
    }
}

/// Drives the live dwell indicator.
///
/// Reads the attribution target from a watch channel owned by the tracker,
/// so it never needs the tracker's lock.
#[derive(Clone)]
pub struct PresenceScheduler {
    state: Arc<Mutex<BadgeInner>>,
    ctx: Arc<BadgeContext>,
}

impl PresenceScheduler {
    pub fn new(
        db: Database,
        surface: Arc<dyn BadgeSurface>,
        clock: Arc<dyn Clock>,
        target: watch::Receiver<AttributionTarget>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(BadgeInner::default())),
            ctx: Arc::new(BadgeContext {
                db,
                surface,
                clock,
                target,
                config,
            }),
        }
    }

    /// Publishes once, then ticks at the interval matching the persisted
    /// total. Any running ticker is replaced.
    pub async fn start(&self) {
        let mut guard = self.state.lock().await;
        guard.stop_ticker();
        guard.paused = false;

        if self.ctx.target.borrow().domain.is_none() {
            self.ctx.surface.set_text("");
            return;
        }

        if let Err(err) = self.ctx.publish().await {
            log_warn!("Failed to publish badge: {err:#}");
        }

        let interval = match self.ctx.desired_interval().await {
            Ok(Some(interval)) => interval,
            Ok(None) => return,
            Err(err) => {
                log_warn!("Failed to read persisted total, using fast badge interval: {err:#}");
                self.ctx.config.fast_interval
            }
        };

        log_info!(
            "Setting badge update frequency to {}ms",
            interval.as_millis()
        );

        guard.current_interval = interval;
        let epoch = guard.epoch;
        guard.ticker = Some(self.spawn_ticker(epoch, interval));
    }

    /// Stops ticking and leaves the indicator showing its last value.
    pub async fn pause(&self) {
        let mut guard = self.state.lock().await;
        guard.stop_ticker();
        guard.paused = true;
        log_info!("Badge updates paused");
    }

    pub async fn resume(&self) {
        self.start().await;
        log_info!("Badge updates resumed");
    }

    /// Blanks the indicator and stops ticking, paused or not.
    pub async fn clear(&self) {
        let mut guard = self.state.lock().await;
        guard.stop_ticker();
        guard.paused = false;
        self.ctx.surface.set_text("");
    }

    /// Republishes once without touching the ticker. A cleared indicator
    /// stays blank.
    pub async fn refresh(&self) {
        let guard = self.state.lock().await;
        if guard.ticker.is_none() && !guard.paused {
            return;
        }
        if let Err(err) = self.ctx.publish().await {
            log_warn!("Failed to refresh badge: {err:#}");
        }
    }

    pub async fn snapshot(&self) -> BadgeState {
        let guard = self.state.lock().await;
        BadgeState {
            paused: guard.paused,
            current_interval_ms: guard.current_interval.as_millis() as u64,
            ticking: guard.ticker.is_some(),
        }
    }

    fn spawn_ticker(&self, epoch: u64, initial: Duration) -> JoinHandle<()> {
        let state = self.state.clone();
        let ctx = self.ctx.clone();

        tokio::spawn(async move {
            let mut period = initial;
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                if !publish_if_current(&state, &ctx, epoch).await {
                    break;
                }

                let probability = ctx.config.resample_probability.clamp(0.0, 1.0);
                if rand::random::<f64>() >= probability {
                    continue;
                }

                let desired = match ctx.desired_interval().await {
                    Ok(Some(desired)) => desired,
                    Ok(None) => continue,
                    Err(err) => {
                        log_warn!("Badge interval re-check failed: {err:#}");
                        continue;
                    }
                };

                if desired == period {
                    continue;
                }

                let mut guard = state.lock().await;
                if guard.epoch != epoch || guard.paused {
                    break;
                }

                log_info!(
                    "Badge update frequency changed from {}ms to {}ms",
                    period.as_millis(),
                    desired.as_millis()
                );
                period = desired;
                guard.current_interval = desired;
                ticker = time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            }
        })
    }
}

/// Renders, then shows the result only if the ticker that asked is still the
/// live one. Returns `false` once it has been superseded, stopped or paused.
async fn publish_if_current(state: &Mutex<BadgeInner>, ctx: &BadgeContext, epoch: u64) -> bool {
    {
        let guard = state.lock().await;
        if guard.epoch != epoch || guard.paused {
            return false;
        }
    }

    let rendered = ctx.render().await;

    let guard = state.lock().await;
    if guard.epoch != epoch || guard.paused {
        return false;
    }
    match rendered {
        Ok(text) => ctx.show(text.as_deref()),
        Err(err) => log_warn!("Badge tick failed: {err:#}"),
    }
    drop(guard);
    true
}
