use chrono::{DateTime, Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TrackerStatus {
    #[default]
    Idle,
    Tracking,
    Paused,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PauseReason {
    Idle,
    Locked,
    Popup,
    FocusLost,
}

/// The not-yet-persisted dwell time of the current attribution target.
///
/// Dwell time is `banked` plus whatever has elapsed since `started_at`.
/// `started_at` is `None` while paused, so a paused target accrues nothing.
/// Only whole seconds are ever persisted; the sub-second remainder of a flush
/// stays in `banked` so repeated flushes don't shed time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionTarget {
    pub domain: Option<String>,
    pub started_at: Option<DateTime<Local>>,
    pub banked: Duration,
    pub current_day: NaiveDate,
}

impl AttributionTarget {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            domain: None,
            started_at: None,
            banked: Duration::zero(),
            current_day: today,
        }
    }

    pub fn is_live(&self) -> bool {
        self.domain.is_some() && self.started_at.is_some()
    }

    /// Time since `started_at`. A clock that went backwards reads as zero.
    pub fn elapsed(&self, now: DateTime<Local>) -> Duration {
        self.started_at
            .map(|start| (now - start).max(Duration::zero()))
            .unwrap_or_else(Duration::zero)
    }

    pub fn dwell(&self, now: DateTime<Local>) -> Duration {
        self.banked + self.elapsed(now)
    }

    /// Whole seconds of dwell time, rounded down.
    pub fn dwell_secs(&self, now: DateTime<Local>) -> u64 {
        self.dwell(now).num_seconds().max(0) as u64
    }

    /// Whole seconds held while not accruing.
    pub fn accumulated_secs(&self) -> u64 {
        self.banked.num_seconds().max(0) as u64
    }

    /// Starts a tracking window for `domain` (or clears the target). Staying
    /// on the same domain keeps whatever dwell time is still unflushed.
    pub fn retarget(&mut self, domain: Option<String>, now: DateTime<Local>) {
        self.banked = if domain.is_some() && domain == self.domain {
            self.dwell(now)
        } else {
            Duration::zero()
        };
        self.started_at = domain.as_ref().map(|_| now);
        self.domain = domain;
        self.current_day = now.date_naive();
    }

    /// Folds the running window into `banked` and stops accrual.
    pub fn freeze(&mut self, now: DateTime<Local>) {
        if self.started_at.is_some() {
            self.banked = self.dwell(now);
            self.started_at = None;
        }
    }

    pub fn thaw(&mut self, now: DateTime<Local>) {
        if self.domain.is_some() && self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    /// Called after `flushed_secs` of the dwell time up to `now` have been
    /// persisted. The unflushed remainder carries over.
    pub fn mark_flushed(&mut self, flushed_secs: u64, now: DateTime<Local>) {
        let dwell = self.dwell(now);
        let flushed = i64::try_from(flushed_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(dwell);
        self.banked = (dwell - flushed).max(Duration::zero());
        if self.started_at.is_some() {
            self.started_at = Some(now);
        }
    }

    /// Moves the target into a new calendar day. Dwell time earned on the old
    /// day should have been flushed against it beforehand; anything that
    /// could not be carries into the new day.
    pub fn roll_to(&mut self, day: NaiveDate, now: DateTime<Local>) {
        self.banked = self.dwell(now);
        self.current_day = day;
        if self.started_at.is_some() {
            self.started_at = Some(now);
        }
    }

    pub fn clear(&mut self, today: NaiveDate) {
        *self = Self::new(today);
    }
}
