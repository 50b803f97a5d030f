use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Persisted counters for one (day, domain) pair.
///
/// `sessions` is a focus counter: it grows by one each time the domain stops
/// being the attribution target through a full attribution event, not per
/// continuous stretch of use.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyDomainRecord {
    pub time: u64,
    pub sessions: u64,
}

/// One calendar day of the aggregate, in the on-disk export layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayStats {
    #[serde(default)]
    pub time: BTreeMap<String, u64>,
    #[serde(default)]
    pub sessions: BTreeMap<String, u64>,
}

impl DayStats {
    pub fn record(&self, domain: &str) -> DailyDomainRecord {
        DailyDomainRecord {
            time: self.time.get(domain).copied().unwrap_or(0),
            sessions: self.sessions.get(domain).copied().unwrap_or(0),
        }
    }

    pub fn insert(&mut self, domain: String, record: DailyDomainRecord) {
        self.time.insert(domain.clone(), record.time);
        self.sessions.insert(domain, record.sessions);
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty() && self.sessions.is_empty()
    }
}

/// `YYYY-MM-DD` -> day stats. Serializes to the `siteInfo` JSON layout.
pub type SiteInfo = BTreeMap<String, DayStats>;
