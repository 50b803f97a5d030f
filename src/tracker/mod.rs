pub mod controller;
pub mod domain;
pub mod state;

pub use controller::{AttributionTracker, TrackerConfig, TrackerSnapshot};
pub use domain::{domain_from_url, normalize_domain_input};
pub use state::{AttributionTarget, PauseReason, TrackerStatus};
