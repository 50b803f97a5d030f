pub mod monitor;

pub use monitor::{IdlePresenceMonitor, PresenceState, IDLE_THRESHOLD};
