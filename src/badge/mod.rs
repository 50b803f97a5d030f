pub mod format;
pub mod scheduler;
pub mod surface;

pub use format::format_badge_text;
pub use scheduler::{BadgeState, PresenceScheduler, SchedulerConfig, BADGE_COLOR};
pub use surface::{BadgeSurface, LogSurface, RecordingSurface};
