pub mod site_stats;

pub use site_stats::{DailyDomainRecord, DayStats, SiteInfo};
