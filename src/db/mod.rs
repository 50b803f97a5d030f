//! Durable per-day, per-domain aggregate backed by SQLite.

mod connection;
mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use helpers::{date_key, parse_date_key};
pub use models::{DailyDomainRecord, DayStats, SiteInfo};
