use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use log::info;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{
    connection::Database,
    helpers::{date_key, parse_date_key, to_i64, to_u64},
    models::{DailyDomainRecord, DayStats, SiteInfo},
};

/// Reads the current counters and writes back the incremented ones inside a
/// single transaction. Runs on the DB worker, so no other task can interleave.
fn apply_increment(
    conn: &mut Connection,
    day: &str,
    domain: &str,
    seconds: u64,
    sessions: u64,
) -> Result<DailyDomainRecord> {
    let tx = conn.transaction()?;

    let current: Option<(i64, i64)> = tx
        .query_row(
            "SELECT time_secs, sessions FROM site_stats WHERE day = ?1 AND domain = ?2",
            params![day, domain],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let previous = match current {
        Some((time, count)) => DailyDomainRecord {
            time: to_u64(time, "time_secs")?,
            sessions: to_u64(count, "sessions")?,
        },
        None => DailyDomainRecord::default(),
    };

    let updated = DailyDomainRecord {
        time: previous.time.saturating_add(seconds),
        sessions: previous.sessions.saturating_add(sessions),
    };

    tx.execute(
        "INSERT INTO site_stats (day, domain, time_secs, sessions, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(day, domain) DO UPDATE SET
             time_secs = excluded.time_secs,
             sessions = excluded.sessions,
             updated_at = excluded.updated_at",
        params![
            day,
            domain,
            to_i64(updated.time)?,
            to_i64(updated.sessions)?,
            Utc::now().to_rfc3339(),
        ],
    )?;

    tx.commit()?;
    Ok(updated)
}

impl Database {
    /// Adds `seconds` of dwell time and one session to `domain` on `date`.
    ///
    /// Returns `None` without touching the store when there is nothing to
    /// record (empty domain or zero seconds).
    pub async fn record_session(
        &self,
        domain: &str,
        seconds: u64,
        date: NaiveDate,
    ) -> Result<Option<DailyDomainRecord>> {
        self.increment(domain, seconds, date, 1).await
    }

    /// Adds `seconds` of dwell time to `domain` on `date` without counting a
    /// session.
    pub async fn record_time_only(
        &self,
        domain: &str,
        seconds: u64,
        date: NaiveDate,
    ) -> Result<Option<DailyDomainRecord>> {
        self.increment(domain, seconds, date, 0).await
    }

    async fn increment(
        &self,
        domain: &str,
        seconds: u64,
        date: NaiveDate,
        sessions: u64,
    ) -> Result<Option<DailyDomainRecord>> {
        if domain.is_empty() || seconds == 0 {
            return Ok(None);
        }

        let domain = domain.to_string();
        let day = date_key(date);
        let record = self
            .execute(move |conn| {
                let updated = apply_increment(conn, &day, &domain, seconds, sessions)
                    .with_context(|| format!("failed to update {domain} on {day}"))?;
                if sessions > 0 {
                    info!(
                        "Updated {domain}: +{seconds}s, sessions: {}",
                        updated.sessions
                    );
                } else {
                    info!(
                        "Updated time for {domain}: +{seconds}s (total: {}s)",
                        updated.time
                    );
                }
                Ok(updated)
            })
            .await?;

        Ok(Some(record))
    }

    /// Persisted seconds for `domain` on `date`, 0 when nothing is stored.
    pub async fn total_time(&self, domain: &str, date: NaiveDate) -> Result<u64> {
        if domain.is_empty() {
            return Ok(0);
        }

        let domain = domain.to_string();
        let day = date_key(date);
        self.execute(move |conn| {
            let time: Option<i64> = conn
                .query_row(
                    "SELECT time_secs FROM site_stats WHERE day = ?1 AND domain = ?2",
                    params![day, domain],
                    |row| row.get(0),
                )
                .optional()?;
            time.map(|t| to_u64(t, "time_secs"))
                .transpose()
                .map(|t| t.unwrap_or(0))
        })
        .await
    }

    pub async fn day_stats(&self, date: NaiveDate) -> Result<DayStats> {
        let day = date_key(date);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT domain, time_secs, sessions FROM site_stats WHERE day = ?1",
            )?;

            let mut rows = stmt.query(params![day])?;
            let mut stats = DayStats::default();
            while let Some(row) = rows.next()? {
                let domain: String = row.get(0)?;
                stats.insert(
                    domain,
                    DailyDomainRecord {
                        time: to_u64(row.get(1)?, "time_secs")?,
                        sessions: to_u64(row.get(2)?, "sessions")?,
                    },
                );
            }
            Ok(stats)
        })
        .await
    }

    /// The whole aggregate, keyed by day.
    pub async fn site_info(&self) -> Result<SiteInfo> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT day, domain, time_secs, sessions FROM site_stats ORDER BY day, domain",
            )?;

            let mut rows = stmt.query([])?;
            let mut info = SiteInfo::new();
            while let Some(row) = rows.next()? {
                let day: String = row.get(0)?;
                let domain: String = row.get(1)?;
                let record = DailyDomainRecord {
                    time: to_u64(row.get(2)?, "time_secs")?,
                    sessions: to_u64(row.get(3)?, "sessions")?,
                };
                info.entry(day).or_default().insert(domain, record);
            }
            Ok(info)
        })
        .await
    }

    pub async fn available_dates(&self) -> Result<Vec<NaiveDate>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT day FROM site_stats ORDER BY day")?;
            let mut rows = stmt.query([])?;
            let mut dates = Vec::new();
            while let Some(row) = rows.next()? {
                dates.push(parse_date_key(&row.get::<_, String>(0)?)?);
            }
            Ok(dates)
        })
        .await
    }

    /// Deletes one day bucket. Returns the number of domain rows removed.
    pub async fn clear_day(&self, date: NaiveDate) -> Result<usize> {
        let day = date_key(date);
        self.execute(move |conn| {
            let removed = conn.execute("DELETE FROM site_stats WHERE day = ?1", params![day])?;
            info!("Cleared {removed} records for {day}");
            Ok(removed)
        })
        .await
    }

    pub async fn clear_all(&self) -> Result<usize> {
        self.execute(|conn| {
            let removed = conn.execute("DELETE FROM site_stats", [])?;
            info!("Cleared all {removed} records");
            Ok(removed)
        })
        .await
    }
}
