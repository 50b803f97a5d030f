use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::{engine::Engine, events::EngineEvent, host::ReportedHost};

/// Feeds newline-delimited JSON events from `reader` into `engine` until EOF,
/// which is treated as the system suspending. Replies are written to `writer`
/// one JSON object per line.
///
/// `host` answers the engine's active-tab queries with the last URL seen on
/// the stream.
pub async fn pump_events<R, W>(
    reader: R,
    mut writer: W,
    engine: &Engine,
    host: &Arc<ReportedHost>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: EngineEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(err) => {
                warn!("Skipping unparsable event on line {line_no}: {err}");
                continue;
            }
        };

        if let Some(url) = event.reported_url() {
            host.report_active_url(url.map(str::to_string));
        }
        if let EngineEvent::IdleSignal { state } = &event {
            host.report_idle_state(*state);
        }

        if let Some(reply) = engine.handle(event).await {
            let mut encoded = serde_json::to_vec(&reply)?;
            encoded.push(b'\n');
            writer.write_all(&encoded).await?;
            writer.flush().await?;
        }
    }

    info!("Event stream closed after {line_no} lines");
    engine.handle(EngineEvent::SystemSuspending).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        badge::RecordingSurface,
        clock::ManualClock,
        engine::EngineConfig,
        host::BrowserHost,
        tracker::TrackerStatus,
    };
    use chrono::{Local, NaiveDate, TimeZone};

    #[tokio::test]
    async fn pumps_events_and_flushes_on_eof() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            ..EngineConfig::default()
        };
        let host = Arc::new(ReportedHost::default());
        let start = Local.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).single().unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let engine = Engine::open(
            &config,
            host.clone(),
            Arc::new(RecordingSurface::default()),
            clock,
        )
        .unwrap();

        let input = concat!(
            "{\"type\":\"targetActivated\",\"url\":\"https://a.com/\"}\n",
            "not json\n",
            "\n",
            "{\"type\":\"targetActivated\",\"url\":\"https://b.com/\"}\n",
        );
        let mut output = Vec::new();
        pump_events(input.as_bytes(), &mut output, &engine, &host)
            .await
            .unwrap();
        assert!(output.is_empty());

        assert_eq!(
            host.active_tab_url().await.unwrap().as_deref(),
            Some("https://b.com/")
        );
        assert_eq!(engine.tracker().status().await, TrackerStatus::Idle);

        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let stats = engine.db().day_stats(day).await.unwrap();
        // Zero elapsed seconds on the manual clock: nothing to record.
        assert!(stats.is_empty());
    }

    #[tokio::test]
    async fn writes_replies_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            ..EngineConfig::default()
        };
        let host = Arc::new(ReportedHost::default());
        let start = Local.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).single().unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let engine = Engine::open(
            &config,
            host.clone(),
            Arc::new(RecordingSurface::default()),
            clock,
        )
        .unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        engine.db().record_session("a.com", 125, day).await.unwrap();

        let input = concat!(
            "{\"type\":\"exportRequested\"}\n",
            "{\"type\":\"clearData\",\"date\":\"2026-03-01\"}\n",
        );
        let mut output = Vec::new();
        pump_events(input.as_bytes(), &mut output, &engine, &host)
            .await
            .unwrap();

        let lines: Vec<serde_json::Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "export");
        assert_eq!(lines[0]["siteInfo"]["2026-03-01"]["time"]["a.com"], 125);
        assert_eq!(
            lines[1],
            serde_json::json!({ "type": "cleared", "date": "2026-03-01", "removed": 1 })
        );
        assert!(engine.db().site_info().await.unwrap().is_empty());
    }
}
