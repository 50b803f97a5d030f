pub mod badge;
pub mod bridge;
pub mod clock;
pub mod db;
pub mod engine;
pub mod events;
pub mod host;
pub mod idle;
pub mod settings;
pub mod tracker;
mod utils;

use std::sync::Arc;

use anyhow::Result;
use badge::LogSurface;
use clock::SystemClock;
use engine::{Engine, EngineConfig};
use host::ReportedHost;

pub fn run() -> Result<()> {
    let config = EngineConfig::from_env();

    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::new()
        .filter_level(if config.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    log::info!("wyd starting up, data in {}", config.data_dir.display());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let host = Arc::new(ReportedHost::default());
        let engine = Engine::open(
            &config,
            host.clone(),
            Arc::new(LogSurface::default()),
            Arc::new(SystemClock),
        )?;

        engine.start().await;
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let result = bridge::pump_events(stdin, tokio::io::stdout(), &engine, &host).await;
        engine.shutdown().await;
        result
    })
}
