mod api;
mod domain;

mod loader;
mod logger;
mod error;
mod queue;
mod store;

use std::sync::Arc;

use crate::domain::clock::{parse_tz, Clock, SystemClock};
use crate::loader::parser::load_engine_config;
use crate::queue::operations::QueueEngine;
use crate::store::journal::{FileJournal, Journal, MemoryJournal};

#[tokio::main]
async fn main() {
    logger::init();

    log::info!("Logger initialized. Starting the bakery queue engine.");

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config/bakeries.json".to_string());

    let config = match load_engine_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Could not load configuration from '{}': {}", config_path, e);
            return;
        }
    };

    let timezone = parse_tz(&config.timezone);
    let journal: Arc<dyn Journal> = match &config.journal_dir {
        Some(dir) => Arc::new(FileJournal::new(dir)),
        None => Arc::new(MemoryJournal::new()),
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let configs = config.bakeries.into_iter().map(|dto| dto.into_domain()).collect();
    let engine = Arc::new(QueueEngine::new(configs, journal, clock, timezone));

    engine.initialize_all().await;

    for bakery_id in engine.bakery_ids() {
        match engine.hardware_init(bakery_id).await {
            Ok(menu) => log::info!("Bakery {} ready with {} bread types.", bakery_id, menu.len()),
            Err(e) => log::error!("Bakery {} is not usable: {}", bakery_id, e),
        }
    }

    let scheduler = engine.spawn_midnight_scheduler();
    log::info!("Midnight scheduler running; engine is serving.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
    }

    scheduler.abort();
    log::info!("Shutting down.");
}
