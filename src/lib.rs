use std::sync::Arc;

use crate::domain::clock::{parse_tz, Clock, SystemClock};
use crate::error::Result;
use crate::loader::parser::load_engine_config;
use crate::queue::operations::QueueEngine;
use crate::store::journal::{FileJournal, Journal, MemoryJournal};

pub mod api;
pub mod domain;
pub mod loader;
pub mod logger;
pub mod error;
pub mod queue;
pub mod store;

/// Builds a ready-to-use queue engine from a JSON configuration file.
pub fn build_engine(file_path: &str) -> Result<Arc<QueueEngine>> {
    logger::init();
    log::info!("Logger initialized. Loading engine configuration.");

    let config = load_engine_config(file_path)?;
    log::info!("Configuration parsed: {} bakeries.", config.bakeries.len());

    let timezone = parse_tz(&config.timezone);
    let journal: Arc<dyn Journal> = match &config.journal_dir {
        Some(dir) => Arc::new(FileJournal::new(dir)),
        None => Arc::new(MemoryJournal::new()),
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let configs = config.bakeries.into_iter().map(|dto| dto.into_domain()).collect();
    let engine = Arc::new(QueueEngine::new(configs, journal, clock, timezone));

    log::info!("Queue engine constructed successfully.");

    Ok(engine)
}
