use std::collections::BTreeSet;
use std::fs;

use crate::api::config_dto::EngineConfigDto;
use crate::error::{Error, Result};

/// Loads and validates the engine configuration file in one pass.
///
/// The file is JSON shaped like `api::config_dto::EngineConfigDto`. Read
/// failures surface as `Error::IoError` and malformed JSON as
/// `Error::DeserializationError`; a configuration no bakery could run with
/// is rejected as `InvalidRequest` before any engine state exists.
pub fn load_engine_config(file_path: &str) -> Result<EngineConfigDto> {
    let raw = fs::read_to_string(file_path)?;
    let config: EngineConfigDto = serde_json::from_str(&raw)?;

    if config.bakeries.is_empty() {
        return Err(Error::InvalidRequest("engine configuration declares no bakeries".to_string()));
    }

    let mut seen: BTreeSet<u32> = BTreeSet::new();
    for bakery in &config.bakeries {
        if !seen.insert(bakery.bakery_id) {
            return Err(Error::InvalidRequest(format!("bakery {} is configured twice", bakery.bakery_id)));
        }
        if bakery.prep_time_per_bread.is_empty() {
            return Err(Error::InvalidRequest(format!("bakery {} has an empty bread menu", bakery.bakery_id)));
        }
        if let Some(bread_id) = bakery.upcoming_breads.iter().find(|id| !bakery.prep_time_per_bread.contains_key(*id)) {
            return Err(Error::InvalidRequest(format!("bakery {} announces unknown bread type {}", bakery.bakery_id, bread_id)));
        }
    }

    Ok(config)
}
