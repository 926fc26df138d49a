use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::bakery_state::BakeryConfig;
use crate::domain::reservation::BreadMenu;

fn default_timezone() -> String {
    "Asia/Tehran".to_string()
}

/// Top-level engine configuration as loaded from the JSON config file.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EngineConfigDto {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Directory for the file journal; omit to journal in memory only.
    pub journal_dir: Option<String>,
    pub bakeries: Vec<BakeryConfigDto>,
}

/// Per-bakery configuration block.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BakeryConfigDto {
    pub bakery_id: u32,
    /// `bread_type_id -> preparation seconds`; the ascending key order is
    /// the canonical bread ordering.
    pub prep_time_per_bread: BTreeMap<u32, i64>,
    pub baking_time_s: i64,
    #[serde(default)]
    pub timeout_s: i64,
    /// Bread types announced ahead of time, if any.
    #[serde(default)]
    pub upcoming_breads: BTreeSet<u32>,
}

impl BakeryConfigDto {
    pub fn into_domain(self) -> BakeryConfig {
        BakeryConfig {
            bakery_id: self.bakery_id,
            menu: BreadMenu::new(self.prep_time_per_bread),
            baking_time_s: self.baking_time_s,
            timeout_s: self.timeout_s,
            upcoming_breads: self.upcoming_breads,
        }
    }
}
