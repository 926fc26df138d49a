use chrono::NaiveDate;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

use crate::domain::bakery_state::{BakeryConfig, BakeryState};
use crate::domain::clock::{self, Clock};
use crate::error::{Error, Result};
use crate::store::journal::{self, Journal};

/// A loaded per-bakery state tagged with the local date it belongs to. The
/// tag is the TTL: a slot from yesterday is treated as expired.
#[derive(Debug)]
struct StoreSlot {
    date: NaiveDate,
    state: BakeryState,
}

/// Per-bakery compound state store.
///
/// Each bakery owns one `tokio::sync::Mutex` slot; holding it across a whole
/// read-modify-write IS the per-bakery serialization contract, so a compound
/// update commits every sub-key or none. The outer lock only guards the
/// registry map and is never held across an await.
#[derive(Debug)]
pub struct StateStore {
    entries: RwLock<HashMap<u32, Arc<Mutex<Option<StoreSlot>>>>>,
    configs: HashMap<u32, BakeryConfig>,
    journal: Arc<dyn Journal>,
    clock: Arc<dyn Clock>,
    tz: Tz,
}

impl StateStore {
    pub fn new(configs: Vec<BakeryConfig>, journal: Arc<dyn Journal>, clock: Arc<dyn Clock>, tz: Tz) -> StateStore {
        StateStore {
            entries: RwLock::new(HashMap::new()),
            configs: configs.into_iter().map(|c| (c.bakery_id, c)).collect(),
            journal,
            clock,
            tz,
        }
    }

    pub fn bakery_ids(&self) -> Vec<u32> {
        self.configs.keys().copied().collect()
    }

    pub fn config(&self, bakery_id: u32) -> Result<&BakeryConfig> {
        match self.configs.get(&bakery_id) {
            Some(config) if !config.menu.is_empty() => Ok(config),
            _ => Err(Error::BakeryNotFound(bakery_id)),
        }
    }

    pub fn today(&self) -> NaiveDate {
        clock::local_date(&self.clock, self.tz)
    }

    fn entry(&self, bakery_id: u32) -> Arc<Mutex<Option<StoreSlot>>> {
        if let Some(entry) = self.entries.read().expect("RwLock poisoned").get(&bakery_id) {
            return entry.clone();
        }

        let mut entries = self.entries.write().expect("RwLock poisoned");
        return entries.entry(bakery_id).or_insert_with(|| Arc::new(Mutex::new(None))).clone();
    }

    /// Restores a slot from today's journal snapshot, falling back to a
    /// fresh state seeded from the highest ticket id used today. Corrupted
    /// payloads never surface to the caller.
    async fn restore(&self, bakery_id: u32, today: NaiveDate) -> Result<StoreSlot> {
        let config = self.config(bakery_id)?;

        match self.journal.load_snapshot(bakery_id, today).await {
            Ok(Some(snapshot_json)) => match serde_json::from_str::<BakeryState>(&snapshot_json) {
                Ok(state) => {
                    log::info!("Rehydrated bakery {} from today's journal snapshot.", bakery_id);
                    return Ok(StoreSlot { date: today, state });
                }
                Err(e) => {
                    log::warn!("Corrupted snapshot for bakery {}: {}. Falling back to a fresh state.", bakery_id, e);
                }
            },
            Ok(None) => {}
            Err(e) => {
                log::warn!("Snapshot lookup failed for bakery {}: {}. Falling back to a fresh state.", bakery_id, e);
            }
        }

        let mut state = config.fresh_state();

        let last_ticket = self.journal.last_ticket_id(bakery_id, today).await.unwrap_or(0);
        state.last_ticket = last_ticket;
        state.queue.next_number = last_ticket + 1;

        return Ok(StoreSlot { date: today, state });
    }

    async fn ensure_loaded(&self, slot: &mut Option<StoreSlot>, bakery_id: u32) -> Result<()> {
        let today = self.today();

        let expired = match slot {
            Some(existing) => existing.date != today,
            None => true,
        };

        if expired {
            if slot.is_some() {
                log::info!("Per-day state of bakery {} expired at local midnight; reloading.", bakery_id);
            }
            *slot = Some(self.restore(bakery_id, today).await?);
        }

        return Ok(());
    }

    /// Schedules the idempotent snapshot upsert for a state that was just
    /// committed. Runs detached with bounded retries; the cache commit has
    /// already succeeded when this is called.
    fn schedule_snapshot(&self, bakery_id: u32, date: NaiveDate, state: &BakeryState) {
        let encoded = match serde_json::to_string(state) {
            Ok(encoded) => encoded,
            Err(e) => {
                log::error!("Failed to encode snapshot for bakery {}: {}", bakery_id, e);
                return;
            }
        };

        let journal = self.journal.clone();
        tokio::spawn(async move {
            let result = journal::with_retries("upsert_snapshot", || journal.upsert_snapshot(bakery_id, date, encoded.clone())).await;
            if let Err(e) = result {
                log::error!("Giving up on snapshot for bakery {}: {}", bakery_id, e);
            }
        });
    }

    /// Returns a consistent snapshot of the bakery's state.
    pub async fn load(&self, bakery_id: u32) -> Result<BakeryState> {
        let entry = self.entry(bakery_id);
        let mut guard = entry.lock().await;

        self.ensure_loaded(&mut guard, bakery_id).await?;
        return Ok(guard.as_ref().expect("slot loaded").state.clone());
    }

    /// Replaces the bakery's state wholesale and schedules the snapshot.
    pub async fn save(&self, bakery_id: u32, state: BakeryState) -> Result<()> {
        let entry = self.entry(bakery_id);
        let mut guard = entry.lock().await;

        let date = self.today();
        self.schedule_snapshot(bakery_id, date, &state);
        *guard = Some(StoreSlot { date, state });

        return Ok(());
    }

    /// Applies a read-modify-write closure under the bakery's lock.
    ///
    /// The closure runs on a working copy; when it fails nothing is
    /// committed and the journal is not touched.
    pub async fn update_compound<T>(&self, bakery_id: u32, f: impl FnOnce(&mut BakeryState) -> Result<T>) -> Result<T> {
        let entry = self.entry(bakery_id);
        let mut guard = entry.lock().await;

        self.ensure_loaded(&mut guard, bakery_id).await?;
        let slot = guard.as_mut().expect("slot loaded");

        let mut working = slot.state.clone();
        let value = f(&mut working)?;

        slot.state = working;
        self.schedule_snapshot(bakery_id, slot.date, &slot.state);

        return Ok(value);
    }

    /// Deletes all live keys of the bakery. Idempotent; the journal row
    /// stays untouched, so a following `load` restores from it.
    pub async fn purge(&self, bakery_id: u32) {
        let entry = self.entry(bakery_id);
        let mut guard = entry.lock().await;
        *guard = None;

        log::info!("Purged live state of bakery {}.", bakery_id);
    }
}
