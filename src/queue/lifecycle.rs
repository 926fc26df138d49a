use std::sync::Arc;
use std::time::Duration;

use crate::domain::bakery_state::BakeryState;
use crate::domain::clock;
use crate::error::Result;
use crate::queue::operations::{spawn_journal, QueueEngine};

/// Inter-bread intervals outside this window are measurement noise (oven
/// pauses, double scans) and are dropped before recalibration.
const DIFF_WINDOW_S: (i64, i64) = (20, 80);
/// Recalibration only acts once this many clean samples accumulated.
const MIN_CLEAN_SAMPLES: usize = 15;

impl QueueEngine {
    /// Rebuilds one bakery's live state from the journal, read-through, in
    /// the startup order: constants, active reservations and their order,
    /// wait list, last ticket number, bread log, then the derived pieces
    /// (prep state, display flag).
    pub async fn initialize_bakery(&self, bakery_id: u32) -> Result<()> {
        let config = self.store.config(bakery_id)?.clone();
        let date = self.today();

        let mut state = config.fresh_state();

        // The scheduler's slot bookkeeping only lives in the snapshot; the
        // row tables cannot reproduce reserved-but-unused positions.
        if let Ok(Some(snapshot_json)) = self.journal.load_snapshot(bakery_id, date).await {
            if let Ok(previous) = serde_json::from_str::<BakeryState>(&snapshot_json) {
                state.queue = previous.queue;
                state.timeout_s = previous.timeout_s;
                state.last_bread_time = previous.last_bread_time;
                state.bread_time_diffs = previous.bread_time_diffs;
                state.upcoming_breads = previous.upcoming_breads;
            }
        }

        for customer in self.journal.today_customers(bakery_id, date).await? {
            match state.menu.reservation_from_requirements(&customer.breads) {
                Ok(reservation) => {
                    state.order.insert(customer.ticket_id);
                    state.reservations.insert(customer.ticket_id, reservation);
                }
                Err(e) => {
                    log::warn!("Skipping journaled customer {} of bakery {}: {}", customer.ticket_id, bakery_id, e);
                }
            }
        }

        for customer in self.journal.today_wait_list(bakery_id, date).await? {
            if let Ok(reservation) = state.menu.reservation_from_requirements(&customer.breads) {
                state.wait_list.insert(customer.ticket_id, reservation);
            }
        }

        for ticket_id in self.journal.today_upcoming_customers(bakery_id, date).await? {
            if state.reservations.contains_key(&ticket_id) {
                state.upcoming_customers.insert(ticket_id);
            }
        }

        let last_ticket = self.journal.last_ticket_id(bakery_id, date).await?;
        state.last_ticket = last_ticket;
        state.queue.next_number = state.queue.next_number.max(last_ticket + 1);

        for bread in self.journal.today_breads(bakery_id, date).await? {
            if !bread.consumed {
                state.ledger.append(bread.baked_at, bread.belongs_to);
            }
        }

        state.rebuild_prep_state();
        state.display_flag = state.ledger.is_empty();

        log::info!(
            "Initialized bakery {}: {} active tickets, {} wait-listed, {} breads, next number {}.",
            bakery_id,
            state.order.len(),
            state.wait_list.len(),
            state.ledger.records.len(),
            state.queue.next_number
        );

        return self.store.save(bakery_id, state).await;
    }

    /// Startup recovery across every configured bakery. A bakery that fails
    /// to initialize is logged and skipped; it will lazy-load on first use.
    pub async fn initialize_all(&self) {
        for bakery_id in self.bakery_ids() {
            if let Err(e) = self.initialize_bakery(bakery_id).await {
                log::error!("Failed to initialize bakery {}: {}", bakery_id, e);
            }
        }
    }

    /// Local-midnight reset: purge every per-bakery key, zero the additive
    /// timeout padding and rebuild from the (new, empty) journal day.
    pub async fn midnight_reset(&self) {
        for bakery_id in self.bakery_ids() {
            self.store.purge(bakery_id).await;

            if let Err(e) = self.initialize_bakery(bakery_id).await {
                log::error!("Midnight re-initialization of bakery {} failed: {}", bakery_id, e);
                continue;
            }
            if let Err(e) = self.reset_timeout(bakery_id).await {
                log::error!("Midnight timeout reset of bakery {} failed: {}", bakery_id, e);
            }
        }

        log::info!("Midnight reset completed for {} bakeries.", self.bakery_ids().len());
    }

    /// Runs the daily reset loop on the engine's fixed IANA timezone.
    pub fn spawn_midnight_scheduler(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = self.clone();

        tokio::spawn(async move {
            loop {
                let sleep_s = clock::seconds_until_midnight(&engine.clock, engine.tz).max(1);
                tokio::time::sleep(Duration::from_secs(sleep_s as u64 + 1)).await;

                log::info!("Local midnight reached; resetting per-day state.");
                engine.midnight_reset().await;
            }
        })
    }

    /// Adapts the menu's preparation times to the oven's observed pace.
    ///
    /// Consumes the inter-bread diff series; with enough clean samples the
    /// whole menu shifts by the gap between the observed and configured
    /// average, clamped to the plausible window.
    ///
    /// # Returns
    /// Returns the applied observed average, or `None` when the series was
    /// empty or too thin.
    pub async fn recalibrate_prep_times(&self, bakery_id: u32) -> Result<Option<i64>> {
        let applied = self
            .store
            .update_compound(bakery_id, |state| {
                if state.bread_time_diffs.is_empty() {
                    return Ok(None);
                }

                let clean: Vec<i64> = state.bread_time_diffs.iter().map(|&(_, diff)| diff).filter(|diff| (DIFF_WINDOW_S.0..=DIFF_WINDOW_S.1).contains(diff)).collect();

                let mut applied = None;
                if clean.len() >= MIN_CLEAN_SAMPLES {
                    let average_diff = clean.iter().sum::<i64>() / clean.len() as i64;
                    let delta = average_diff - state.menu.average_prep_s();

                    for prep in state.menu.prep_time_per_bread.values_mut() {
                        *prep = (*prep + delta).clamp(DIFF_WINDOW_S.0, DIFF_WINDOW_S.1);
                    }

                    applied = Some(average_diff);
                }

                // Consumed either way; stale intervals must not pile up.
                state.bread_time_diffs.clear();

                Ok(applied)
            })
            .await?;

        if let Some(average) = applied {
            log::info!("Bakery {}: preparation times recalibrated towards observed average {}s.", bakery_id, average);

            let journal = self.journal.clone();
            spawn_journal("record_prep_recalibration", move || {
                let journal = journal.clone();
                async move { journal.record_prep_recalibration(bakery_id, average).await }
            });
        }

        return Ok(applied);
    }
}
