use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One bread leaving the oven: when it is ready to hand over and which
/// ticket it was stamped to. `owner = None` marks a bread baked while no
/// ticket was incomplete; it is kept for counting but attached to nobody.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreadRecord {
    pub index: u64,
    pub cook_ready_at_ts: i64,
    pub owner: Option<u32>,
}

/// Ordered per-bakery sequence of today's baked breads, keyed by a strictly
/// increasing index that survives removals.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct BreadLedger {
    pub records: Vec<BreadRecord>,
    pub next_index: u64,
}

impl BreadLedger {
    pub fn new() -> BreadLedger {
        BreadLedger { records: Vec::new(), next_index: 1 }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends a record and returns its index.
    pub fn append(&mut self, cook_ready_at_ts: i64, owner: Option<u32>) -> u64 {
        let index = self.next_index;
        self.records.push(BreadRecord { index, cook_ready_at_ts, owner });
        self.next_index += 1;

        return index;
    }

    /// Breads already stamped per owning ticket. Sentinel records are skipped.
    pub fn counts_per_ticket(&self) -> BTreeMap<u32, i64> {
        let mut counts: BTreeMap<u32, i64> = BTreeMap::new();
        for record in &self.records {
            if let Some(owner) = record.owner {
                *counts.entry(owner).or_insert(0) += 1;
            }
        }

        return counts;
    }

    pub fn count_for(&self, ticket: u32) -> i64 {
        self.records.iter().filter(|record| record.owner == Some(ticket)).count() as i64
    }

    /// Cook-ready timestamp of the `n`-th bread stamped to the ticket
    /// (1-based, in stamping order).
    pub fn nth_ready_ts(&self, ticket: u32, n: i64) -> Option<i64> {
        if n < 1 {
            return None;
        }
        self.records.iter().filter(|record| record.owner == Some(ticket)).nth(n as usize - 1).map(|record| record.cook_ready_at_ts)
    }

    /// Owner of the most recently stamped non-sentinel bread.
    pub fn last_owner(&self) -> Option<u32> {
        self.records.iter().rev().find_map(|record| record.owner)
    }

    /// Highest ticket number any bread was ever stamped to today.
    pub fn max_owner(&self) -> Option<u32> {
        self.records.iter().filter_map(|record| record.owner).max()
    }

    /// Drops every record stamped to the ticket.
    ///
    /// # Returns
    /// Returns the number of removed records.
    pub fn consume_for(&mut self, ticket: u32) -> usize {
        let before = self.records.len();
        self.records.retain(|record| record.owner != Some(ticket));

        return before - self.records.len();
    }
}
