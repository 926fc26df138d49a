use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::bread_ledger::BreadLedger;
use crate::domain::queue_state::QueueState;
use crate::domain::reservation::{BreadMenu, Reservation};

/// Immutable per-day configuration of one bakery.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BakeryConfig {
    pub bakery_id: u32,
    pub menu: BreadMenu,
    /// Seconds the oven needs after a bread is stamped before it leaves.
    pub baking_time_s: i64,
    /// Additive padding applied to in-queue wait predictions.
    pub timeout_s: i64,
    /// Bread types announced ahead of time; orders containing them are
    /// tracked as upcoming customers.
    #[serde(default)]
    pub upcoming_breads: BTreeSet<u32>,
}

impl BakeryConfig {
    pub fn fresh_state(&self) -> BakeryState {
        let mut state = BakeryState::new(self.bakery_id, self.menu.clone(), self.baking_time_s, self.timeout_s);
        state.upcoming_breads = self.upcoming_breads.clone();

        return state;
    }
}

/// Which ticket the oven is presently filling and how many breads are
/// already stamped to it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepState {
    pub current_ticket: u32,
    pub breads_made: i64,
}

/// The compound per-bakery state the store guards as one unit.
///
/// Every sub-key of the backing store (reservations, order, prep state,
/// bread ledger, wait list, served set, display flag, slot sets, counters)
/// lives here so a compound update commits all of them or none.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BakeryState {
    pub bakery_id: u32,
    pub menu: BreadMenu,
    pub baking_time_s: i64,
    pub timeout_s: i64,

    pub queue: QueueState,
    /// Active reservations, `ticket -> counts`.
    pub reservations: BTreeMap<u32, Reservation>,
    /// Active ticket numbers in serving order (ascending).
    pub order: BTreeSet<u32>,
    /// Highest ticket number ever handed out today.
    pub last_ticket: u32,

    pub prep_state: Option<PrepState>,
    pub ledger: BreadLedger,

    pub wait_list: BTreeMap<u32, Reservation>,
    pub served: BTreeSet<u32>,

    /// One-shot flag: set when the oven goes idle, consumed by the next
    /// new-ticket so only the first ticket after idle shows on the display.
    pub display_flag: bool,
    /// Head ticket last observed ready; reported to customers.
    pub user_current_ticket: Option<u32>,

    pub last_bread_time: Option<i64>,
    /// Consecutive inter-bread intervals keyed by bread index, consumed by
    /// the preparation-time recalibration job.
    pub bread_time_diffs: Vec<(u64, i64)>,

    /// Bread types currently announced ahead of time.
    #[serde(default)]
    pub upcoming_breads: BTreeSet<u32>,
    /// Tickets ordering an announced bread, in serving order.
    #[serde(default)]
    pub upcoming_customers: BTreeSet<u32>,
    /// The upcoming customer currently surfaced to the counter, with the
    /// timestamp its slot expires at.
    #[serde(default)]
    pub current_upcoming_customer: Option<(u32, i64)>,
}

/// What the oven display should show after a bread was stamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StampView {
    /// A ticket is (still) being filled; `next_customer` tells the hardware
    /// whether the view switched to a new ticket with this bread.
    Customer { customer_id: u32, next_customer: bool },
    /// Nobody is waiting. `belongs_to_customer` distinguishes "this bread
    /// completed the last order" from "this bread had no owner at all".
    Idle { belongs_to_customer: bool },
}

/// Outcome of stamping one bread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampResult {
    pub index: u64,
    pub cook_ready_at_ts: i64,
    pub belongs_to: Option<u32>,
    pub view: StampView,
}

impl BakeryState {
    pub fn new(bakery_id: u32, menu: BreadMenu, baking_time_s: i64, timeout_s: i64) -> BakeryState {
        BakeryState {
            bakery_id,
            menu,
            baking_time_s,
            timeout_s,
            queue: QueueState::new(),
            reservations: BTreeMap::new(),
            order: BTreeSet::new(),
            last_ticket: 0,
            prep_state: None,
            ledger: BreadLedger::new(),
            wait_list: BTreeMap::new(),
            served: BTreeSet::new(),
            display_flag: false,
            user_current_ticket: None,
            last_bread_time: None,
            bread_time_diffs: Vec::new(),
            upcoming_breads: BTreeSet::new(),
            upcoming_customers: BTreeSet::new(),
            current_upcoming_customer: None,
        }
    }

    /// Whether a reservation orders at least one announced bread type.
    pub fn orders_upcoming_bread(&self, reservation: &Reservation) -> bool {
        if self.upcoming_breads.is_empty() {
            return false;
        }

        self.menu
            .bread_ids()
            .iter()
            .zip(reservation.counts.iter())
            .any(|(bread_id, &count)| count > 0 && self.upcoming_breads.contains(bread_id))
    }

    /// Active ticket numbers in serving order.
    pub fn order_keys(&self) -> Vec<u32> {
        self.order.iter().copied().collect()
    }

    /// Lowest active ticket, the one the counter serves next.
    pub fn head_ticket(&self) -> Option<u32> {
        self.order.iter().next().copied()
    }

    fn needs_of(&self, ticket: u32) -> i64 {
        self.reservations.get(&ticket).map(|r| r.total()).unwrap_or(0)
    }

    /// First ticket in serving order whose stamped breads fall short of its
    /// reservation, given the supplied per-ticket counts.
    fn first_incomplete(&self, counts: &BTreeMap<u32, i64>) -> Option<u32> {
        for &ticket in &self.order {
            let made = counts.get(&ticket).copied().unwrap_or(0);
            if made < self.needs_of(ticket) {
                return Some(ticket);
            }
        }

        return None;
    }

    /// Stamps one bread leaving the oven onto the right ticket.
    ///
    /// The prep-state ticket is continued while it is still active and
    /// incomplete, so freshly inserted lower numbers cannot steal the oven
    /// mid-order. Otherwise the serving order is scanned from the front.
    /// Completing a ticket promotes the next incomplete one into the prep
    /// state and lifts the served cutoff to its number; completing the last
    /// one arms the one-shot display flag.
    pub fn stamp_bread(&mut self, now_s: i64) -> StampResult {
        let mut counts = self.ledger.counts_per_ticket();

        let mut working: Option<u32> = None;
        let mut breads_made: i64 = 0;
        let mut last_completed: Option<u32> = None;

        if let Some(prep) = self.prep_state {
            if self.order.contains(&prep.current_ticket) {
                let made = counts.get(&prep.current_ticket).copied().unwrap_or(0);
                if made < self.needs_of(prep.current_ticket) {
                    working = Some(prep.current_ticket);
                    breads_made = made;
                } else {
                    last_completed = Some(prep.current_ticket);
                }
            }
        }

        if working.is_none() {
            for &ticket in &self.order {
                let made = counts.get(&ticket).copied().unwrap_or(0);
                if made < self.needs_of(ticket) {
                    working = Some(ticket);
                    breads_made = made;
                    break;
                } else {
                    last_completed = Some(ticket);
                }
            }
        }

        if working.is_some() {
            breads_made += 1;
        }

        let cook_ready_at_ts = now_s + self.baking_time_s;
        let index = self.ledger.append(cook_ready_at_ts, working);

        if let Some(last) = self.last_bread_time {
            self.bread_time_diffs.push((index, now_s - last));
        }
        self.last_bread_time = Some(now_s);

        let view = match working {
            Some(ticket) => {
                if breads_made >= self.needs_of(ticket) {
                    counts.insert(ticket, breads_made);

                    // Scan from the front so tickets inserted below the one
                    // just finished are picked up next.
                    match self.first_incomplete(&counts) {
                        Some(next) => {
                            let made_of_next = counts.get(&next).copied().unwrap_or(0);
                            self.prep_state = Some(PrepState { current_ticket: next, breads_made: made_of_next });
                            self.queue.raise_current_served(next);

                            StampView::Customer { customer_id: next, next_customer: true }
                        }
                        None => {
                            self.prep_state = Some(PrepState { current_ticket: ticket, breads_made });
                            self.display_flag = true;

                            StampView::Idle { belongs_to_customer: true }
                        }
                    }
                } else {
                    self.prep_state = Some(PrepState { current_ticket: ticket, breads_made });

                    StampView::Customer { customer_id: ticket, next_customer: false }
                }
            }
            None => {
                match last_completed {
                    // Keep the finished order pinned so a restart does not
                    // hand the oven back to an already served customer.
                    Some(ticket) => self.prep_state = Some(PrepState { current_ticket: ticket, breads_made: self.needs_of(ticket) }),
                    None => self.prep_state = None,
                }

                StampView::Idle { belongs_to_customer: false }
            }
        };

        return StampResult { index, cook_ready_at_ts, belongs_to: working, view };
    }

    /// Recomputes the prep state from the serving order and the ledger.
    ///
    /// Used after restart recovery and after a ticket leaves the active
    /// order; the first incomplete ticket wins, and when everything is
    /// complete the last ticket is pinned at its full count.
    pub fn rebuild_prep_state(&mut self) {
        let counts = self.ledger.counts_per_ticket();

        if let Some(ticket) = self.first_incomplete(&counts) {
            self.prep_state = Some(PrepState { current_ticket: ticket, breads_made: counts.get(&ticket).copied().unwrap_or(0) });
            return;
        }

        match self.order.iter().next_back() {
            Some(&last) => self.prep_state = Some(PrepState { current_ticket: last, breads_made: self.needs_of(last) }),
            None => self.prep_state = None,
        }
    }

    /// Read-only view of the ticket the oven would work on right now.
    ///
    /// Prefers the owner of the most recently stamped bread while that
    /// ticket is still active, because after a hardware restart the breads
    /// *currently in play* matter, not the ticket that comes after the next
    /// bread. Falls back to the first incomplete ticket.
    pub fn working_ticket_preview(&self) -> Option<u32> {
        if let Some(last_owner) = self.ledger.records.iter().rev().find_map(|record| record.owner) {
            if self.reservations.contains_key(&last_owner) {
                return Some(last_owner);
            }
        }

        let counts = self.ledger.counts_per_ticket();
        return self.first_incomplete(&counts);
    }

    /// Consumes the one-shot display flag.
    pub fn take_display_flag(&mut self) -> bool {
        let flag = self.display_flag;
        self.display_flag = false;

        return flag;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu() -> BreadMenu {
        BreadMenu::new(BTreeMap::from([(1, 30)]))
    }

    fn state_with_tickets(tickets: &[(u32, i64)]) -> BakeryState {
        let mut state = BakeryState::new(1, menu(), 60, 0);
        for &(number, total) in tickets {
            state.reservations.insert(number, Reservation::new(vec![total]));
            state.order.insert(number);
            state.last_ticket = state.last_ticket.max(number);
        }

        return state;
    }

    #[test]
    fn breads_fill_the_head_ticket_first() {
        let mut state = state_with_tickets(&[(1, 2), (2, 1)]);

        let first = state.stamp_bread(1_000);
        assert_eq!(first.belongs_to, Some(1));
        assert_eq!(first.view, StampView::Customer { customer_id: 1, next_customer: false });
        assert_eq!(first.cook_ready_at_ts, 1_060);

        let second = state.stamp_bread(1_030);
        assert_eq!(second.belongs_to, Some(1));
        assert_eq!(second.view, StampView::Customer { customer_id: 2, next_customer: true }, "finishing ticket 1 must promote ticket 2");
        assert_eq!(state.prep_state, Some(PrepState { current_ticket: 2, breads_made: 0 }));
        assert_eq!(state.queue.current_served, 2, "served cutoff follows the promoted ticket");
    }

    #[test]
    fn prep_state_ticket_is_not_preempted_by_lower_insertions() {
        let mut state = state_with_tickets(&[(3, 2)]);
        state.stamp_bread(1_000);

        // Ticket 2 arrives below the in-progress ticket 3.
        state.reservations.insert(2, Reservation::new(vec![1]));
        state.order.insert(2);

        let result = state.stamp_bread(1_030);
        assert_eq!(result.belongs_to, Some(3), "the oven must finish the order it started");

        let result = state.stamp_bread(1_060);
        assert_eq!(result.belongs_to, Some(2), "the skipped lower ticket is picked up afterwards");
    }

    #[test]
    fn last_bread_arms_the_display_flag() {
        let mut state = state_with_tickets(&[(1, 1)]);

        let result = state.stamp_bread(1_000);
        assert_eq!(result.view, StampView::Idle { belongs_to_customer: true });
        assert!(state.display_flag);
        assert!(state.take_display_flag());
        assert!(!state.take_display_flag(), "the display flag is one-shot");
    }

    #[test]
    fn bread_without_any_customer_is_a_sentinel() {
        let mut state = state_with_tickets(&[]);

        let result = state.stamp_bread(1_000);
        assert_eq!(result.belongs_to, None);
        assert_eq!(result.view, StampView::Idle { belongs_to_customer: false });
        assert_eq!(state.ledger.records.len(), 1, "the sentinel record is kept for counting");
        assert_eq!(state.prep_state, None);
    }

    #[test]
    fn inter_bread_intervals_feed_the_diff_series() {
        let mut state = state_with_tickets(&[(1, 3)]);

        state.stamp_bread(1_000);
        state.stamp_bread(1_045);
        state.stamp_bread(1_090);

        assert_eq!(state.bread_time_diffs, vec![(2, 45), (3, 45)]);
        assert_eq!(state.last_bread_time, Some(1_090));
    }

    #[test]
    fn rebuild_pins_the_last_ticket_when_everything_is_complete() {
        let mut state = state_with_tickets(&[(1, 1), (2, 1)]);
        state.stamp_bread(1_000);
        state.stamp_bread(1_030);

        state.prep_state = None;
        state.rebuild_prep_state();

        assert_eq!(state.prep_state, Some(PrepState { current_ticket: 2, breads_made: 1 }));
    }

    #[test]
    fn preview_prefers_the_last_stamped_owner() {
        let mut state = state_with_tickets(&[(1, 2), (2, 1)]);
        state.stamp_bread(1_000);

        assert_eq!(state.working_ticket_preview(), Some(1));

        // Once ticket 1 leaves the active set the preview falls back to the
        // first incomplete ticket.
        state.order.remove(&1);
        state.reservations.remove(&1);
        assert_eq!(state.working_ticket_preview(), Some(2));
    }
}
