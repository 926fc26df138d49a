use crate::domain::bakery_state::BakeryState;

/// Deterministic ready/not-ready decision for one ticket.
///
/// `precise` tells whether the estimate was derived from actual baked
/// timestamps (the ticket's own breads are all in the oven or out of it)
/// versus modelled from preparation times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyStatus {
    pub ready: bool,
    pub precise: bool,
    pub wait_s: Option<i64>,
}

impl ReadyStatus {
    fn modelled(wait_s: i64) -> ReadyStatus {
        ReadyStatus { ready: false, precise: false, wait_s: Some(wait_s) }
    }
}

/// Computes the readiness of `ticket` from live oven and queue state.
///
/// The decision tree, in order:
/// 1. nothing baked today at all: everything ahead of and including the
///    ticket still has to be prepared, plus one baking period;
/// 2. the oven runs but none of this ticket's breads exist: remaining work
///    of every ticket ahead (complete 0, partial `remaining * avg_prep`,
///    untouched its full preparation time) plus own preparation and baking;
/// 3. partially baked: remaining own breads at the average preparation time
///    of the bread types actually ordered, plus baking;
/// 4. fully baked: compare `now` against the cook-ready timestamp of the
///    last bread stamped to the ticket.
pub fn calculate_ready_status(state: &BakeryState, ticket: u32, now_s: i64) -> ReadyStatus {
    let menu = &state.menu;
    let reservation = match state.reservations.get(&ticket) {
        Some(reservation) => reservation,
        None => return ReadyStatus::modelled(state.baking_time_s),
    };

    let bread_count = reservation.total();
    let breads_made = state.ledger.count_for(ticket);

    if state.ledger.is_empty() {
        let ahead: i64 = state
            .order
            .iter()
            .filter(|&&k| k <= ticket)
            .filter_map(|k| state.reservations.get(k))
            .map(|r| menu.prep_time(r))
            .sum();

        return ReadyStatus::modelled(state.baking_time_s + ahead);
    }

    if breads_made == 0 {
        let counts = state.ledger.counts_per_ticket();
        let avg_prep = menu.average_prep_s();

        let mut wait = 0;
        for &k in state.order.iter().filter(|&&k| k < ticket) {
            let Some(res_k) = state.reservations.get(&k) else { continue };
            let total = res_k.total();
            let made = counts.get(&k).copied().unwrap_or(0);

            if made >= total {
                continue;
            } else if made > 0 {
                wait += (total - made) * avg_prep;
            } else {
                wait += menu.prep_time(res_k);
            }
        }

        return ReadyStatus::modelled(wait + menu.prep_time(reservation) + state.baking_time_s);
    }

    if breads_made < bread_count {
        let avg_self = menu.average_prep_for(reservation);
        return ReadyStatus::modelled((bread_count - breads_made) * avg_self + state.baking_time_s);
    }

    // All of the ticket's breads are stamped; the last cook-ready timestamp
    // decides, precisely.
    let last_ts = state.ledger.nth_ready_ts(ticket, bread_count).unwrap_or(now_s);
    if now_s >= last_ts {
        return ReadyStatus { ready: true, precise: true, wait_s: None };
    }

    return ReadyStatus { ready: false, precise: true, wait_s: Some(last_ts - now_s) };
}

/// Cumulative preparation seconds of every active ticket up to and including
/// `ticket`, padded with the bakery's additive timeout. Reported to waiting
/// customers as their in-queue time.
pub fn in_queue_customers_time(state: &BakeryState, ticket: u32) -> i64 {
    let base: i64 = state
        .order
        .iter()
        .filter(|&&k| k <= ticket)
        .filter_map(|k| state.reservations.get(k))
        .map(|r| state.menu.prep_time(r))
        .sum();

    return base + state.timeout_s;
}

/// Counts consecutive pairs of active tickets at or before `ticket` whose
/// totals are both 1 (empty-empty) or both above 1 (full-full). These pairs
/// forecast idle oven gaps.
pub fn empty_slot_pairs(state: &BakeryState, ticket: u32) -> i64 {
    let keys = state.order_keys();
    if keys.is_empty() {
        return 0;
    }

    let total_of = |k: u32| state.reservations.get(&k).map(|r| r.total()).unwrap_or(0);

    let mut pairs = 0;
    let mut prev_sum = total_of(keys[0]);

    for &key in &keys[1..] {
        let curr_sum = total_of(key);

        if key <= ticket {
            if prev_sum == 1 && curr_sum == 1 {
                pairs += 1;
            }
            if prev_sum > 1 && curr_sum > 1 {
                pairs += 1;
            }
        }

        prev_sum = curr_sum;
    }

    return pairs;
}

/// Idle-gap padding in seconds: pair count times the slowest bread on the
/// menu, clamped to five minutes.
pub fn empty_slot_padding_s(state: &BakeryState, ticket: u32) -> i64 {
    (empty_slot_pairs(state, ticket) * state.menu.max_prep_s()).min(300)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::reservation::{BreadMenu, Reservation};
    use std::collections::BTreeMap;

    fn state() -> BakeryState {
        BakeryState::new(1, BreadMenu::new(BTreeMap::from([(1, 60), (2, 80), (3, 20)])), 600, 0)
    }

    fn add_ticket(state: &mut BakeryState, number: u32, counts: Vec<i64>) {
        state.reservations.insert(number, Reservation::new(counts));
        state.order.insert(number);
    }

    #[test]
    fn empty_log_models_everything_ahead() {
        let mut state = state();
        add_ticket(&mut state, 1, vec![1, 0, 0]); // 60
        add_ticket(&mut state, 2, vec![0, 2, 0]); // 160
        add_ticket(&mut state, 3, vec![0, 0, 1]); // behind, must not count

        let status = calculate_ready_status(&state, 2, 10_000);
        assert_eq!(status, ReadyStatus { ready: false, precise: false, wait_s: Some(600 + 60 + 160) });
    }

    #[test]
    fn untouched_ticket_sums_remainders_of_tickets_ahead() {
        let mut state = state();
        add_ticket(&mut state, 1, vec![1, 0, 0]); // complete below
        add_ticket(&mut state, 2, vec![0, 2, 0]); // partial: 1 of 2 made
        add_ticket(&mut state, 3, vec![0, 0, 1]); // target, untouched

        state.ledger.append(10_000, Some(1));
        state.ledger.append(10_030, Some(2));

        // avg_prep = (60+80+20)/3 = 53; ticket 1 contributes 0, ticket 2
        // contributes (2-1)*53, the target adds its own 20 plus baking.
        let status = calculate_ready_status(&state, 3, 10_000);
        assert_eq!(status, ReadyStatus { ready: false, precise: false, wait_s: Some(53 + 20 + 600) });
    }

    #[test]
    fn partially_baked_ticket_uses_its_own_average() {
        let mut state = state();
        add_ticket(&mut state, 1, vec![0, 2, 2]); // ordered types 2 and 3: avg (80+20)/2 = 50

        state.ledger.append(10_000, Some(1));

        let status = calculate_ready_status(&state, 1, 10_000);
        assert_eq!(status, ReadyStatus { ready: false, precise: false, wait_s: Some(3 * 50 + 600) });
    }

    #[test]
    fn fully_baked_ticket_is_precise() {
        let mut state = state();
        add_ticket(&mut state, 1, vec![1, 0, 0]);

        state.ledger.append(10_600, Some(1));

        let waiting = calculate_ready_status(&state, 1, 10_400);
        assert_eq!(waiting, ReadyStatus { ready: false, precise: true, wait_s: Some(200) });

        let ready = calculate_ready_status(&state, 1, 10_600);
        assert_eq!(ready, ReadyStatus { ready: true, precise: true, wait_s: None });
    }

    #[test]
    fn extra_completed_bread_never_increases_the_wait() {
        let mut state = state();
        add_ticket(&mut state, 1, vec![0, 3, 0]);

        let mut previous = calculate_ready_status(&state, 1, 10_000).wait_s.unwrap();
        for i in 0..3 {
            state.ledger.append(10_000 + i * 10, Some(1));
            let status = calculate_ready_status(&state, 1, 10_000);
            let wait = status.wait_s.unwrap_or(0);

            assert!(wait <= previous, "wait grew from {} to {} after bread {}", previous, wait, i + 1);
            previous = wait;
        }
    }

    #[test]
    fn empty_slot_padding_counts_pairs_and_clamps() {
        let mut state = state();
        // Three adjacent singles -> two empty-empty pairs; then two multis
        // -> one full-full pair; ticket 9 is behind the target.
        add_ticket(&mut state, 1, vec![1, 0, 0]);
        add_ticket(&mut state, 2, vec![1, 0, 0]);
        add_ticket(&mut state, 3, vec![1, 0, 0]);
        add_ticket(&mut state, 5, vec![0, 2, 0]);
        add_ticket(&mut state, 6, vec![0, 0, 4]);
        add_ticket(&mut state, 9, vec![1, 0, 0]);

        assert_eq!(empty_slot_pairs(&state, 6), 3);
        assert_eq!(empty_slot_padding_s(&state, 6), (3 * 80).min(300));

        // The clamp holds once enough pairs accumulate.
        for n in 10..20 {
            add_ticket(&mut state, n, vec![1, 0, 0]);
        }
        assert_eq!(empty_slot_padding_s(&state, 19), 300);
    }

    #[test]
    fn in_queue_time_includes_the_timeout_padding() {
        let mut state = state();
        add_ticket(&mut state, 1, vec![1, 0, 0]);
        add_ticket(&mut state, 2, vec![0, 0, 1]);
        state.timeout_s = 120;

        assert_eq!(in_queue_customers_time(&state, 2), 60 + 20 + 120);
    }
}
