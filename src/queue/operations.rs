use chrono::NaiveDate;
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::customer_dto::{QueueStatusResponse, QueueSummaryResponse};
use crate::api::hardware_dto::{
    CurrentTicketResponse, NewBreadResponse, NewTicketResponse, ServeTicketResponse, UpcomingCustomerResponse, WaitListCheckResponse, WaitListMoveResponse,
};
use crate::domain::bakery_state::{BakeryConfig, BakeryState, StampView};
use crate::domain::clock::{self, Clock};
use crate::domain::readiness;
use crate::domain::token::daily_customer_token;
use crate::error::{Error, Result};
use crate::store::journal::{self, Journal, JournalBread, JournalCustomer};
use crate::store::state_store::StateStore;

/// The queue engine: every public operation is one compound atomic write
/// against the per-bakery state, serialized by the state store, with the
/// journal written fire-and-forget after the commit.
#[derive(Debug)]
pub struct QueueEngine {
    pub(crate) store: StateStore,
    pub(crate) journal: Arc<dyn Journal>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) tz: Tz,
}

/// Runs a journal write detached from the request, with bounded retries.
pub(crate) fn spawn_journal<F, Fut>(name: &'static str, f: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send,
{
    tokio::spawn(async move {
        if let Err(e) = journal::with_retries(name, f).await {
            log::error!("Giving up on journal write '{}': {}", name, e);
        }
    });
}

impl QueueEngine {
    pub fn new(configs: Vec<BakeryConfig>, journal: Arc<dyn Journal>, clock: Arc<dyn Clock>, timezone: Tz) -> QueueEngine {
        let store = StateStore::new(configs, journal.clone(), clock.clone(), timezone);

        QueueEngine { store, journal, clock, tz: timezone }
    }

    pub fn bakery_ids(&self) -> Vec<u32> {
        self.store.bakery_ids()
    }

    pub(crate) fn today(&self) -> NaiveDate {
        self.store.today()
    }

    fn now_iso(&self) -> String {
        clock::now_iso(&self.clock, self.tz)
    }

    /// Issues a ticket for the given `bread_type_id -> count` requirements.
    ///
    /// The reservation, the serving-order entry and the last-ticket counter
    /// commit as one unit; the customer row is journaled afterwards.
    pub async fn new_ticket(&self, bakery_id: u32, bread_requirements: BTreeMap<u32, i64>) -> Result<NewTicketResponse> {
        self.store.config(bakery_id)?;

        let timestamp = self.now_iso();
        let (ticket_number, show_on_display, detail, is_upcoming) = self
            .store
            .update_compound(bakery_id, |state| {
                let reservation = state.menu.reservation_from_requirements(&bread_requirements)?;

                // The oven may already be past lower numbers; never issue at
                // or below the highest ticket any bread was stamped to.
                if let Some(max_owner) = state.ledger.max_owner() {
                    state.queue.raise_current_served(max_owner);
                }

                let ticket = if reservation.is_single() {
                    state.queue.issue_single(&timestamp)?
                } else {
                    state.queue.issue_multi(reservation.total(), &timestamp)?
                };

                if state.reservations.contains_key(&ticket.number) {
                    log::error!("Reservation slot {} of bakery {} is already occupied.", ticket.number, bakery_id);
                    return Err(Error::Conflict(ticket.number));
                }

                state.reservations.insert(ticket.number, reservation.clone());
                state.order.insert(ticket.number);
                state.last_ticket = state.last_ticket.max(ticket.number);

                let is_upcoming = state.orders_upcoming_bread(&reservation);
                if is_upcoming {
                    state.upcoming_customers.insert(ticket.number);
                }

                let show_on_display = state.take_display_flag();
                let detail = state.menu.reservation_detail(&reservation);

                Ok((ticket.number, show_on_display, detail, is_upcoming))
            })
            .await?;

        let date = self.today();
        let token = daily_customer_token(bakery_id, ticket_number, date);

        log::info!("Bakery {}: issued ticket {} (show_on_display: {}, token: {}).", bakery_id, ticket_number, show_on_display, token);

        let journal = self.journal.clone();
        let customer = JournalCustomer {
            ticket_id: ticket_number,
            bakery_id,
            is_in_queue: true,
            register_date: date.to_string(),
            token: token.clone(),
            breads: detail,
        };
        spawn_journal("record_customer", move || {
            let journal = journal.clone();
            let customer = customer.clone();
            async move {
                journal.record_customer(date, customer).await?;
                if is_upcoming {
                    journal.record_upcoming_customer(bakery_id, date, ticket_number).await?;
                }
                Ok(())
            }
        });

        return Ok(NewTicketResponse { ticket_number, show_on_display, token });
    }

    /// Stamps one bread leaving the oven onto the right ticket and reports
    /// what the oven display should show next.
    pub async fn new_bread(&self, bakery_id: u32) -> Result<NewBreadResponse> {
        self.store.config(bakery_id)?;

        let now_s = self.clock.now_s();
        let (response, stamp) = self
            .store
            .update_compound(bakery_id, |state| {
                let stamp = state.stamp_bread(now_s);

                let response = match stamp.view {
                    StampView::Customer { customer_id, next_customer } => NewBreadResponse::Customer {
                        customer_id,
                        customer_breads: state.reservations.get(&customer_id).map(|r| state.menu.reservation_detail(r)).unwrap_or_default(),
                        next_customer,
                    },
                    StampView::Idle { belongs_to_customer } => NewBreadResponse::Idle { has_customer: false, belongs_to_customer },
                };

                Ok((response, stamp))
            })
            .await?;

        log::info!("Bakery {}: bread {} stamped to {:?}.", bakery_id, stamp.index, stamp.belongs_to);

        let journal = self.journal.clone();
        let date = self.today();
        let bread = JournalBread { belongs_to: stamp.belongs_to, baked_at: stamp.cook_ready_at_ts, consumed: false };
        spawn_journal("record_bread", move || {
            let journal = journal.clone();
            async move { journal.record_bread(bakery_id, date, bread).await }
        });

        return Ok(response);
    }

    /// Readiness of the lowest active ticket, for the counter display.
    pub async fn current_ticket(&self, bakery_id: u32) -> Result<CurrentTicketResponse> {
        self.store.config(bakery_id)?;

        let now_s = self.clock.now_s();
        return self
            .store
            .update_compound(bakery_id, |state| {
                let Some(head) = state.head_ticket() else {
                    return Ok(CurrentTicketResponse::Empty { has_customer_in_queue: false });
                };

                let status = readiness::calculate_ready_status(state, head, now_s);

                // Customers are pointed at the head only once it is ready to
                // be served.
                if status.ready {
                    state.user_current_ticket = Some(head);
                }

                let detail = state.reservations.get(&head).map(|r| state.menu.reservation_detail(r)).unwrap_or_default();

                Ok(CurrentTicketResponse::Current {
                    ready: status.ready,
                    wait_until: status.wait_s,
                    has_customer_in_queue: true,
                    current_ticket_id: head,
                    current_user_detail: detail,
                })
            })
            .await;
    }

    /// Moves the head ticket out of the active order onto the wait list,
    /// releases its breads and rebuilds the preparation state.
    pub async fn send_current_to_wait_list(&self, bakery_id: u32) -> Result<WaitListMoveResponse> {
        self.store.config(bakery_id)?;

        let timestamp = self.now_iso();
        let (moved, removed_breads, was_upcoming, response) = self
            .store
            .update_compound(bakery_id, |state| {
                // The serving order can only drift from the reservations map
                // after a partial restore; rebuild it rather than failing.
                if state.order.is_empty() && !state.reservations.is_empty() {
                    log::warn!("Serving order of bakery {} out of sync with reservations; rebuilding.", bakery_id);
                    state.order = state.reservations.keys().copied().collect();
                }

                let head = state.head_ticket().ok_or(Error::EmptyQueue)?;
                let reservation = state.reservations.remove(&head).ok_or(Error::TicketNotFound(head))?;
                state.order.remove(&head);

                state.queue.mark_ticket_served(head, &timestamp);
                state.wait_list.insert(head, reservation);

                let removed_breads = state.ledger.consume_for(head);
                state.rebuild_prep_state();

                let was_upcoming = state.upcoming_customers.remove(&head);
                if state.current_upcoming_customer.map(|(id, _)| id) == Some(head) {
                    state.current_upcoming_customer = None;
                }

                let next_ticket_id = state.head_ticket();
                let next_user_detail = next_ticket_id
                    .and_then(|next| state.reservations.get(&next))
                    .map(|r| state.menu.reservation_detail(r))
                    .unwrap_or_default();

                Ok((head, removed_breads, was_upcoming, WaitListMoveResponse { next_ticket_id, next_user_detail }))
            })
            .await?;

        log::info!("Bakery {}: ticket {} moved to the wait list, {} breads released.", bakery_id, moved, removed_breads);

        let journal = self.journal.clone();
        let date = self.today();
        spawn_journal("record_wait_list_move", move || {
            let journal = journal.clone();
            async move {
                journal.mark_customer_left_queue(bakery_id, date, moved).await?;
                journal.record_wait_list(bakery_id, date, moved).await?;
                journal.consume_breads(bakery_id, date, moved).await?;
                if was_upcoming {
                    journal.remove_upcoming_customer(bakery_id, date, moved).await?;
                }
                Ok(())
            }
        });

        return Ok(response);
    }

    /// Serves a wait-listed ticket and returns its reservation breakdown.
    pub async fn serve_ticket(&self, bakery_id: u32, ticket_id: u32) -> Result<ServeTicketResponse> {
        self.store.config(bakery_id)?;

        let user_detail = self
            .store
            .update_compound(bakery_id, |state| {
                let reservation = state.wait_list.remove(&ticket_id).ok_or(Error::TicketNotInWaitList(ticket_id))?;
                state.served.insert(ticket_id);

                Ok(state.menu.reservation_detail(&reservation))
            })
            .await?;

        log::info!("Bakery {}: wait-listed ticket {} served.", bakery_id, ticket_id);

        let journal = self.journal.clone();
        let date = self.today();
        spawn_journal("mark_wait_list_served", move || {
            let journal = journal.clone();
            async move { journal.mark_wait_list_served(bakery_id, date, ticket_id).await }
        });

        return Ok(ServeTicketResponse { user_detail });
    }

    /// `serve_ticket` addressed by the customer's daily token.
    pub async fn serve_ticket_by_token(&self, bakery_id: u32, token: &str) -> Result<ServeTicketResponse> {
        let ticket_id = self.resolve_token(bakery_id, token).await?;
        return self.serve_ticket(bakery_id, ticket_id).await;
    }

    pub async fn is_ticket_in_wait_list(&self, bakery_id: u32, ticket_id: u32) -> Result<WaitListCheckResponse> {
        let state = self.store.load(bakery_id).await?;

        return Ok(WaitListCheckResponse { is_ticket_in_wait_list: state.wait_list.contains_key(&ticket_id) });
    }

    /// Full queue status for one ticket, as polled by customers.
    pub async fn queue_status(&self, bakery_id: u32, ticket_id: u32) -> Result<QueueStatusResponse> {
        self.store.config(bakery_id)?;

        let state = self.store.load(bakery_id).await?;
        Self::ensure_active(&state, ticket_id)?;

        let now_s = self.clock.now_s();
        let status = readiness::calculate_ready_status(&state, ticket_id, now_s);

        let people_in_queue = state.order.iter().filter(|&&k| k < ticket_id).count() as i64;
        let user_breads = state.reservations.get(&ticket_id).map(|r| state.menu.reservation_detail(r)).unwrap_or_default();

        return Ok(QueueStatusResponse {
            ready: status.ready,
            accurate_time: status.precise,
            wait_until: status.wait_s,
            people_in_queue,
            empty_slot_time_avg: readiness::empty_slot_padding_s(&state, ticket_id),
            in_queue_customers_time: readiness::in_queue_customers_time(&state, ticket_id),
            user_breads,
            current_ticket_id: state.user_current_ticket,
            ticket_id,
        });
    }

    /// `queue_status` addressed by the customer's daily token.
    pub async fn queue_status_by_token(&self, bakery_id: u32, token: &str) -> Result<QueueStatusResponse> {
        let ticket_id = self.resolve_token(bakery_id, token).await?;
        return self.queue_status(bakery_id, ticket_id).await;
    }

    /// Queue summary up to and including the token's ticket.
    pub async fn queue_until_ticket_summary(&self, bakery_id: u32, token: &str) -> Result<QueueSummaryResponse> {
        let ticket_id = self.resolve_token(bakery_id, token).await?;

        let state = self.store.load(bakery_id).await?;
        Self::ensure_active(&state, ticket_id)?;

        let included: Vec<u32> = state.order.iter().copied().filter(|&k| k <= ticket_id).collect();
        let tickets_and_their_bread_count: BTreeMap<u32, i64> =
            included.iter().map(|&k| (k, state.reservations.get(&k).map(|r| r.total()).unwrap_or(0))).collect();

        return Ok(QueueSummaryResponse { people_in_queue_until_this_ticket: included.len() as i64, tickets_and_their_bread_count });
    }

    /// Read-only preview of the ticket `new_bread` would work on right now.
    pub async fn current_cook_customer(&self, bakery_id: u32) -> Result<NewBreadResponse> {
        let state = self.store.load(bakery_id).await?;

        let response = match state.working_ticket_preview() {
            Some(customer_id) => NewBreadResponse::Customer {
                customer_id,
                customer_breads: state.reservations.get(&customer_id).map(|r| state.menu.reservation_detail(r)).unwrap_or_default(),
                next_customer: false,
            },
            None => NewBreadResponse::Idle { has_customer: false, belongs_to_customer: false },
        };

        return Ok(response);
    }

    /// Hands the hardware its per-bread preparation times on boot.
    pub async fn hardware_init(&self, bakery_id: u32) -> Result<BTreeMap<u32, i64>> {
        let state = self.store.load(bakery_id).await?;
        if state.menu.is_empty() {
            return Err(Error::BakeryNotFound(bakery_id));
        }

        return Ok(state.menu.prep_time_per_bread.clone());
    }

    /// Sets the additive in-queue padding for the rest of the day.
    pub async fn update_timeout(&self, bakery_id: u32, seconds: i64) -> Result<()> {
        self.store
            .update_compound(bakery_id, |state| {
                state.timeout_s = seconds;
                Ok(())
            })
            .await
    }

    /// Zeroes the additive padding; the daily default.
    pub async fn reset_timeout(&self, bakery_id: u32) -> Result<()> {
        self.update_timeout(bakery_id, 0).await
    }

    /// Announces a bread type; future orders containing it are tracked as
    /// upcoming customers.
    pub async fn add_upcoming_bread(&self, bakery_id: u32, bread_id: u32) -> Result<()> {
        self.store
            .update_compound(bakery_id, |state| {
                if !state.menu.prep_time_per_bread.contains_key(&bread_id) {
                    return Err(Error::InvalidRequest(format!("bread type {} is not on the menu", bread_id)));
                }

                state.upcoming_breads.insert(bread_id);
                Ok(())
            })
            .await
    }

    pub async fn remove_upcoming_bread(&self, bakery_id: u32, bread_id: u32) -> Result<()> {
        self.store
            .update_compound(bakery_id, |state| {
                state.upcoming_breads.remove(&bread_id);
                Ok(())
            })
            .await
    }

    /// The next customer whose announced breads are due.
    ///
    /// A customer is surfaced once their predicted delivery time (in-queue
    /// time plus idle-gap padding) fits inside the notification lead time
    /// (own preparation plus baking); the surfaced slot then blocks further
    /// announcements until its preparation window expires.
    pub async fn upcoming_customer(&self, bakery_id: u32) -> Result<UpcomingCustomerResponse> {
        self.store.config(bakery_id)?;

        let now_s = self.clock.now_s();
        let (response, surfaced) = self
            .store
            .update_compound(bakery_id, |state| {
                if let Some((_, expires_at)) = state.current_upcoming_customer {
                    if now_s >= expires_at {
                        state.current_upcoming_customer = None;
                    }
                }

                let surfaced_already = state.current_upcoming_customer.map(|(id, _)| id);
                let Some(customer_id) = surfaced_already.or_else(|| state.upcoming_customers.iter().next().copied()) else {
                    return Ok((UpcomingCustomerResponse::Empty { empty_upcoming: true }, None));
                };

                let Some(reservation) = state.reservations.get(&customer_id).cloned() else {
                    // The ticket left the active queue without cleanup.
                    state.upcoming_customers.remove(&customer_id);
                    state.current_upcoming_customer = None;
                    return Ok((UpcomingCustomerResponse::Empty { empty_upcoming: true }, None));
                };

                let delivery_time_s = readiness::in_queue_customers_time(state, customer_id) + readiness::empty_slot_padding_s(state, customer_id);
                let preparation_time = state.menu.prep_time(&reservation);
                let lead_time_s = preparation_time + state.baking_time_s;

                if delivery_time_s > lead_time_s || surfaced_already.is_some() {
                    return Ok((UpcomingCustomerResponse::NotReady { empty_upcoming: false, ready_to_show: false }, None));
                }

                let breads: BTreeMap<u32, i64> = state
                    .menu
                    .bread_ids()
                    .into_iter()
                    .zip(reservation.counts.iter().copied())
                    .filter(|(bread_id, count)| *count > 0 && state.upcoming_breads.contains(bread_id))
                    .collect();

                state.upcoming_customers.remove(&customer_id);
                state.current_upcoming_customer = Some((customer_id, now_s + preparation_time));

                Ok((
                    UpcomingCustomerResponse::Ready { empty_upcoming: false, ready_to_show: true, customer_id, breads, preparation_time },
                    Some(customer_id),
                ))
            })
            .await?;

        if let Some(customer_id) = surfaced {
            log::info!("Bakery {}: upcoming customer {} surfaced to the counter.", bakery_id, customer_id);

            let journal = self.journal.clone();
            let date = self.today();
            spawn_journal("remove_upcoming_customer", move || {
                let journal = journal.clone();
                async move { journal.remove_upcoming_customer(bakery_id, date, customer_id).await }
            });
        }

        return Ok(response);
    }

    fn ensure_active(state: &BakeryState, ticket_id: u32) -> Result<()> {
        if state.reservations.contains_key(&ticket_id) {
            return Ok(());
        }

        if state.wait_list.contains_key(&ticket_id) {
            return Err(Error::TicketInWaitList(ticket_id));
        }
        if state.served.contains(&ticket_id) {
            return Err(Error::TicketServed(ticket_id));
        }

        return Err(Error::TicketNotFound(ticket_id));
    }

    async fn resolve_token(&self, bakery_id: u32, token: &str) -> Result<u32> {
        self.store.config(bakery_id)?;

        match self.journal.find_ticket_by_token(bakery_id, self.today(), token).await? {
            Some(ticket_id) => Ok(ticket_id),
            None => Err(Error::InvalidRequest(format!("no customer for token '{}' today", token))),
        }
    }
}
