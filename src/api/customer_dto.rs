use serde::Serialize;
use std::collections::BTreeMap;

/// Full queue status a polling customer sees for their ticket.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct QueueStatusResponse {
    pub ready: bool,
    /// True when `wait_until` is derived from actual baked timestamps.
    pub accurate_time: bool,
    pub wait_until: Option<i64>,
    pub people_in_queue: i64,
    pub empty_slot_time_avg: i64,
    pub in_queue_customers_time: i64,
    pub user_breads: BTreeMap<u32, i64>,
    pub current_ticket_id: Option<u32>,
    pub ticket_id: u32,
}

/// Summary of the queue up to and including one ticket.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct QueueSummaryResponse {
    pub people_in_queue_until_this_ticket: i64,
    pub tickets_and_their_bread_count: BTreeMap<u32, i64>,
}
