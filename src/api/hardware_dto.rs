use serde::Serialize;
use std::collections::BTreeMap;

/// Result of issuing a ticket to an arriving customer.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct NewTicketResponse {
    pub ticket_number: u32,
    /// True only for the first ticket after the oven went idle.
    pub show_on_display: bool,
    /// Short per-day token the customer polls the queue with.
    pub token: String,
}

/// What the oven display shows after a bread was stamped (also the shape of
/// the read-only cook preview).
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum NewBreadResponse {
    Customer {
        customer_id: u32,
        customer_breads: BTreeMap<u32, i64>,
        /// True when the display switched to a new ticket with this bread.
        next_customer: bool,
    },
    Idle {
        has_customer: bool,
        /// Distinguishes "this bread completed the last order" from "this
        /// bread had no owner at all".
        belongs_to_customer: bool,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum CurrentTicketResponse {
    Empty {
        has_customer_in_queue: bool,
    },
    Current {
        ready: bool,
        wait_until: Option<i64>,
        has_customer_in_queue: bool,
        current_ticket_id: u32,
        current_user_detail: BTreeMap<u32, i64>,
    },
}

/// Result of pushing the head ticket onto the wait list.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct WaitListMoveResponse {
    pub next_ticket_id: Option<u32>,
    pub next_user_detail: BTreeMap<u32, i64>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ServeTicketResponse {
    pub user_detail: BTreeMap<u32, i64>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitListCheckResponse {
    pub is_ticket_in_wait_list: bool,
}

/// Next customer whose announced breads are due, if any.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum UpcomingCustomerResponse {
    Empty {
        empty_upcoming: bool,
    },
    NotReady {
        empty_upcoming: bool,
        ready_to_show: bool,
    },
    Ready {
        empty_upcoming: bool,
        ready_to_show: bool,
        customer_id: u32,
        /// Only the announced bread types of the order.
        breads: BTreeMap<u32, i64>,
        preparation_time: i64,
    },
}
