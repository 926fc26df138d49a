use serde::{Deserialize, Serialize};

/// Classifies a ticket by the size of the order behind it.
///
/// The scheduler interleaves the two real kinds so that neither singles nor
/// multis queue back-to-back while a slot of the other kind is available.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketKind {
    /// An order of exactly one bread.
    Single,
    /// An order of two or more breads.
    Multi,
    /// A reserved placeholder position absorbed by a later multi ticket.
    Consumed,
}

/// Lifecycle state of a ticket within one bakery day.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    /// The ticket is in active circulation and still owed breads.
    Waiting,
    /// The ticket has left circulation; its number is at or below the served cutoff.
    Served,
    /// The ticket never represented a customer; it only held a position.
    Consumed,
}

/// One customer order on one day, identified by its positive number.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub number: u32,
    pub kind: TicketKind,
    /// Total breads: multi = order size, single = 1, consumed = 0.
    pub quantity: i64,
    pub status: TicketStatus,
    pub timestamp: String,
    pub served_at: Option<String>,
    /// Numeric back-reference from a consumed placeholder to the multi that
    /// absorbed it. Never an ownership pointer; the multi owns its own record.
    pub parent_ticket: Option<u32>,
}

impl Ticket {
    pub fn new_single(number: u32, timestamp: String) -> Ticket {
        Ticket { number, kind: TicketKind::Single, quantity: 1, status: TicketStatus::Waiting, timestamp, served_at: None, parent_ticket: None }
    }

    pub fn new_multi(number: u32, quantity: i64, timestamp: String) -> Ticket {
        Ticket { number, kind: TicketKind::Multi, quantity, status: TicketStatus::Waiting, timestamp, served_at: None, parent_ticket: None }
    }

    pub fn new_placeholder(number: u32, parent: u32, timestamp: String) -> Ticket {
        Ticket {
            number,
            kind: TicketKind::Consumed,
            quantity: 0,
            status: TicketStatus::Consumed,
            timestamp,
            served_at: None,
            parent_ticket: Some(parent),
        }
    }
}
