use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::ticket::{Ticket, TicketKind, TicketStatus};
use crate::error::{Error, Result};

fn default_next_number() -> u32 {
    1
}

/// Per-bakery scheduler state: every ticket issued today plus the structural
/// marks (`next_number`, served cutoff, free slot sets) the interleaving
/// policy is computed from.
///
/// Numbers are strictly monotonic against every structural mark. A position
/// can be **reserved** (parked in one of the slot sets) before it is ever
/// assigned; reserved positions at or below `current_served` expire and are
/// never reissued.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QueueState {
    #[serde(default)]
    pub tickets: BTreeMap<u32, Ticket>,
    #[serde(default = "default_next_number")]
    pub next_number: u32,
    #[serde(default)]
    pub current_served: u32,
    #[serde(default)]
    pub slots_for_multis: BTreeSet<u32>,
    #[serde(default)]
    pub slots_for_singles: BTreeSet<u32>,
}

impl Default for QueueState {
    fn default() -> QueueState {
        QueueState {
            tickets: BTreeMap::new(),
            next_number: 1,
            current_served: 0,
            slots_for_multis: BTreeSet::new(),
            slots_for_singles: BTreeSet::new(),
        }
    }
}

impl QueueState {
    pub fn new() -> QueueState {
        QueueState::default()
    }

    /// Drops every reserved slot at or below the served cutoff.
    fn expire_old_slots(&mut self) {
        if self.current_served == 0 {
            return;
        }

        let cutoff = self.current_served;
        self.slots_for_multis.retain(|&n| n > cutoff);
        self.slots_for_singles.retain(|&n| n > cutoff);
    }

    /// Highest number previously issued with the given kind, if any.
    fn prev_ticket_of_kind(&self, kind: TicketKind) -> Option<u32> {
        self.tickets.iter().rev().find(|(_, t)| t.kind == kind).map(|(&n, _)| n)
    }

    /// Inserts the ticket, treating an occupied number as a hard fault.
    fn insert_ticket(&mut self, ticket: Ticket) -> Result<Ticket> {
        if self.tickets.contains_key(&ticket.number) {
            log::error!("Scheduler invariant violated: ticket number {} is already taken.", ticket.number);
            return Err(Error::Conflict(ticket.number));
        }

        self.tickets.insert(ticket.number, ticket.clone());
        return Ok(ticket);
    }

    /// Sweeps expired slots and realigns `next_number` with the served cutoff.
    fn prepare_issue(&mut self) {
        self.expire_old_slots();

        if self.next_number <= self.current_served {
            self.next_number = self.current_served + 1;
        }
    }

    /// Issues a ticket for a one-bread order.
    ///
    /// The smallest reserved single-slot above the cutoff is preferred. When
    /// none is free and the order would queue directly behind the previous
    /// single, the natural position is parked as a multi-slot and the order
    /// takes the number after it.
    pub fn issue_single(&mut self, timestamp: &str) -> Result<Ticket> {
        self.prepare_issue();

        let valid_slot = self.slots_for_singles.iter().find(|&&n| n > self.current_served).copied();
        if let Some(slot) = valid_slot {
            self.slots_for_singles.remove(&slot);
            return self.insert_ticket(Ticket::new_single(slot, timestamp.to_string()));
        }

        let candidate = self.next_number;
        let assigned = match self.prev_ticket_of_kind(TicketKind::Single) {
            Some(prev_single) if prev_single + 1 == candidate => {
                if !self.tickets.contains_key(&candidate) {
                    self.slots_for_multis.insert(candidate);
                }
                self.next_number = candidate + 2;
                candidate + 1
            }
            _ => {
                self.next_number = candidate + 1;
                candidate
            }
        };

        return self.insert_ticket(Ticket::new_single(assigned, timestamp.to_string()));
    }

    /// Issues a ticket for an order of `quantity >= 2` breads.
    ///
    /// Reserved multi-slots are consumed smallest-first, up to `quantity` of
    /// them: all but the last become placeholder tickets pointing at the
    /// last, which carries the order. With no free multi-slot the same
    /// adjacency rule as `issue_single` applies with the kinds swapped.
    pub fn issue_multi(&mut self, quantity: i64, timestamp: &str) -> Result<Ticket> {
        if quantity < 2 {
            return Err(Error::InvalidRequest(format!("quantity must be >= 2 for a multi ticket, got {}", quantity)));
        }

        self.prepare_issue();

        let available: Vec<u32> = self.slots_for_multis.iter().filter(|&&n| n > self.current_served).copied().collect();
        if !available.is_empty() {
            let take = (quantity as usize).min(available.len());
            let consumed = &available[..take];
            let ticket_number = consumed[consumed.len() - 1];

            for &slot in consumed {
                self.slots_for_multis.remove(&slot);
            }
            for &slot in &consumed[..consumed.len() - 1] {
                self.insert_ticket(Ticket::new_placeholder(slot, ticket_number, timestamp.to_string()))?;
            }

            return self.insert_ticket(Ticket::new_multi(ticket_number, quantity, timestamp.to_string()));
        }

        let candidate = self.next_number;
        let assigned = match self.prev_ticket_of_kind(TicketKind::Multi) {
            Some(prev_multi) if prev_multi + 1 == candidate => {
                if !self.tickets.contains_key(&candidate) {
                    self.slots_for_singles.insert(candidate);
                }
                self.next_number = candidate + 2;
                candidate + 1
            }
            _ => {
                self.next_number = candidate + 1;
                candidate
            }
        };

        return self.insert_ticket(Ticket::new_multi(assigned, quantity, timestamp.to_string()));
    }

    /// Marks a ticket as served and advances the served cutoff to its number.
    ///
    /// Placeholders, already-served tickets and numbers at or below the
    /// cutoff are ignored; the cutoff never moves backwards.
    pub fn mark_ticket_served(&mut self, number: u32, served_at: &str) {
        let Some(ticket) = self.tickets.get_mut(&number) else {
            return;
        };

        if ticket.kind == TicketKind::Consumed || ticket.status == TicketStatus::Served {
            return;
        }
        if number <= self.current_served {
            return;
        }

        ticket.status = TicketStatus::Served;
        ticket.served_at = Some(served_at.to_string());
        self.current_served = number;
        self.expire_old_slots();
    }

    /// Lifts the served cutoff without touching any ticket record. Used when
    /// the oven state proves that lower numbers are no longer schedulable.
    pub fn raise_current_served(&mut self, number: u32) {
        if number > self.current_served {
            self.current_served = number;
            self.expire_old_slots();

            if self.next_number <= self.current_served {
                self.next_number = self.current_served + 1;
            }
        }
    }
}
