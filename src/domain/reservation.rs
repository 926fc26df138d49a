use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Ordered bread counts of one order, aligned with the bakery's canonical
/// bread ordering (ascending bread-type id). Length always equals the number
/// of bread types the bakery offers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct Reservation {
    pub counts: Vec<i64>,
}

impl Reservation {
    pub fn new(counts: Vec<i64>) -> Reservation {
        Reservation { counts }
    }

    /// Total breads across all types.
    pub fn total(&self) -> i64 {
        self.counts.iter().sum()
    }

    pub fn is_single(&self) -> bool {
        self.total() == 1
    }
}

/// The per-day bread menu of a bakery: `bread_type_id -> preparation seconds`.
///
/// The ascending key order of the map IS the canonical bread ordering every
/// `Reservation` vector is aligned with.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct BreadMenu {
    pub prep_time_per_bread: BTreeMap<u32, i64>,
}

impl BreadMenu {
    pub fn new(prep_time_per_bread: BTreeMap<u32, i64>) -> BreadMenu {
        BreadMenu { prep_time_per_bread }
    }

    pub fn is_empty(&self) -> bool {
        self.prep_time_per_bread.is_empty()
    }

    pub fn len(&self) -> usize {
        self.prep_time_per_bread.len()
    }

    /// Bread type ids in canonical (ascending) order.
    pub fn bread_ids(&self) -> Vec<u32> {
        self.prep_time_per_bread.keys().copied().collect()
    }

    /// Preparation seconds in canonical order, index-aligned with reservations.
    pub fn prep_times(&self) -> Vec<i64> {
        self.prep_time_per_bread.values().copied().collect()
    }

    /// Floor of the mean preparation time over all bread types.
    pub fn average_prep_s(&self) -> i64 {
        if self.prep_time_per_bread.is_empty() {
            return 0;
        }
        return self.prep_time_per_bread.values().sum::<i64>() / self.prep_time_per_bread.len() as i64;
    }

    /// Largest preparation time on the menu.
    pub fn max_prep_s(&self) -> i64 {
        self.prep_time_per_bread.values().copied().max().unwrap_or(0)
    }

    /// Total preparation seconds of one reservation: `sum(count_i * prep_i)`.
    pub fn prep_time(&self, reservation: &Reservation) -> i64 {
        reservation.counts.iter().zip(self.prep_times()).map(|(count, prep)| count * prep).sum()
    }

    /// Floor of the mean preparation time over the bread types this
    /// reservation actually orders.
    pub fn average_prep_for(&self, reservation: &Reservation) -> i64 {
        let ordered: Vec<i64> = reservation.counts.iter().zip(self.prep_times()).filter(|(count, _)| **count > 0).map(|(_, prep)| prep).collect();

        if ordered.is_empty() {
            return self.average_prep_s();
        }
        return ordered.iter().sum::<i64>() / ordered.len() as i64;
    }

    /// Builds the canonical reservation vector from a `bread_id -> count`
    /// requirement map, validating shape and values.
    pub fn reservation_from_requirements(&self, requirements: &BTreeMap<u32, i64>) -> Result<Reservation> {
        if requirements.values().any(|&count| count < 0) {
            return Err(Error::InvalidRequest("bread counts cannot be negative".to_string()));
        }

        if requirements.keys().any(|bread_id| !self.prep_time_per_bread.contains_key(bread_id)) {
            return Err(Error::InvalidRequest("unknown bread type in requirements".to_string()));
        }

        let reservation = Reservation::new(self.bread_ids().iter().map(|bread_id| requirements.get(bread_id).copied().unwrap_or(0)).collect());

        if reservation.total() < 1 {
            return Err(Error::InvalidRequest("a ticket must order at least one bread".to_string()));
        }

        return Ok(reservation);
    }

    /// Checks an already-encoded reservation vector against the menu shape.
    pub fn validate_reservation(&self, reservation: &Reservation) -> Result<()> {
        if reservation.counts.len() != self.len() {
            return Err(Error::InvalidRequest(format!(
                "reservation length {} does not match the {} bread types on the menu",
                reservation.counts.len(),
                self.len()
            )));
        }
        if reservation.counts.iter().any(|&count| count < 0) {
            return Err(Error::InvalidRequest("bread counts cannot be negative".to_string()));
        }
        if reservation.total() < 1 {
            return Err(Error::InvalidRequest("a ticket must order at least one bread".to_string()));
        }

        return Ok(());
    }

    /// Expands a reservation into the `bread_id -> count` map returned to
    /// hardware and customers.
    pub fn reservation_detail(&self, reservation: &Reservation) -> BTreeMap<u32, i64> {
        self.bread_ids().into_iter().zip(reservation.counts.iter().copied()).collect()
    }
}
