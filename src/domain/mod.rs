pub mod bakery_state;
pub mod bread_ledger;
pub mod clock;
pub mod queue_state;
pub mod readiness;
pub mod reservation;
pub mod ticket;
pub mod token;
