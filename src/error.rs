use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON payload: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Bakery {0} does not exist or has no bread types")]
    BakeryNotFound(u32),

    #[error("The queue is empty")]
    EmptyQueue,

    #[error("Ticket {0} does not exist")]
    TicketNotFound(u32),

    #[error("Ticket {0} is in the wait list")]
    TicketInWaitList(u32),

    #[error("Ticket {0} is served")]
    TicketServed(u32),

    #[error("Ticket {0} is not in the wait list")]
    TicketNotInWaitList(u32),

    #[error("Conflicting write for ticket {0}: number already taken")]
    Conflict(u32),

    #[error("Transient backing store failure: {0}")]
    Transient(String),
}

impl Error {
    /// Maps the NotFound family onto the discriminator strings the
    /// customer-facing endpoints report.
    pub fn discriminator(&self) -> Option<&'static str> {
        match self {
            Error::TicketInWaitList(_) => Some("ticket in wait list"),
            Error::TicketServed(_) => Some("ticket served"),
            Error::TicketNotFound(_) => Some("ticket does not exist"),
            Error::BakeryNotFound(_) => Some("bakery does not exist"),
            Error::EmptyQueue => Some("empty queue"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
