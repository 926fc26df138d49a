use chrono::{NaiveDate, TimeZone};
use chrono_tz::Tz;
use std::sync::{Arc, RwLock};

/// Process-wide wall-clock reader.
///
/// All queue logic reads time through this trait so tests can pin or
/// advance the clock deterministically.
pub trait Clock: std::fmt::Debug + Send + Sync {
    /// Current Unix time in whole seconds.
    fn now_s(&self) -> i64;
}

#[derive(Debug, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_s(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Manually driven clock for tests. The inner value is shared, so clones
/// handed to the engine observe later `advance` calls.
#[derive(Debug, Clone)]
pub struct ManualClock {
    pub time: Arc<RwLock<i64>>,
}

impl ManualClock {
    pub fn new(time: i64) -> ManualClock {
        ManualClock { time: Arc::new(RwLock::new(time)) }
    }

    pub fn set(&self, time: i64) {
        *self.time.write().expect("RwLock poisoned") = time;
    }

    pub fn advance(&self, seconds: i64) {
        *self.time.write().expect("RwLock poisoned") += seconds;
    }
}

impl Clock for ManualClock {
    fn now_s(&self) -> i64 {
        *self.time.read().expect("RwLock poisoned")
    }
}

/// Parses an IANA timezone name, falling back to the bakery default.
pub fn parse_tz(tz: &str) -> Tz {
    tz.parse::<Tz>().unwrap_or_else(|_| {
        log::warn!("Unknown IANA timezone '{}', falling back to Asia/Tehran.", tz);
        Tz::Asia__Tehran
    })
}

/// The local calendar date all per-day state is keyed by.
pub fn local_date(clock: &Arc<dyn Clock>, tz: Tz) -> NaiveDate {
    tz.timestamp_opt(clock.now_s(), 0).single().expect("valid unix timestamp").date_naive()
}

/// ISO timestamp string used for ticket bookkeeping.
pub fn now_iso(clock: &Arc<dyn Clock>, tz: Tz) -> String {
    tz.timestamp_opt(clock.now_s(), 0).single().expect("valid unix timestamp").format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Seconds until the next local midnight; the TTL of every per-day key.
pub fn seconds_until_midnight(clock: &Arc<dyn Clock>, tz: Tz) -> i64 {
    let now = tz.timestamp_opt(clock.now_s(), 0).single().expect("valid unix timestamp");
    let next_midnight = (now.date_naive() + chrono::Duration::days(1)).and_hms_opt(0, 0, 0).expect("midnight exists");
    let next_midnight = tz.from_local_datetime(&next_midnight).single().expect("unambiguous local midnight");

    return next_midnight.timestamp() - now.timestamp();
}
