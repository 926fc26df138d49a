use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Error, Result};

/// One customer row plus its per-bread counts, as journaled on new-ticket.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JournalCustomer {
    pub ticket_id: u32,
    pub bakery_id: u32,
    pub is_in_queue: bool,
    pub register_date: String,
    pub token: String,
    /// `bread_type_id -> count`, the customer_bread association rows.
    pub breads: BTreeMap<u32, i64>,
}

/// One baked bread row. `belongs_to = None` journals a sentinel bread.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalBread {
    pub belongs_to: Option<u32>,
    pub baked_at: i64,
    pub consumed: bool,
}

/// Narrow interface to the persistent journal the core reads and writes
/// through. Every write is an idempotent upsert; every call is a suspension
/// point for the caller.
#[async_trait]
pub trait Journal: Send + Sync + std::fmt::Debug {
    async fn upsert_snapshot(&self, bakery_id: u32, date: NaiveDate, state_json: String) -> Result<()>;
    async fn load_snapshot(&self, bakery_id: u32, date: NaiveDate) -> Result<Option<String>>;

    async fn record_customer(&self, date: NaiveDate, customer: JournalCustomer) -> Result<()>;
    async fn mark_customer_left_queue(&self, bakery_id: u32, date: NaiveDate, ticket_id: u32) -> Result<()>;
    async fn record_wait_list(&self, bakery_id: u32, date: NaiveDate, ticket_id: u32) -> Result<()>;
    async fn mark_wait_list_served(&self, bakery_id: u32, date: NaiveDate, ticket_id: u32) -> Result<()>;

    async fn record_bread(&self, bakery_id: u32, date: NaiveDate, bread: JournalBread) -> Result<()>;
    /// Flags every bread of the ticket as consumed.
    async fn consume_breads(&self, bakery_id: u32, date: NaiveDate, ticket_id: u32) -> Result<usize>;

    async fn today_customers(&self, bakery_id: u32, date: NaiveDate) -> Result<Vec<JournalCustomer>>;
    async fn today_wait_list(&self, bakery_id: u32, date: NaiveDate) -> Result<Vec<JournalCustomer>>;
    async fn today_breads(&self, bakery_id: u32, date: NaiveDate) -> Result<Vec<JournalBread>>;

    async fn record_upcoming_customer(&self, bakery_id: u32, date: NaiveDate, ticket_id: u32) -> Result<()>;
    async fn remove_upcoming_customer(&self, bakery_id: u32, date: NaiveDate, ticket_id: u32) -> Result<()>;
    async fn today_upcoming_customers(&self, bakery_id: u32, date: NaiveDate) -> Result<Vec<u32>>;

    /// Highest ticket id used today; seeds `next_number` after cache loss.
    async fn last_ticket_id(&self, bakery_id: u32, date: NaiveDate) -> Result<u32>;
    async fn find_ticket_by_token(&self, bakery_id: u32, date: NaiveDate, token: &str) -> Result<Option<u32>>;

    async fn record_prep_recalibration(&self, bakery_id: u32, new_average: i64) -> Result<()>;
}

/// Everything journaled for one bakery on one local date.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
struct JournalDay {
    snapshot: Option<String>,
    customers: Vec<JournalCustomer>,
    /// `ticket -> still on the wait list` (false once served from it).
    wait_list: BTreeMap<u32, bool>,
    breads: Vec<JournalBread>,
    /// Tickets ordering an announced bread type.
    #[serde(default)]
    upcoming: std::collections::BTreeSet<u32>,
}

impl JournalDay {
    fn upsert_customer(&mut self, customer: JournalCustomer) {
        match self.customers.iter_mut().find(|c| c.ticket_id == customer.ticket_id) {
            Some(existing) => *existing = customer,
            None => self.customers.push(customer),
        }
    }

    fn wait_listed(&self) -> Vec<JournalCustomer> {
        self.customers
            .iter()
            .filter(|c| self.wait_list.get(&c.ticket_id).copied().unwrap_or(false))
            .cloned()
            .collect()
    }
}

/// In-memory journal used by tests and as the default backing.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    days: Mutex<HashMap<(u32, NaiveDate), JournalDay>>,
    recalibrations: Mutex<Vec<(u32, i64)>>,
}

impl MemoryJournal {
    pub fn new() -> MemoryJournal {
        MemoryJournal::default()
    }

    fn with_day<T>(&self, bakery_id: u32, date: NaiveDate, f: impl FnOnce(&mut JournalDay) -> T) -> T {
        let mut days = self.days.lock().expect("Mutex poisoned");
        f(days.entry((bakery_id, date)).or_default())
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn upsert_snapshot(&self, bakery_id: u32, date: NaiveDate, state_json: String) -> Result<()> {
        self.with_day(bakery_id, date, |day| day.snapshot = Some(state_json));
        Ok(())
    }

    async fn load_snapshot(&self, bakery_id: u32, date: NaiveDate) -> Result<Option<String>> {
        Ok(self.with_day(bakery_id, date, |day| day.snapshot.clone()))
    }

    async fn record_customer(&self, date: NaiveDate, customer: JournalCustomer) -> Result<()> {
        self.with_day(customer.bakery_id, date, |day| day.upsert_customer(customer));
        Ok(())
    }

    async fn mark_customer_left_queue(&self, bakery_id: u32, date: NaiveDate, ticket_id: u32) -> Result<()> {
        self.with_day(bakery_id, date, |day| {
            if let Some(customer) = day.customers.iter_mut().find(|c| c.ticket_id == ticket_id) {
                customer.is_in_queue = false;
            }
        });
        Ok(())
    }

    async fn record_wait_list(&self, bakery_id: u32, date: NaiveDate, ticket_id: u32) -> Result<()> {
        self.with_day(bakery_id, date, |day| day.wait_list.insert(ticket_id, true));
        Ok(())
    }

    async fn mark_wait_list_served(&self, bakery_id: u32, date: NaiveDate, ticket_id: u32) -> Result<()> {
        self.with_day(bakery_id, date, |day| day.wait_list.insert(ticket_id, false));
        Ok(())
    }

    async fn record_bread(&self, bakery_id: u32, date: NaiveDate, bread: JournalBread) -> Result<()> {
        self.with_day(bakery_id, date, |day| day.breads.push(bread));
        Ok(())
    }

    async fn consume_breads(&self, bakery_id: u32, date: NaiveDate, ticket_id: u32) -> Result<usize> {
        Ok(self.with_day(bakery_id, date, |day| {
            let mut consumed = 0;
            for bread in day.breads.iter_mut().filter(|b| b.belongs_to == Some(ticket_id) && !b.consumed) {
                bread.consumed = true;
                consumed += 1;
            }
            consumed
        }))
    }

    async fn today_customers(&self, bakery_id: u32, date: NaiveDate) -> Result<Vec<JournalCustomer>> {
        Ok(self.with_day(bakery_id, date, |day| day.customers.iter().filter(|c| c.is_in_queue).cloned().collect()))
    }

    async fn today_wait_list(&self, bakery_id: u32, date: NaiveDate) -> Result<Vec<JournalCustomer>> {
        Ok(self.with_day(bakery_id, date, |day| day.wait_listed()))
    }

    async fn today_breads(&self, bakery_id: u32, date: NaiveDate) -> Result<Vec<JournalBread>> {
        Ok(self.with_day(bakery_id, date, |day| day.breads.clone()))
    }

    async fn record_upcoming_customer(&self, bakery_id: u32, date: NaiveDate, ticket_id: u32) -> Result<()> {
        self.with_day(bakery_id, date, |day| day.upcoming.insert(ticket_id));
        Ok(())
    }

    async fn remove_upcoming_customer(&self, bakery_id: u32, date: NaiveDate, ticket_id: u32) -> Result<()> {
        self.with_day(bakery_id, date, |day| day.upcoming.remove(&ticket_id));
        Ok(())
    }

    async fn today_upcoming_customers(&self, bakery_id: u32, date: NaiveDate) -> Result<Vec<u32>> {
        Ok(self.with_day(bakery_id, date, |day| day.upcoming.iter().copied().collect()))
    }

    async fn last_ticket_id(&self, bakery_id: u32, date: NaiveDate) -> Result<u32> {
        Ok(self.with_day(bakery_id, date, |day| day.customers.iter().map(|c| c.ticket_id).max().unwrap_or(0)))
    }

    async fn find_ticket_by_token(&self, bakery_id: u32, date: NaiveDate, token: &str) -> Result<Option<u32>> {
        Ok(self.with_day(bakery_id, date, |day| day.customers.iter().find(|c| c.token == token).map(|c| c.ticket_id)))
    }

    async fn record_prep_recalibration(&self, bakery_id: u32, new_average: i64) -> Result<()> {
        self.recalibrations.lock().expect("Mutex poisoned").push((bakery_id, new_average));
        Ok(())
    }
}

/// JSON-file journal: one document per bakery per local date under the
/// configured root. Good enough for the demo binary's crash durability; a
/// relational store sits behind the same trait in production.
#[derive(Debug)]
pub struct FileJournal {
    root: PathBuf,
    recalibrations: Mutex<Vec<(u32, i64)>>,
}

impl FileJournal {
    pub fn new(root: impl Into<PathBuf>) -> FileJournal {
        FileJournal { root: root.into(), recalibrations: Mutex::new(Vec::new()) }
    }

    fn day_path(&self, bakery_id: u32, date: NaiveDate) -> PathBuf {
        self.root.join(format!("bakery_{}", bakery_id)).join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    async fn read_day(&self, bakery_id: u32, date: NaiveDate) -> JournalDay {
        let path = self.day_path(bakery_id, date);

        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(_) => return JournalDay::default(),
        };

        // A corrupted journal document yields a clean empty day instead of
        // failing the caller.
        match serde_json::from_str(&data) {
            Ok(day) => day,
            Err(e) => {
                log::warn!("Corrupted journal document at '{}': {}. Treating as absent.", path.display(), e);
                JournalDay::default()
            }
        }
    }

    async fn write_day(&self, bakery_id: u32, date: NaiveDate, day: &JournalDay) -> Result<()> {
        let path = self.day_path(bakery_id, date);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let encoded = serde_json::to_string_pretty(day)?;
        tokio::fs::write(&path, encoded).await?;

        return Ok(());
    }

    async fn update_day<T>(&self, bakery_id: u32, date: NaiveDate, f: impl FnOnce(&mut JournalDay) -> T + Send) -> Result<T> {
        let mut day = self.read_day(bakery_id, date).await;
        let value = f(&mut day);
        self.write_day(bakery_id, date, &day).await?;

        return Ok(value);
    }
}

#[async_trait]
impl Journal for FileJournal {
    async fn upsert_snapshot(&self, bakery_id: u32, date: NaiveDate, state_json: String) -> Result<()> {
        self.update_day(bakery_id, date, |day| day.snapshot = Some(state_json)).await
    }

    async fn load_snapshot(&self, bakery_id: u32, date: NaiveDate) -> Result<Option<String>> {
        Ok(self.read_day(bakery_id, date).await.snapshot)
    }

    async fn record_customer(&self, date: NaiveDate, customer: JournalCustomer) -> Result<()> {
        self.update_day(customer.bakery_id, date, |day| day.upsert_customer(customer)).await
    }

    async fn mark_customer_left_queue(&self, bakery_id: u32, date: NaiveDate, ticket_id: u32) -> Result<()> {
        self.update_day(bakery_id, date, |day| {
            if let Some(customer) = day.customers.iter_mut().find(|c| c.ticket_id == ticket_id) {
                customer.is_in_queue = false;
            }
        })
        .await
    }

    async fn record_wait_list(&self, bakery_id: u32, date: NaiveDate, ticket_id: u32) -> Result<()> {
        self.update_day(bakery_id, date, |day| {
            day.wait_list.insert(ticket_id, true);
        })
        .await
    }

    async fn mark_wait_list_served(&self, bakery_id: u32, date: NaiveDate, ticket_id: u32) -> Result<()> {
        self.update_day(bakery_id, date, |day| {
            day.wait_list.insert(ticket_id, false);
        })
        .await
    }

    async fn record_bread(&self, bakery_id: u32, date: NaiveDate, bread: JournalBread) -> Result<()> {
        self.update_day(bakery_id, date, |day| day.breads.push(bread)).await
    }

    async fn consume_breads(&self, bakery_id: u32, date: NaiveDate, ticket_id: u32) -> Result<usize> {
        self.update_day(bakery_id, date, |day| {
            let mut consumed = 0;
            for bread in day.breads.iter_mut().filter(|b| b.belongs_to == Some(ticket_id) && !b.consumed) {
                bread.consumed = true;
                consumed += 1;
            }
            consumed
        })
        .await
    }

    async fn today_customers(&self, bakery_id: u32, date: NaiveDate) -> Result<Vec<JournalCustomer>> {
        Ok(self.read_day(bakery_id, date).await.customers.into_iter().filter(|c| c.is_in_queue).collect())
    }

    async fn today_wait_list(&self, bakery_id: u32, date: NaiveDate) -> Result<Vec<JournalCustomer>> {
        Ok(self.read_day(bakery_id, date).await.wait_listed())
    }

    async fn today_breads(&self, bakery_id: u32, date: NaiveDate) -> Result<Vec<JournalBread>> {
        Ok(self.read_day(bakery_id, date).await.breads)
    }

    async fn record_upcoming_customer(&self, bakery_id: u32, date: NaiveDate, ticket_id: u32) -> Result<()> {
        self.update_day(bakery_id, date, |day| {
            day.upcoming.insert(ticket_id);
        })
        .await
    }

    async fn remove_upcoming_customer(&self, bakery_id: u32, date: NaiveDate, ticket_id: u32) -> Result<()> {
        self.update_day(bakery_id, date, |day| {
            day.upcoming.remove(&ticket_id);
        })
        .await
    }

    async fn today_upcoming_customers(&self, bakery_id: u32, date: NaiveDate) -> Result<Vec<u32>> {
        Ok(self.read_day(bakery_id, date).await.upcoming.iter().copied().collect())
    }

    async fn last_ticket_id(&self, bakery_id: u32, date: NaiveDate) -> Result<u32> {
        Ok(self.read_day(bakery_id, date).await.customers.iter().map(|c| c.ticket_id).max().unwrap_or(0))
    }

    async fn find_ticket_by_token(&self, bakery_id: u32, date: NaiveDate, token: &str) -> Result<Option<u32>> {
        Ok(self.read_day(bakery_id, date).await.customers.iter().find(|c| c.token == token).map(|c| c.ticket_id))
    }

    async fn record_prep_recalibration(&self, bakery_id: u32, new_average: i64) -> Result<()> {
        self.recalibrations.lock().expect("Mutex poisoned").push((bakery_id, new_average));
        Ok(())
    }
}

const JOURNAL_RETRY_ATTEMPTS: u32 = 3;
const JOURNAL_RETRY_BACKOFF_MS: u64 = 200;

/// Runs a journal write with bounded retries.
///
/// # Returns
/// Returns the last error as `Transient` once the attempts are exhausted;
/// each failed attempt is logged with a correlation id.
pub async fn with_retries<T, F, Fut>(operation_name: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error = String::new();

    for attempt in 1..=JOURNAL_RETRY_ATTEMPTS {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let error_id = uuid::Uuid::new_v4();
                log::warn!("Journal operation '{}' failed (attempt {}/{}, error id {}): {}", operation_name, attempt, JOURNAL_RETRY_ATTEMPTS, error_id, e);
                last_error = e.to_string();
            }
        }

        if attempt < JOURNAL_RETRY_ATTEMPTS {
            tokio::time::sleep(Duration::from_millis(JOURNAL_RETRY_BACKOFF_MS * attempt as u64)).await;
        }
    }

    return Err(Error::Transient(format!("journal operation '{}' failed after {} attempts: {}", operation_name, JOURNAL_RETRY_ATTEMPTS, last_error)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn customer(ticket_id: u32) -> JournalCustomer {
        JournalCustomer {
            ticket_id,
            bakery_id: 1,
            is_in_queue: true,
            register_date: "2025-06-01".to_string(),
            token: format!("TOK{}", ticket_id),
            breads: BTreeMap::from([(1, 2)]),
        }
    }

    #[tokio::test]
    async fn snapshot_upsert_is_idempotent_per_day() {
        let journal = MemoryJournal::new();

        journal.upsert_snapshot(1, date(), "v1".to_string()).await.unwrap();
        journal.upsert_snapshot(1, date(), "v2".to_string()).await.unwrap();

        assert_eq!(journal.load_snapshot(1, date()).await.unwrap(), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn wait_list_rows_track_serving() {
        let journal = MemoryJournal::new();
        journal.record_customer(date(), customer(5)).await.unwrap();

        journal.mark_customer_left_queue(1, date(), 5).await.unwrap();
        journal.record_wait_list(1, date(), 5).await.unwrap();
        assert_eq!(journal.today_wait_list(1, date()).await.unwrap().len(), 1);
        assert!(journal.today_customers(1, date()).await.unwrap().is_empty());

        journal.mark_wait_list_served(1, date(), 5).await.unwrap();
        assert!(journal.today_wait_list(1, date()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn last_ticket_seeds_from_all_customers() {
        let journal = MemoryJournal::new();
        journal.record_customer(date(), customer(3)).await.unwrap();
        journal.record_customer(date(), customer(7)).await.unwrap();
        journal.mark_customer_left_queue(1, date(), 7).await.unwrap();

        assert_eq!(journal.last_ticket_id(1, date()).await.unwrap(), 7, "left customers still block their numbers");
    }

    #[tokio::test]
    async fn consume_breads_flags_only_the_ticket() {
        let journal = MemoryJournal::new();
        journal.record_bread(1, date(), JournalBread { belongs_to: Some(4), baked_at: 100, consumed: false }).await.unwrap();
        journal.record_bread(1, date(), JournalBread { belongs_to: Some(5), baked_at: 110, consumed: false }).await.unwrap();

        assert_eq!(journal.consume_breads(1, date(), 4).await.unwrap(), 1);

        let breads = journal.today_breads(1, date()).await.unwrap();
        assert!(breads.iter().any(|b| b.belongs_to == Some(4) && b.consumed));
        assert!(breads.iter().any(|b| b.belongs_to == Some(5) && !b.consumed));
    }

    #[tokio::test]
    async fn file_journal_round_trips_a_day() {
        let dir = std::env::temp_dir().join(format!("bakery-journal-{}", uuid::Uuid::new_v4()));
        let journal = FileJournal::new(&dir);

        journal.record_customer(date(), customer(2)).await.unwrap();
        journal.upsert_snapshot(1, date(), "snap".to_string()).await.unwrap();

        assert_eq!(journal.load_snapshot(1, date()).await.unwrap(), Some("snap".to_string()));
        assert_eq!(journal.find_ticket_by_token(1, date(), "TOK2").await.unwrap(), Some(2));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
