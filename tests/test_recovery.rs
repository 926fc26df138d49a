use chrono::TimeZone;
use std::collections::BTreeMap;
use std::sync::Arc;

use bakery_queue::api::hardware_dto::NewBreadResponse;
use bakery_queue::domain::bakery_state::BakeryConfig;
use bakery_queue::domain::clock::{Clock, ManualClock};
use bakery_queue::domain::reservation::BreadMenu;
use bakery_queue::error::Error;
use bakery_queue::queue::operations::QueueEngine;
use bakery_queue::store::journal::{Journal, JournalCustomer, MemoryJournal};

const BAKERY: u32 = 1;
const NOON: i64 = 1_750_000_000;
const TZ: chrono_tz::Tz = chrono_tz::Tz::Asia__Tehran;

fn config(menu: BTreeMap<u32, i64>) -> BakeryConfig {
    BakeryConfig { bakery_id: BAKERY, menu: BreadMenu::new(menu), baking_time_s: 60, timeout_s: 0, upcoming_breads: Default::default() }
}

fn engine_on(journal: Arc<MemoryJournal>, clock: &ManualClock, menu: BTreeMap<u32, i64>) -> Arc<QueueEngine> {
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());

    Arc::new(QueueEngine::new(vec![config(menu)], journal, shared, TZ))
}

fn local_date(clock: &ManualClock) -> chrono::NaiveDate {
    TZ.timestamp_opt(clock.now_s(), 0).unwrap().date_naive()
}

async fn drain_journal_tasks() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
    // File-journal writes hop through the blocking pool; give them a beat.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn restart_rebuilds_the_active_queue_from_the_journal() {
    let journal = Arc::new(MemoryJournal::new());
    let clock = ManualClock::new(NOON);
    let menu = BTreeMap::from([(1, 30)]);

    let engine = engine_on(journal.clone(), &clock, menu.clone());
    engine.new_ticket(BAKERY, BTreeMap::from([(1, 2)])).await.unwrap();
    engine.new_ticket(BAKERY, BTreeMap::from([(1, 1)])).await.unwrap();
    engine.new_bread(BAKERY).await.unwrap();
    drain_journal_tasks().await;

    // Simulated process restart: a new engine over the same journal.
    let restarted = engine_on(journal, &clock, menu);
    restarted.initialize_bakery(BAKERY).await.unwrap();

    // The oven resumes exactly where it was: ticket 1 with one bread made.
    let preview = restarted.current_cook_customer(BAKERY).await.unwrap();
    assert!(matches!(preview, NewBreadResponse::Customer { customer_id: 1, .. }), "restart must not restart the in-progress customer, got {:?}", preview);

    let status = restarted.queue_status(BAKERY, 2).await.unwrap();
    assert_eq!(status.people_in_queue, 1);

    // Numbering continues above everything the journal knows about.
    let next = restarted.new_ticket(BAKERY, BTreeMap::from([(1, 1)])).await.unwrap();
    assert!(next.ticket_number > 2, "recovered numbering must stay above journaled tickets, got {}", next.ticket_number);
    assert!(!next.show_on_display, "a non-empty bread log leaves the display flag cleared");
}

#[tokio::test]
async fn restart_restores_the_wait_list() {
    let journal = Arc::new(MemoryJournal::new());
    let clock = ManualClock::new(NOON);
    let menu = BTreeMap::from([(1, 30)]);

    let engine = engine_on(journal.clone(), &clock, menu.clone());
    engine.new_ticket(BAKERY, BTreeMap::from([(1, 2)])).await.unwrap();
    engine.send_current_to_wait_list(BAKERY).await.unwrap();
    drain_journal_tasks().await;

    let restarted = engine_on(journal, &clock, menu);
    restarted.initialize_bakery(BAKERY).await.unwrap();

    assert!(restarted.is_ticket_in_wait_list(BAKERY, 1).await.unwrap().is_ticket_in_wait_list);

    let served = restarted.serve_ticket(BAKERY, 1).await.unwrap();
    assert_eq!(served.user_detail, BTreeMap::from([(1, 2)]));
}

#[tokio::test]
async fn fresh_state_seeds_numbering_from_journal_rows() {
    let journal = Arc::new(MemoryJournal::new());
    let clock = ManualClock::new(NOON);
    let date = local_date(&clock);

    // Only customer rows exist, no snapshot: the cache was lost.
    journal
        .record_customer(
            date,
            JournalCustomer {
                ticket_id: 9,
                bakery_id: BAKERY,
                is_in_queue: true,
                register_date: date.to_string(),
                token: "SEED9".to_string(),
                breads: BTreeMap::from([(1, 1)]),
            },
        )
        .await
        .unwrap();

    let engine = engine_on(journal, &clock, BTreeMap::from([(1, 30)]));

    let ticket = engine.new_ticket(BAKERY, BTreeMap::from([(1, 1)])).await.unwrap();
    assert_eq!(ticket.ticket_number, 10, "next_number seeds from the highest journaled ticket plus one");
}

#[tokio::test]
async fn per_day_state_expires_at_the_date_boundary() {
    let journal = Arc::new(MemoryJournal::new());
    let clock = ManualClock::new(NOON);

    let engine = engine_on(journal, &clock, BTreeMap::from([(1, 30)]));
    engine.new_ticket(BAKERY, BTreeMap::from([(1, 1)])).await.unwrap();
    drain_journal_tasks().await;

    clock.advance(86_400);

    match engine.queue_status(BAKERY, 1).await {
        Err(Error::TicketNotFound(1)) => {}
        other => panic!("yesterday's ticket must be gone after the date rollover, got {:?}", other),
    }

    let ticket = engine.new_ticket(BAKERY, BTreeMap::from([(1, 1)])).await.unwrap();
    assert_eq!(ticket.ticket_number, 1, "numbering restarts with the new day");
}

#[tokio::test]
async fn midnight_reset_purges_and_zeroes_the_timeout() {
    let journal = Arc::new(MemoryJournal::new());
    let clock = ManualClock::new(NOON);

    let engine = engine_on(journal, &clock, BTreeMap::from([(1, 30)]));
    engine.new_ticket(BAKERY, BTreeMap::from([(1, 1)])).await.unwrap();
    engine.update_timeout(BAKERY, 300).await.unwrap();
    drain_journal_tasks().await;

    clock.advance(86_400);
    engine.midnight_reset().await;

    match engine.queue_status(BAKERY, 1).await {
        Err(Error::TicketNotFound(1)) => {}
        other => panic!("per-bakery keys must be wiped at midnight, got {:?}", other),
    }

    engine.new_ticket(BAKERY, BTreeMap::from([(1, 1)])).await.unwrap();
    let status = engine.queue_status(BAKERY, 1).await.unwrap();
    assert_eq!(status.in_queue_customers_time, 30, "the additive timeout padding resets at midnight");
}

#[tokio::test]
async fn file_journal_survives_a_full_process_restart() {
    use bakery_queue::store::journal::FileJournal;

    let dir = std::env::temp_dir().join(format!("bakery-e2e-{}", uuid::Uuid::new_v4()));
    let clock = ManualClock::new(NOON);
    let menu = BTreeMap::from([(1, 30)]);

    {
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let engine = Arc::new(QueueEngine::new(vec![config(menu.clone())], Arc::new(FileJournal::new(&dir)), shared, TZ));

        engine.new_ticket(BAKERY, BTreeMap::from([(1, 2)])).await.unwrap();
        engine.new_bread(BAKERY).await.unwrap();
        drain_journal_tasks().await;
    }

    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let restarted = Arc::new(QueueEngine::new(vec![config(menu)], Arc::new(FileJournal::new(&dir)), shared, TZ));
    restarted.initialize_bakery(BAKERY).await.unwrap();

    let preview = restarted.current_cook_customer(BAKERY).await.unwrap();
    assert!(matches!(preview, NewBreadResponse::Customer { customer_id: 1, .. }), "got {:?}", preview);

    let status = restarted.queue_status(BAKERY, 1).await.unwrap();
    assert!(!status.ready);
    assert!(!status.accurate_time, "one of two breads made keeps the estimate modelled");

    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

#[tokio::test]
async fn recalibration_consumes_the_diff_series_and_shifts_the_menu() {
    let journal = Arc::new(MemoryJournal::new());
    let clock = ManualClock::new(NOON);

    let engine = engine_on(journal, &clock, BTreeMap::from([(1, 30), (2, 40)]));

    // One big order keeps the oven busy; 17 breads at a steady 45s pace
    // yield 16 clean inter-bread intervals.
    engine.new_ticket(BAKERY, BTreeMap::from([(1, 17), (2, 0)])).await.unwrap();
    for _ in 0..17 {
        engine.new_bread(BAKERY).await.unwrap();
        clock.advance(45);
    }

    let applied = engine.recalibrate_prep_times(BAKERY).await.unwrap();
    assert_eq!(applied, Some(45));

    // Configured average was 35; the whole menu shifts by the 10s gap.
    let menu = engine.hardware_init(BAKERY).await.unwrap();
    assert_eq!(menu, BTreeMap::from([(1, 40), (2, 50)]));

    let again = engine.recalibrate_prep_times(BAKERY).await.unwrap();
    assert_eq!(again, None, "the diff series is consumed by recalibration");
}
