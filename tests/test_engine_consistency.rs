use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bakery_queue::api::hardware_dto::NewBreadResponse;
use bakery_queue::domain::bakery_state::BakeryConfig;
use bakery_queue::domain::clock::{Clock, ManualClock};
use bakery_queue::domain::reservation::BreadMenu;
use bakery_queue::queue::operations::QueueEngine;
use bakery_queue::store::journal::MemoryJournal;

const NOON: i64 = 1_750_000_000;

fn two_bakery_engine() -> Arc<QueueEngine> {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(NOON));
    let configs = vec![
        BakeryConfig { bakery_id: 1, menu: BreadMenu::new(BTreeMap::from([(1, 30)])), baking_time_s: 60, timeout_s: 0, upcoming_breads: Default::default() },
        BakeryConfig { bakery_id: 2, menu: BreadMenu::new(BTreeMap::from([(1, 45), (2, 45)])), baking_time_s: 300, timeout_s: 0, upcoming_breads: Default::default() },
    ];

    return Arc::new(QueueEngine::new(configs, Arc::new(MemoryJournal::new()), clock, chrono_tz::Tz::Asia__Tehran));
}

#[tokio::test]
async fn bakeries_are_isolated_from_each_other() {
    let engine = two_bakery_engine();

    engine.new_ticket(1, BTreeMap::from([(1, 1)])).await.unwrap();
    engine.new_ticket(1, BTreeMap::from([(1, 2)])).await.unwrap();
    engine.new_bread(1).await.unwrap();

    // Bakery 2 numbering and oven are untouched by bakery 1 traffic.
    let first = engine.new_ticket(2, BTreeMap::from([(1, 1), (2, 0)])).await.unwrap();
    assert_eq!(first.ticket_number, 1);

    let bread = engine.new_bread(2).await.unwrap();
    assert!(matches!(bread, NewBreadResponse::Customer { customer_id: 1, .. }));

    let status = engine.queue_status(2, 1).await.unwrap();
    assert_eq!(status.people_in_queue, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tickets_serialize_per_bakery() {
    let engine = two_bakery_engine();

    let mut handles = Vec::new();
    for _ in 0..24 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move { engine.new_ticket(1, BTreeMap::from([(1, 1)])).await.unwrap().ticket_number }));
    }

    let mut numbers = BTreeSet::new();
    for handle in handles {
        let number = handle.await.unwrap();
        assert!(numbers.insert(number), "ticket number {} was issued twice under concurrency", number);
    }

    assert_eq!(numbers.len(), 24);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_breads_and_tickets_keep_counts_consistent() {
    let engine = two_bakery_engine();

    for _ in 0..6 {
        engine.new_ticket(1, BTreeMap::from([(1, 2)])).await.unwrap();
    }

    // Twelve breads cover the six two-bread orders exactly, no matter how
    // the stamping interleaves with polling.
    let mut handles = Vec::new();
    for _ in 0..12 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move { engine.new_bread(1).await.unwrap() }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let preview = engine.current_cook_customer(1).await.unwrap();
    assert!(matches!(preview, NewBreadResponse::Customer { .. }), "the last stamped owner stays active, got {:?}", preview);

    // A thirteenth bread finds nobody incomplete.
    let extra = engine.new_bread(1).await.unwrap();
    assert_eq!(extra, NewBreadResponse::Idle { has_customer: false, belongs_to_customer: false });
}

#[tokio::test]
async fn response_wire_shapes_match_the_hardware_protocol() {
    let engine = two_bakery_engine();

    let ticket = engine.new_ticket(1, BTreeMap::from([(1, 2)])).await.unwrap();
    let encoded = serde_json::to_value(&ticket).unwrap();
    assert!(encoded.get("ticket_number").is_some());
    assert!(encoded.get("show_on_display").is_some());
    assert!(encoded.get("token").is_some());

    let bread = engine.new_bread(1).await.unwrap();
    let encoded = serde_json::to_value(&bread).unwrap();
    assert!(encoded.get("customer_id").is_some(), "a working oven reports the customer shape: {}", encoded);
    assert_eq!(encoded.get("customer_breads").unwrap(), &serde_json::json!({ "1": 2 }));

    let idle = engine.new_bread(1).await.unwrap();
    let encoded = serde_json::to_value(&idle).unwrap();
    assert_eq!(encoded.get("has_customer"), Some(&serde_json::json!(false)), "an idle oven reports the flag shape: {}", encoded);
    assert!(encoded.get("customer_id").is_none());
}
