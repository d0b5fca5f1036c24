//! File-backed state store tests
//!
//! Everything a run relies on between invocations has to survive closing
//! and reopening the database file.

use tempfile::TempDir;

use lws_fulfillment::config::StoreConfig;
use lws_fulfillment::store::{DerivedIds, OrderStatus, OrderUpdate, PoMapping, StateStore};

fn store_config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        url: format!("sqlite://{}/nested/state.db", dir.path().display()),
        max_connections: 2,
    }
}

#[tokio::test]
async fn test_open_creates_missing_directories() {
    let dir = TempDir::new().unwrap();
    let config = store_config(&dir);

    let store = StateStore::open(&config).await.unwrap();
    store.close().await;

    assert!(dir.path().join("nested").join("state.db").exists());
}

#[tokio::test]
async fn test_progress_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let config = store_config(&dir);

    let store = StateStore::open(&config).await.unwrap();
    store
        .record_progress(
            &OrderUpdate::new(1001, OrderStatus::InProgress, "SO_P2")
                .run("run-1")
                .ids(DerivedIds {
                    base_item_code: Some("LWS-100".to_string()),
                    job_site_a: Some("P4J-1001".to_string()),
                    po_number: Some(5001),
                    ..DerivedIds::default()
                }),
        )
        .await
        .unwrap();
    store
        .record_po_mapping(&PoMapping {
            order_id: 1001,
            item_code: "16P4-LWS-100".to_string(),
            po_number: 5001,
            po_line: 1,
            sales_order_site_b: None,
            so_line: None,
            shipping_request: None,
        })
        .await
        .unwrap();
    store.enqueue(1002).await.unwrap();
    store.close().await;

    let reopened = StateStore::open(&config).await.unwrap();
    let order = reopened.order(1001).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::InProgress);
    assert_eq!(order.last_step, "SO_P2");
    assert_eq!(order.last_run_id.as_deref(), Some("run-1"));
    assert_eq!(order.ids.job_site_a.as_deref(), Some("P4J-1001"));
    assert_eq!(order.ids.po_number, Some(5001));

    let mappings = reopened.po_mappings(1001).await.unwrap();
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].po_line, 1);

    assert_eq!(reopened.pending_queue().await.unwrap(), vec![1002]);
    reopened.close().await;
}

#[tokio::test]
async fn test_reopen_does_not_rerun_migrations_destructively() {
    let dir = TempDir::new().unwrap();
    let config = store_config(&dir);

    let store = StateStore::open(&config).await.unwrap();
    store
        .record_progress(&OrderUpdate::new(1001, OrderStatus::Complete, "COMPLETE"))
        .await
        .unwrap();
    store.close().await;

    for _ in 0..2 {
        let store = StateStore::open(&config).await.unwrap();
        assert!(store.is_complete(1001).await.unwrap());
        store.close().await;
    }
}
