//! Tests for components/pending.rs

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use kodegen_mobile_push::{
    DurableStore, FileStore, MemoryStore, NotificationPayload, PayloadSummary, PendingDeliveryStore,
    PendingItem, PipelineConfig, Priority,
};
use tokio_test::assert_ok;

use crate::common::UndeletableStore;

fn store(memory: &MemoryStore) -> PendingDeliveryStore {
    PendingDeliveryStore::new(Arc::new(memory.clone()), &PipelineConfig::default())
}

fn register_exam() -> NotificationPayload {
    NotificationPayload {
        message_id: Some("m-7".to_string()),
        title: Some("Registration open".to_string()),
        body: None,
        data: HashMap::from([("screen".to_string(), "RegisterExam".to_string())]),
        screen: Some("RegisterExam".to_string()),
        params: None,
        priority: Priority::High,
        channel_id: "default".to_string(),
    }
}

fn summary(id: &str) -> PayloadSummary {
    PayloadSummary {
        message_id: Some(id.to_string()),
        title: None,
        body: None,
        screen: Some("MainTabs".to_string()),
        received_at: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
    }
}

#[tokio::test]
async fn test_pending_link_drained_once() {
    let memory = MemoryStore::new();
    let pending = store(&memory);

    assert_ok!(
        pending
            .enqueue(PendingItem::Link("examreg://notification/Payments".to_string()))
            .await
    );

    let first = assert_ok!(pending.drain_pending_link().await);
    assert_eq!(first.as_deref(), Some("examreg://notification/Payments"));
    assert_eq!(assert_ok!(pending.drain_pending_link().await), None);
}

#[tokio::test]
async fn test_pending_notification_drained_once() {
    let memory = MemoryStore::new();
    let pending = store(&memory);

    pending.enqueue(PendingItem::Notification(register_exam())).await.unwrap();

    let delivery = pending.drain_pending_notification().await.unwrap().expect("held");
    assert_eq!(delivery.item, PendingItem::Notification(register_exam()));
    assert!(pending.drain_pending_notification().await.unwrap().is_none());
    assert!(memory.is_empty());
}

#[tokio::test]
async fn test_newer_item_of_same_kind_replaces_older() {
    let memory = MemoryStore::new();
    let pending = store(&memory);

    pending
        .enqueue(PendingItem::Link("examreg://notification/Payments".to_string()))
        .await
        .unwrap();
    pending
        .enqueue(PendingItem::Link("examreg://notification/Results".to_string()))
        .await
        .unwrap();

    assert_eq!(
        pending.drain_pending_link().await.unwrap().as_deref(),
        Some("examreg://notification/Results")
    );
}

#[tokio::test]
async fn test_link_and_notification_slots_are_independent() {
    let memory = MemoryStore::new();
    let pending = store(&memory);

    pending.enqueue(PendingItem::Notification(register_exam())).await.unwrap();
    pending
        .enqueue(PendingItem::Link("examreg://notification/Payments".to_string()))
        .await
        .unwrap();

    assert!(pending.drain_pending_link().await.unwrap().is_some());
    assert!(pending.drain_pending_notification().await.unwrap().is_some());
}

#[tokio::test]
async fn test_undecodable_notification_discarded() {
    let memory = MemoryStore::new();
    memory
        .set_item("push.pending_notification", "{\"kind\":".to_string())
        .await
        .unwrap();
    let pending = store(&memory);

    assert!(pending.drain_pending_notification().await.unwrap().is_none());
    assert!(!memory.contains_key("push.pending_notification"));
}

#[tokio::test]
async fn test_background_list_keeps_newest() {
    let memory = MemoryStore::new();
    let config = PipelineConfig::default().with_max_background_notifications(2);
    let pending = PendingDeliveryStore::new(Arc::new(memory.clone()), &config);

    for id in ["a", "b", "c"] {
        pending.record_background(summary(id)).await.unwrap();
    }

    let drained = pending.drain_background_notifications().await.unwrap();
    let ids: Vec<_> = drained.iter().filter_map(|s| s.message_id.as_deref()).collect();
    assert_eq!(ids, ["b", "c"]);
    assert!(pending.drain_background_notifications().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pending_link_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("push-store.json");

    let before = PendingDeliveryStore::new(Arc::new(FileStore::new(&path)), &PipelineConfig::default());
    before
        .enqueue(PendingItem::Link("examreg://notification/RegisterExam".to_string()))
        .await
        .unwrap();
    drop(before);

    let after = PendingDeliveryStore::new(Arc::new(FileStore::new(&path)), &PipelineConfig::default());
    assert_eq!(
        after.drain_pending_link().await.unwrap().as_deref(),
        Some("examreg://notification/RegisterExam")
    );
    assert_eq!(after.drain_pending_link().await.unwrap(), None);
}

#[tokio::test]
async fn test_drain_survives_failed_removal() {
    let memory = MemoryStore::new();
    let pending = PendingDeliveryStore::new(
        Arc::new(UndeletableStore(memory.clone())),
        &PipelineConfig::default(),
    );
    assert_ok!(pending.enqueue(PendingItem::Notification(register_exam())).await);
    assert_ok!(
        pending
            .enqueue(PendingItem::Link("examreg://notification/Results".to_string()))
            .await
    );

    let delivery = assert_ok!(pending.drain_pending_notification().await).expect("value returned");
    assert_eq!(delivery.item, PendingItem::Notification(register_exam()));
    assert_eq!(
        assert_ok!(pending.drain_pending_link().await).as_deref(),
        Some("examreg://notification/Results")
    );
    assert!(memory.contains_key("push.pending_notification"));
}
