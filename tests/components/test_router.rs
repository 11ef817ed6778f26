//! Tests for components/router.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use kodegen_mobile_push::{
    DeepLinkDispatcher, DeliveryRouter, DevicePlatform, DispatchOutcome, ForegroundOutcome,
    InvalidMessage, ListenerError, MemoryStore, MessageNormalizer, NativeCapability,
    NativeDisplay, NotificationPayload, PendingDeliveryStore, PendingItem, PipelineConfig,
    Priority, ReadinessGate, RemoteMessage,
};

use crate::common::{FakeDisplay, FakeNavigator};

struct Fixture {
    router: DeliveryRouter,
    navigator: Arc<FakeNavigator>,
    store: MemoryStore,
}

fn fixture(
    platform: DevicePlatform,
    navigator: Arc<FakeNavigator>,
    display: Option<Arc<dyn NativeDisplay>>,
) -> Fixture {
    let config = PipelineConfig::default();
    let store = MemoryStore::new();
    let router = DeliveryRouter::new(
        MessageNormalizer::new(platform, config.fallback_screen.clone()),
        platform,
        PendingDeliveryStore::new(Arc::new(store.clone()), &config),
        DeepLinkDispatcher::new(navigator.clone(), ReadinessGate::new(), &config),
        NativeCapability::probe(display),
    );
    Fixture {
        router,
        navigator,
        store,
    }
}

fn android() -> DevicePlatform {
    DevicePlatform::Android { api_level: 34 }
}

fn exam_reminder(id: &str) -> RemoteMessage {
    RemoteMessage::new()
        .with_id(id)
        .with_notification("Exam tomorrow", "Room 4B, 8:30")
        .with_data("screen", "ExamDetail")
}

fn counting_listener(
    counter: &Arc<AtomicUsize>,
) -> impl Fn(&NotificationPayload) -> Result<(), ListenerError> + Send + Sync + 'static {
    let counter = counter.clone();
    move |_payload| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_foreground_message_reaches_every_listener() {
    let fx = fixture(android(), FakeNavigator::ready(), None);
    let counter = Arc::new(AtomicUsize::new(0));
    fx.router.subscribe_popup(counting_listener(&counter));
    fx.router.subscribe_popup(counting_listener(&counter));

    let outcome = fx.router.on_foreground_message(&exam_reminder("m-1")).await;

    assert_eq!(outcome, ForegroundOutcome::Delivered {
        listeners: 2,
        failed_listeners: 0,
        native_displayed: false,
    });
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failing_listeners_do_not_block_others() {
    let fx = fixture(android(), FakeNavigator::ready(), None);
    let counter = Arc::new(AtomicUsize::new(0));
    fx.router.subscribe_popup(|_payload| Err("popup host unmounted".into()));
    fx.router.subscribe_popup(|_payload| panic!("render crashed"));
    fx.router.subscribe_popup(counting_listener(&counter));

    let outcome = fx.router.on_foreground_message(&exam_reminder("m-2")).await;

    assert_eq!(outcome, ForegroundOutcome::Delivered {
        listeners: 3,
        failed_listeners: 2,
        native_displayed: false,
    });
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_native_display_failure_keeps_popup() {
    let display = Arc::new(FakeDisplay {
        fail_display: true,
        ..FakeDisplay::default()
    });
    let fx = fixture(android(), FakeNavigator::ready(), Some(display.clone()));
    let counter = Arc::new(AtomicUsize::new(0));
    fx.router.subscribe_popup(counting_listener(&counter));

    let outcome = fx.router.on_foreground_message(&exam_reminder("m-3")).await;

    assert_eq!(outcome, ForegroundOutcome::Delivered {
        listeners: 1,
        failed_listeners: 0,
        native_displayed: false,
    });
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(display.displayed.lock().is_empty());
}

#[tokio::test]
async fn test_native_display_creates_channel_once() {
    let display = Arc::new(FakeDisplay::default());
    let fx = fixture(android(), FakeNavigator::ready(), Some(display.clone()));

    let first = fx.router.on_foreground_message(&exam_reminder("m-4")).await;
    let second = fx
        .router
        .on_foreground_message(&exam_reminder("m-5").with_priority("high"))
        .await;

    assert!(matches!(first, ForegroundOutcome::Delivered { native_displayed: true, .. }));
    assert!(matches!(second, ForegroundOutcome::Delivered { native_displayed: true, .. }));

    let channels = display.channels.lock();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].id, "default");
    assert_eq!(channels[0].name, "Default");

    let displayed = display.displayed.lock();
    assert_eq!(displayed.len(), 2);
    assert_eq!(displayed[1].priority, Priority::High);
    assert_eq!(displayed[1].data.get("screen").map(String::as_str), Some("ExamDetail"));
}

#[tokio::test]
async fn test_channel_failure_skips_display() {
    let display = Arc::new(FakeDisplay {
        fail_channel: true,
        ..FakeDisplay::default()
    });
    let fx = fixture(android(), FakeNavigator::ready(), Some(display.clone()));

    let outcome = fx.router.on_foreground_message(&exam_reminder("m-6")).await;

    assert!(matches!(outcome, ForegroundOutcome::Delivered { native_displayed: false, .. }));
    assert!(display.displayed.lock().is_empty());
}

#[tokio::test]
async fn test_unsupported_display_probes_unavailable() {
    let display = Arc::new(FakeDisplay {
        unsupported: true,
        ..FakeDisplay::default()
    });
    let fx = fixture(android(), FakeNavigator::ready(), Some(display.clone()));

    assert!(!fx.router.native_capability().is_available());
    fx.router.on_foreground_message(&exam_reminder("m-7")).await;
    assert!(display.displayed.lock().is_empty());
}

#[tokio::test]
async fn test_ios_never_uses_native_display() {
    let display = Arc::new(FakeDisplay::default());
    let fx = fixture(DevicePlatform::Ios, FakeNavigator::ready(), Some(display.clone()));

    let outcome = fx.router.on_foreground_message(&exam_reminder("m-8")).await;

    assert!(matches!(outcome, ForegroundOutcome::Delivered { native_displayed: false, .. }));
    assert!(display.channels.lock().is_empty());
}

#[tokio::test]
async fn test_invalid_foreground_message_dropped() {
    let fx = fixture(android(), FakeNavigator::ready(), None);
    let counter = Arc::new(AtomicUsize::new(0));
    fx.router.subscribe_popup(counting_listener(&counter));

    let outcome = fx.router.on_foreground_message(&RemoteMessage::new().with_id("m-9")).await;

    assert_eq!(outcome, ForegroundOutcome::Dropped(InvalidMessage::Empty));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unsubscribed_listener_not_called() {
    let fx = fixture(android(), FakeNavigator::ready(), None);
    let counter = Arc::new(AtomicUsize::new(0));
    let subscription = fx.router.subscribe_popup(counting_listener(&counter));
    assert_eq!(fx.router.listener_count(), 1);

    assert!(subscription.unsubscribe());
    fx.router.on_foreground_message(&exam_reminder("m-10")).await;

    assert_eq!(fx.router.listener_count(), 0);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_background_message_recorded_without_navigation() {
    let fx = fixture(android(), FakeNavigator::ready(), None);

    let payload = fx.router.on_background_message(&exam_reminder("m-11")).await;

    assert_eq!(payload.and_then(|p| p.screen).as_deref(), Some("ExamDetail"));
    assert!(fx.navigator.calls().is_empty());
    let summaries = fx.router.pending().drain_background_notifications().await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].message_id.as_deref(), Some("m-11"));
}

#[tokio::test]
async fn test_opened_notification_dispatched_once_per_id() {
    let fx = fixture(android(), FakeNavigator::ready(), None);
    let raw = exam_reminder("m-12").with_data("params", r#"{"examId":"42"}"#);

    let first = fx.router.on_notification_opened(&raw).await;
    let repeat = fx.router.on_notification_opened(&raw).await;

    assert!(matches!(first, Some(DispatchOutcome::Navigated(_))));
    assert_eq!(repeat, None);
    assert_eq!(fx.navigator.calls().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_opens_of_same_message_dispatch_once() {
    let fx = fixture(android(), FakeNavigator::ready(), None);
    let barrier = Arc::new(tokio::sync::Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let router = fx.router.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                router.on_notification_opened(&exam_reminder("m-race")).await
            })
        })
        .collect();

    let mut dispatched = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            dispatched += 1;
        }
    }

    assert_eq!(dispatched, 1);
    assert_eq!(fx.navigator.calls().len(), 1);
}

#[tokio::test]
async fn test_opened_without_id_always_dispatches() {
    let fx = fixture(android(), FakeNavigator::ready(), None);
    let raw = RemoteMessage::new().with_notification("Results", "Out now");

    fx.router.on_notification_opened(&raw).await;
    fx.router.on_notification_opened(&raw).await;

    assert_eq!(fx.navigator.calls().len(), 2);
    assert_eq!(fx.navigator.calls()[0].0, "MainTabs");
}

#[tokio::test]
async fn test_native_press_held_until_navigation_ready() {
    let fx = fixture(android(), FakeNavigator::not_ready(), None);
    let data = HashMap::from([("screen".to_string(), "RegisterExam".to_string())]);

    let outcome = fx.router.on_native_press(Some("m-13".to_string()), data).await;

    assert_eq!(outcome, None);
    assert!(fx.navigator.calls().is_empty());
    let held = fx.router.pending().drain_pending_notification().await.unwrap().unwrap();
    match held.item {
        PendingItem::Notification(payload) => {
            assert_eq!(payload.screen.as_deref(), Some("RegisterExam"))
        },
        other => panic!("unexpected pending item {other:?}"),
    }
}

#[tokio::test]
async fn test_native_press_routed_when_ready() {
    let fx = fixture(android(), FakeNavigator::ready(), None);
    let data = HashMap::from([("screen".to_string(), "Payments".to_string())]);

    let outcome = fx.router.on_native_press(Some("m-14".to_string()), data).await;

    assert!(matches!(outcome, Some(DispatchOutcome::Navigated(_))));
    assert_eq!(fx.navigator.calls()[0].0, "Payments");
    assert!(fx.store.is_empty());
}

#[tokio::test]
async fn test_deep_link_held_until_navigation_ready() {
    let fx = fixture(android(), FakeNavigator::not_ready(), None);

    assert_eq!(fx.router.on_deep_link("examreg://notification/Results").await, None);
    assert_eq!(
        fx.router.pending().drain_pending_link().await.unwrap().as_deref(),
        Some("examreg://notification/Results")
    );
}
