//! Tests for components/payload.rs

use kodegen_mobile_push::{
    DevicePlatform, InvalidMessage, MessageNormalizer, NotificationPayload, Priority,
    RemoteMessage,
};
use serde_json::json;

fn android() -> MessageNormalizer {
    MessageNormalizer::new(DevicePlatform::Android { api_level: 34 }, "MainTabs")
}

fn ios() -> MessageNormalizer {
    MessageNormalizer::new(DevicePlatform::Ios, "MainTabs")
}

#[test]
fn test_normalize_is_idempotent() {
    let raw = RemoteMessage::new()
        .with_id("m-1")
        .with_notification("Exam schedule", "Your exam moved to 9:00")
        .with_data("screen", "ExamDetail")
        .with_data("params", r#"{"examId":"42"}"#);

    let first = android().normalize(&raw).unwrap();
    let second = android().normalize(&raw).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_missing_screen_falls_back_to_main_tabs() {
    let raw = RemoteMessage::new().with_notification("Reminder", "Bring your ID card");
    let payload = android().normalize(&raw).unwrap();
    assert_eq!(payload.screen.as_deref(), Some("MainTabs"));
    assert_eq!(payload.params, None);
}

#[test]
fn test_params_decoded_as_object() {
    let raw = RemoteMessage::new()
        .with_data("screen", "ExamDetail")
        .with_data("params", r#"{"examId":"42","seat":7}"#);

    let payload = android().normalize(&raw).unwrap();
    let params = payload.params.expect("params decoded");
    assert_eq!(params.get("examId"), Some(&json!("42")));
    assert_eq!(params.get("seat"), Some(&json!(7)));
}

#[test]
fn test_malformed_params_yield_none() {
    let raw = RemoteMessage::new()
        .with_notification("Results", "Scores are out")
        .with_data("screen", "Results")
        .with_data("params", "{not json");

    let payload = android().normalize(&raw).unwrap();
    assert_eq!(payload.params, None);
    assert_eq!(payload.screen.as_deref(), Some("Results"));
}

#[test]
fn test_empty_message_rejected() {
    assert_eq!(android().normalize(&RemoteMessage::new()), Err(InvalidMessage::Empty));
    assert_eq!(ios().normalize(&RemoteMessage::new()), Err(InvalidMessage::Empty));
}

#[test]
fn test_android_data_only_message_accepted() {
    let raw = RemoteMessage::new().with_data("screen", "Payments");
    let payload = android().normalize(&raw).unwrap();
    assert_eq!(payload.title, None);
    assert_eq!(payload.body, None);
    assert_eq!(payload.screen.as_deref(), Some("Payments"));
}

#[test]
fn test_ios_data_only_uses_data_title_and_message() {
    let raw = RemoteMessage::new()
        .with_data("title", "Registration open")
        .with_data("message", "Sign up before Friday")
        .with_data("screen", "RegisterExam");

    let payload = ios().normalize(&raw).unwrap();
    assert_eq!(payload.title.as_deref(), Some("Registration open"));
    assert_eq!(payload.body.as_deref(), Some("Sign up before Friday"));
}

#[test]
fn test_ios_data_only_without_presentation_rejected() {
    let raw = RemoteMessage::new().with_data("screen", "RegisterExam");
    assert_eq!(ios().normalize(&raw), Err(InvalidMessage::MissingPresentation));
}

#[test]
fn test_provider_priority_hint_wins_over_data() {
    let raw = RemoteMessage::new()
        .with_notification("Fee due", "Pay today")
        .with_priority("high")
        .with_data("priority", "low");
    assert_eq!(android().normalize(&raw).unwrap().priority, Priority::High);

    let unknown = RemoteMessage::new()
        .with_notification("Fee due", "Pay today")
        .with_priority("urgent-ish");
    assert_eq!(android().normalize(&unknown).unwrap().priority, Priority::Normal);
}

#[test]
fn test_default_channel() {
    let raw = RemoteMessage::new().with_notification("Hello", "World");
    assert_eq!(android().normalize(&raw).unwrap().channel_id, "default");
}

#[test]
fn test_sub_tab_from_data() {
    let raw = RemoteMessage::new()
        .with_notification("New score", "Check your results")
        .with_data("tab", " Results ");
    let payload: NotificationPayload = android().normalize(&raw).unwrap();
    assert_eq!(payload.sub_tab(), Some("Results"));
}

#[test]
fn test_remote_message_from_provider_json() {
    let raw: RemoteMessage = serde_json::from_value(json!({
        "messageId": "0:1700000000%abc",
        "notification": { "title": "Hi", "androidChannelId": "exam-updates" },
        "data": { "screen": "ExamDetail" }
    }))
    .unwrap();

    let payload = android().normalize(&raw).unwrap();
    assert_eq!(payload.message_id.as_deref(), Some("0:1700000000%abc"));
    assert_eq!(payload.channel_id, "exam-updates");
    assert_eq!(payload.body, None);
}
