// Provider message shapes and their normalization into one canonical payload

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{DevicePlatform, Priority};

/// Data key naming the navigation target
pub const SCREEN_KEY: &str = "screen";
/// Data key holding JSON-encoded navigation params
pub const PARAMS_KEY: &str = "params";
/// Data key naming a sub-tab of the main tab container
pub const TAB_KEY: &str = "tab";

/// Raw message as delivered by the push provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteMessage {
    pub message_id: Option<String>,
    pub notification: Option<RemoteNotification>,
    pub data: HashMap<String, String>,
    /// Provider delivery priority hint (`high`, `normal`)
    pub priority: Option<String>,
}

impl RemoteMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_notification(mut self, title: impl Into<String>, body: impl Into<String>) -> Self {
        self.notification = Some(RemoteNotification {
            title: Some(title.into()),
            body: Some(body.into()),
            android_channel_id: None,
        });
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }
}

/// Display part of a provider message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteNotification {
    pub title: Option<String>,
    pub body: Option<String>,
    pub android_channel_id: Option<String>,
}

/// Canonical, provider-agnostic notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub message_id: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub data: HashMap<String, String>,
    pub screen: Option<String>,
    pub params: Option<Map<String, Value>>,
    #[serde(default)]
    pub priority: Priority,
    pub channel_id: String,
}

impl NotificationPayload {
    /// Sub-tab to open inside the main tab container
    pub fn sub_tab(&self) -> Option<&str> {
        self.data
            .get(TAB_KEY)
            .map(|tab| tab.trim())
            .filter(|tab| !tab.is_empty())
    }

    pub fn summary(&self, received_at: DateTime<Utc>) -> PayloadSummary {
        PayloadSummary {
            message_id: self.message_id.clone(),
            title: self.title.clone(),
            body: self.body.clone(),
            screen: self.screen.clone(),
            received_at,
        }
    }
}

/// Diagnostic record of a notification received in the background
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSummary {
    pub message_id: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub screen: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Reasons a message is not actionable
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidMessage {
    #[error("message has neither a notification title nor usable data")]
    Empty,
    #[error("message has no title or body to present")]
    MissingPresentation,
}

/// Converts provider messages into [`NotificationPayload`]s
#[derive(Debug, Clone)]
pub struct MessageNormalizer {
    platform: DevicePlatform,
    fallback_screen: String,
}

impl MessageNormalizer {
    pub fn new(platform: DevicePlatform, fallback_screen: impl Into<String>) -> Self {
        Self {
            platform,
            fallback_screen: fallback_screen.into(),
        }
    }

    pub fn fallback_screen(&self) -> &str {
        &self.fallback_screen
    }

    /// Normalize a raw message. Pure: equal inputs give equal payloads.
    pub fn normalize(&self, raw: &RemoteMessage) -> Result<NotificationPayload, InvalidMessage> {
        let notification = raw.notification.as_ref();
        let notification_title = notification.and_then(|n| non_empty(n.title.as_deref()));
        let notification_body = notification.and_then(|n| non_empty(n.body.as_deref()));

        let has_usable_data = raw.data.values().any(|value| !value.trim().is_empty());
        if notification_title.is_none() && !has_usable_data {
            return Err(InvalidMessage::Empty);
        }

        let (title, body) = if self.platform.requires_explicit_title()
            && notification_title.is_none()
            && notification_body.is_none()
        {
            let data_title = non_empty(raw.data.get("title").map(String::as_str));
            let data_message = non_empty(raw.data.get("message").map(String::as_str));
            if data_title.is_none() && data_message.is_none() {
                return Err(InvalidMessage::MissingPresentation);
            }
            (data_title, data_message)
        } else {
            (notification_title, notification_body)
        };

        let screen = non_empty(raw.data.get(SCREEN_KEY).map(String::as_str))
            .unwrap_or_else(|| self.fallback_screen.clone());

        let params = raw.data.get(PARAMS_KEY).and_then(|encoded| {
            decode_params(encoded, raw.message_id.as_deref())
        });

        let priority = raw
            .priority
            .as_deref()
            .and_then(Priority::from_hint)
            .or_else(|| raw.data.get("priority").and_then(|p| Priority::from_hint(p)))
            .unwrap_or_default();

        let channel_id = notification
            .and_then(|n| non_empty(n.android_channel_id.as_deref()))
            .or_else(|| non_empty(raw.data.get("channelId").map(String::as_str)))
            .unwrap_or_else(|| "default".to_string());

        Ok(NotificationPayload {
            message_id: raw.message_id.clone(),
            title,
            body,
            data: raw.data.clone(),
            screen: Some(screen),
            params,
            priority,
            channel_id,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn decode_params(encoded: &str, message_id: Option<&str>) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(encoded) {
        Ok(Value::Object(map)) => Some(map),
        Ok(other) => {
            tracing::debug!(message_id, kind = ?other, "Ignoring non-object navigation params");
            None
        },
        Err(e) => {
            tracing::debug!(message_id, error = %e, "Ignoring undecodable navigation params");
            None
        },
    }
}
