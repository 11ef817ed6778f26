// Push pipeline components
// Permission gating, token lifecycle, normalization, routing and deep-link dispatch

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod config;
pub mod dispatcher;
pub mod payload;
pub mod pending;
pub mod permission;
pub mod retry;
pub mod router;
pub mod serde_time;
pub mod token;

pub use config::PipelineConfig;
pub use dispatcher::{
    DeepLink, DeepLinkDispatcher, DispatchOutcome, DispatchTarget, NavigationRequest,
    ReadinessGate,
};
pub use payload::{
    InvalidMessage, MessageNormalizer, NotificationPayload, PayloadSummary, RemoteMessage,
    RemoteNotification,
};
pub use pending::{PendingDelivery, PendingDeliveryStore, PendingItem};
pub use permission::{AuthorizationState, PermissionGate, SystemPermissions};
pub use retry::RetryPolicy;
pub use router::{DeliveryRouter, ForegroundOutcome, ListenerError, PopupSubscription};
pub use token::{DeviceToken, RefreshOutcome, TokenManager};

/// Delivery priority carried by a normalized payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Silent or informational pushes
    Low = 1,
    /// Regular pushes
    #[default]
    Normal = 2,
    /// Heads-up pushes (exam reminders, payment results)
    High = 3,
}

impl Priority {
    /// Parse a provider priority hint. FCM uses `high`/`normal`, the native
    /// display SDKs also emit `max`/`min`.
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint.trim().to_ascii_lowercase().as_str() {
            "high" | "max" => Some(Priority::High),
            "normal" | "default" => Some(Priority::Normal),
            "low" | "min" => Some(Priority::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

/// Mobile platform the pipeline runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DevicePlatform {
    /// iOS with APNs behind the provider
    Ios,
    /// Android with the OS API level (33+ gates `POST_NOTIFICATIONS`)
    Android { api_level: u32 },
}

impl Default for DevicePlatform {
    fn default() -> Self {
        DevicePlatform::Android { api_level: 33 }
    }
}

impl DevicePlatform {
    /// Android API level that introduced the runtime notification permission
    pub const POST_NOTIFICATIONS_API_LEVEL: u32 = 33;

    pub fn name(&self) -> &'static str {
        match self {
            DevicePlatform::Ios => "iOS",
            DevicePlatform::Android { .. } => "Android",
        }
    }

    pub fn is_ios(&self) -> bool {
        matches!(self, DevicePlatform::Ios)
    }

    /// Whether the OS-level notification permission must be requested in
    /// addition to the provider permission
    pub fn requires_os_notification_permission(&self) -> bool {
        matches!(
            self,
            DevicePlatform::Android { api_level } if *api_level >= Self::POST_NOTIFICATIONS_API_LEVEL
        )
    }

    /// iOS only presents alerts that carry a title or body
    pub fn requires_explicit_title(&self) -> bool {
        self.is_ios()
    }

    /// Android can show a system notification for foreground messages through
    /// the native display capability
    pub fn supports_native_tray(&self) -> bool {
        matches!(self, DevicePlatform::Android { .. })
    }
}

/// App lifecycle state as observed from the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AppLifecycle {
    #[default]
    Foreground,
    Background,
    Quit,
}

/// Handle identifying a registered popup listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors raised by collaborators and stores
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// Push provider SDK call failed
    #[error("Provider error during {operation}: {message}")]
    ProviderError {
        operation: &'static str,
        message: String,
    },
    /// Durable storage read or write failed
    #[error("Storage error for key '{key}': {message}")]
    StorageError { key: String, message: String },
    /// Stored value could not be encoded or decoded
    #[error("Serialization error for key '{key}': {source}")]
    SerializationError {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// Platform permission API failed
    #[error("Permission error on {platform}: {message}")]
    PermissionError {
        platform: &'static str,
        message: String,
    },
    /// Native notification display SDK failed
    #[error("Native display error: {message}")]
    NativeDisplayError { message: String },
    /// Deep link could not be resolved into a navigation target
    #[error("Invalid deep link '{url}': {reason}")]
    InvalidDeepLink { url: String, reason: String },
    /// Navigation collaborator rejected a route
    #[error("Navigation to '{screen}' failed: {message}")]
    NavigationError { screen: String, message: String },
    #[error("Invalid configuration: {message}")]
    ConfigError { message: String },
    #[error("IO error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl PushError {
    pub fn provider(operation: &'static str, message: impl Into<String>) -> Self {
        PushError::ProviderError {
            operation,
            message: message.into(),
        }
    }

    pub fn storage(key: impl Into<String>, message: impl Into<String>) -> Self {
        PushError::StorageError {
            key: key.into(),
            message: message.into(),
        }
    }
}

pub type PushResult<T> = Result<T, PushError>;
