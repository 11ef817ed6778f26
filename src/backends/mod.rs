// Collaborator seams - push provider SDK, durable storage, navigation, native display
// Each seam is a trait object so hosts inject the real SDK bindings and tests inject fakes

pub mod file;
pub mod memory;

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::components::{AuthorizationState, Priority, PushResult, RemoteMessage};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Boxed future returned by collaborator traits
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Events emitted by the push provider subscriptions
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// `onMessage`: message received while the app is in the foreground
    ForegroundMessage(RemoteMessage),
    /// Background handler: message received while backgrounded or quit
    BackgroundMessage(RemoteMessage),
    /// `onNotificationOpenedApp`: user tapped a tray notification
    NotificationOpenedApp(RemoteMessage),
    /// `onTokenRefresh`: provider rotated the device token
    TokenRefreshed(String),
}

/// Push provider SDK (cloud messaging)
pub trait PushProvider: Send + Sync {
    fn has_permission(&self) -> BoxFuture<'_, PushResult<AuthorizationState>>;

    fn request_permission(&self) -> BoxFuture<'_, PushResult<AuthorizationState>>;

    fn get_token(&self) -> BoxFuture<'_, PushResult<String>>;

    fn delete_token(&self) -> BoxFuture<'_, PushResult<()>>;

    /// Whether the device is registered for remote messages (iOS)
    fn is_device_registered(&self) -> bool {
        true
    }

    fn register_device(&self) -> BoxFuture<'_, PushResult<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Platform-native (APNs) token, if the OS has issued one yet (iOS)
    fn apns_token(&self) -> BoxFuture<'_, PushResult<Option<String>>> {
        Box::pin(async { Ok(None) })
    }

    /// One-shot query for the notification that cold-started the app
    fn initial_notification(&self) -> BoxFuture<'_, PushResult<Option<RemoteMessage>>>;

    /// Register the standing subscriptions. Events arrive in provider order.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent>;
}

/// String key/value persistence surviving process restart
pub trait DurableStore: Send + Sync {
    fn get_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, PushResult<Option<String>>>;

    fn set_item<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, PushResult<()>>;

    fn remove_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, PushResult<()>>;
}

/// Navigation container of the host app
pub trait Navigator: Send + Sync {
    fn is_ready(&self) -> bool;

    fn navigate(&self, screen: &str, params: Option<&Map<String, Value>>) -> PushResult<()>;
}

/// Android notification channel description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub id: String,
    pub name: String,
    pub importance: Priority,
}

impl ChannelSpec {
    pub fn for_channel(id: impl Into<String>, importance: Priority) -> Self {
        let id = id.into();
        let name = if id == "default" {
            "Default".to_string()
        } else {
            id.clone()
        };
        Self {
            id,
            name,
            importance,
        }
    }
}

/// System notification handed to the native display SDK
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySpec {
    pub id: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub channel_id: String,
    pub priority: Priority,
    /// Round-tripped back on press so the tap can be routed
    pub data: HashMap<String, String>,
}

/// Optional native notification-display SDK
pub trait NativeDisplay: Send + Sync {
    /// Feature-detection probe, consulted once when the capability is resolved
    fn is_supported(&self) -> bool;

    fn create_channel(&self, spec: ChannelSpec) -> BoxFuture<'_, PushResult<String>>;

    fn display_notification(&self, spec: DisplaySpec) -> BoxFuture<'_, PushResult<()>>;
}

/// Native display capability resolved once at startup
#[derive(Clone, Default)]
pub enum NativeCapability {
    Available(Arc<dyn NativeDisplay>),
    #[default]
    Unavailable,
}

impl NativeCapability {
    /// Resolve the capability from an optional SDK binding
    pub fn probe(candidate: Option<Arc<dyn NativeDisplay>>) -> Self {
        match candidate {
            Some(display) if display.is_supported() => NativeCapability::Available(display),
            Some(_) => {
                tracing::info!("Native notification display present but not supported on this device");
                NativeCapability::Unavailable
            },
            None => NativeCapability::Unavailable,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, NativeCapability::Available(_))
    }
}

impl std::fmt::Debug for NativeCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeCapability::Available(_) => f.write_str("Available"),
            NativeCapability::Unavailable => f.write_str("Unavailable"),
        }
    }
}

/// Durable store backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StoreBackend {
    /// Process-local map, lost on restart
    #[default]
    Memory,
    /// JSON document on disk
    File(PathBuf),
}

/// Factory for durable store backends
pub struct StoreBackendFactory;

impl StoreBackendFactory {
    pub fn create_store(backend: &StoreBackend) -> Arc<dyn DurableStore> {
        match backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::File(path) => Arc::new(FileStore::new(path.clone())),
        }
    }
}
