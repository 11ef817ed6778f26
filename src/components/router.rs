// Delivery router - decides per message and lifecycle state whether to show an in-app
// popup, hand off to the native tray, record for later, or navigate

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;

use super::{
    DeepLinkDispatcher, DevicePlatform, DispatchOutcome, DispatchTarget, InvalidMessage,
    MessageNormalizer, NotificationPayload, PendingDeliveryStore, PendingItem, RemoteMessage,
    SubscriberId,
};
use crate::backends::{ChannelSpec, DisplaySpec, NativeCapability, NativeDisplay};

/// Error type popup listeners may return
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

type PopupCallback = Arc<dyn Fn(&NotificationPayload) -> Result<(), ListenerError> + Send + Sync>;
type ListenerList = Mutex<Vec<(SubscriberId, PopupCallback)>>;

/// How many message ids are remembered for de-duplication
const RECENT_MESSAGE_CAPACITY: usize = 64;

/// Result of routing a foreground message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForegroundOutcome {
    /// Message was not actionable and was dropped silently
    Dropped(InvalidMessage),
    Delivered {
        /// Listeners that were invoked
        listeners: usize,
        /// Listeners that returned an error or panicked
        failed_listeners: usize,
        /// Whether a system notification was shown through the native capability
        native_displayed: bool,
    },
}

/// Handle for a registered popup listener
#[derive(Debug)]
pub struct PopupSubscription {
    id: SubscriberId,
    listeners: Weak<ListenerList>,
}

impl PopupSubscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Remove the listener. Returns false when it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(listeners) = self.listeners.upgrade() else {
            return false;
        };
        let mut listeners = listeners.lock();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != self.id);
        listeners.len() != before
    }
}

// Normalized payloads and dispatch marks keyed by provider message id
#[derive(Debug, Default)]
struct RecentMessages {
    order: VecDeque<String>,
    payloads: HashMap<String, NotificationPayload>,
    dispatched: HashSet<String>,
}

impl RecentMessages {
    fn payload(&self, id: &str) -> Option<NotificationPayload> {
        self.payloads.get(id).cloned()
    }

    fn remember(&mut self, id: &str, payload: NotificationPayload) {
        self.touch(id);
        self.payloads.insert(id.to_string(), payload);
    }

    /// Returns false if the id was already marked
    fn mark_dispatched(&mut self, id: &str) -> bool {
        self.touch(id);
        self.dispatched.insert(id.to_string())
    }

    fn touch(&mut self, id: &str) {
        if self.payloads.contains_key(id) || self.dispatched.contains(id) {
            return;
        }
        self.order.push_back(id.to_string());
        while self.order.len() > RECENT_MESSAGE_CAPACITY {
            if let Some(evicted) = self.order.pop_front() {
                self.payloads.remove(&evicted);
                self.dispatched.remove(&evicted);
            }
        }
    }
}

/// Routes inbound messages according to the app lifecycle state
#[derive(Clone)]
pub struct DeliveryRouter {
    normalizer: MessageNormalizer,
    platform: DevicePlatform,
    pending: PendingDeliveryStore,
    dispatcher: DeepLinkDispatcher,
    native: NativeCapability,
    listeners: Arc<ListenerList>,
    created_channels: Arc<Mutex<HashSet<String>>>,
    recent: Arc<Mutex<RecentMessages>>,
}

impl DeliveryRouter {
    pub fn new(
        normalizer: MessageNormalizer,
        platform: DevicePlatform,
        pending: PendingDeliveryStore,
        dispatcher: DeepLinkDispatcher,
        native: NativeCapability,
    ) -> Self {
        Self {
            normalizer,
            platform,
            pending,
            dispatcher,
            native,
            listeners: Arc::new(Mutex::new(Vec::new())),
            created_channels: Arc::new(Mutex::new(HashSet::new())),
            recent: Arc::new(Mutex::new(RecentMessages::default())),
        }
    }

    pub fn normalizer(&self) -> &MessageNormalizer {
        &self.normalizer
    }

    pub fn dispatcher(&self) -> &DeepLinkDispatcher {
        &self.dispatcher
    }

    pub fn pending(&self) -> &PendingDeliveryStore {
        &self.pending
    }

    pub fn native_capability(&self) -> &NativeCapability {
        &self.native
    }

    /// Register an in-app popup listener, invoked for every valid foreground message
    pub fn subscribe_popup<F>(&self, callback: F) -> PopupSubscription
    where
        F: Fn(&NotificationPayload) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let id = SubscriberId::generate();
        self.listeners.lock().push((id, Arc::new(callback)));
        PopupSubscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Foreground message: fan out to popup listeners and, on Android, try a
    /// system notification through the native display capability
    pub async fn on_foreground_message(&self, raw: &RemoteMessage) -> ForegroundOutcome {
        let payload = match self.normalize_once(raw) {
            Ok(payload) => payload,
            Err(reason) => {
                tracing::debug!(message_id = raw.message_id.as_deref(), %reason, "Dropping foreground message");
                return ForegroundOutcome::Dropped(reason);
            },
        };

        let (listeners, failed_listeners) = self.notify_listeners(&payload);

        let native_displayed = match &self.native {
            NativeCapability::Available(display) if self.platform.supports_native_tray() => {
                self.display_native(display.as_ref(), &payload).await
            },
            _ => false,
        };

        ForegroundOutcome::Delivered {
            listeners,
            failed_listeners,
            native_displayed,
        }
    }

    // Each listener runs inside its own error boundary
    fn notify_listeners(&self, payload: &NotificationPayload) -> (usize, usize) {
        let snapshot: Vec<(SubscriberId, PopupCallback)> = self.listeners.lock().clone();
        let mut failed = 0;

        for (id, callback) in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(Ok(())) => {},
                Ok(Err(e)) => {
                    failed += 1;
                    tracing::warn!(subscriber = %id, error = %e, "Popup listener failed");
                },
                Err(_) => {
                    failed += 1;
                    tracing::warn!(subscriber = %id, "Popup listener panicked");
                },
            }
        }

        (snapshot.len(), failed)
    }

    async fn display_native(&self, display: &dyn NativeDisplay, payload: &NotificationPayload) -> bool {
        let channel_known = self.created_channels.lock().contains(&payload.channel_id);
        if !channel_known {
            let spec = ChannelSpec::for_channel(payload.channel_id.clone(), payload.priority);
            match display.create_channel(spec).await {
                Ok(channel_id) => {
                    self.created_channels.lock().insert(channel_id);
                },
                Err(e) => {
                    tracing::warn!(channel = %payload.channel_id, error = %e, "Native channel creation failed, popup only");
                    return false;
                },
            }
        }

        let spec = DisplaySpec {
            id: payload.message_id.clone(),
            title: payload.title.clone(),
            body: payload.body.clone(),
            channel_id: payload.channel_id.clone(),
            priority: payload.priority,
            data: payload.data.clone(),
        };

        match display.display_notification(spec).await {
            Ok(()) => {
                tracing::debug!(
                    channel = %payload.channel_id,
                    priority = payload.priority.as_str(),
                    "Native notification displayed"
                );
                true
            },
            Err(e) => {
                tracing::warn!(error = %e, "Native notification display failed, popup only");
                false
            },
        }
    }

    /// Background or quit-state message: the OS shows the tray notification,
    /// we only keep a diagnostic summary
    pub async fn on_background_message(&self, raw: &RemoteMessage) -> Option<NotificationPayload> {
        let payload = match self.normalize_once(raw) {
            Ok(payload) => payload,
            Err(reason) => {
                tracing::debug!(message_id = raw.message_id.as_deref(), %reason, "Dropping background message");
                return None;
            },
        };

        if let Err(e) = self.pending.record_background(payload.summary(Utc::now())).await {
            tracing::warn!(error = %e, "Failed to record background notification");
        }
        Some(payload)
    }

    /// User opened the app from a tray notification (or it cold-started the
    /// app). Dispatched at most once per message id.
    pub async fn on_notification_opened(&self, raw: &RemoteMessage) -> Option<DispatchOutcome> {
        let payload = match self.normalize_once(raw) {
            Ok(payload) => payload,
            Err(reason) => {
                tracing::debug!(message_id = raw.message_id.as_deref(), %reason, "Opened notification not actionable");
                return None;
            },
        };

        // Check and mark under one lock so concurrent replays of the same id
        // cannot both dispatch
        if let Some(id) = raw.message_id.as_deref()
            && !self.recent.lock().mark_dispatched(id)
        {
            tracing::debug!(message_id = id, "Notification already dispatched, ignoring");
            return None;
        }

        Some(self.dispatcher.dispatch(DispatchTarget::Payload(payload)).await)
    }

    /// Tap on a notification shown by the native display capability. Routed
    /// now when navigation is ready, otherwise held for cold-start replay.
    pub async fn on_native_press(
        &self,
        message_id: Option<String>,
        data: HashMap<String, String>,
    ) -> Option<DispatchOutcome> {
        let raw = RemoteMessage {
            message_id,
            data,
            ..RemoteMessage::default()
        };

        if !self.dispatcher.is_navigation_ready() {
            let payload = match self.normalize_once(&raw) {
                Ok(payload) => payload,
                Err(reason) => {
                    tracing::debug!(%reason, "Native press not actionable");
                    return None;
                },
            };
            if let Err(e) = self.pending.enqueue(PendingItem::Notification(payload)).await {
                tracing::warn!(error = %e, "Failed to hold native press for later");
            }
            return None;
        }

        self.on_notification_opened(&raw).await
    }

    /// Deep link opened by the OS. Held for cold-start replay when navigation
    /// is not ready yet.
    pub async fn on_deep_link(&self, url: &str) -> Option<DispatchOutcome> {
        if !self.dispatcher.is_navigation_ready() {
            if let Err(e) = self.pending.enqueue(PendingItem::Link(url.to_string())).await {
                tracing::warn!(error = %e, "Failed to hold deep link for later");
            }
            return None;
        }
        Some(self.dispatcher.dispatch(DispatchTarget::Url(url.to_string())).await)
    }

    // Normalizes each identified message once; later lifecycle paths reuse it
    fn normalize_once(&self, raw: &RemoteMessage) -> Result<NotificationPayload, InvalidMessage> {
        if let Some(id) = raw.message_id.as_deref()
            && let Some(payload) = self.recent.lock().payload(id)
        {
            return Ok(payload);
        }

        let payload = self.normalizer.normalize(raw)?;
        if let Some(id) = raw.message_id.as_deref() {
            self.recent.lock().remember(id, payload.clone());
        }
        Ok(payload)
    }
}
