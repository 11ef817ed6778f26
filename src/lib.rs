//! Push-notification pipeline for mobile clients
//!
//! Covers the whole path from the push provider to in-app navigation: permission
//! gating, device-token lifecycle, normalization of provider messages into one
//! canonical payload, lifecycle-aware delivery routing, deep-link dispatch and a
//! durable store for deliveries that arrive before the UI can route them.
//!
//! Every platform dependency (provider SDK, storage, navigation, native display,
//! OS permissions) is injected through the traits in [`backends`].

use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub mod backends;
pub mod components;

// Re-export all components for convenience
pub use backends::*;
pub use components::*;

/// Events the host forwards from outside the provider SDK
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// Tap on a notification shown by the native display capability
    NativePress {
        message_id: Option<String>,
        data: std::collections::HashMap<String, String>,
    },
    /// URL handed to the app by the OS
    DeepLinkOpened(String),
}

/// What the cold-start routine found and did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColdStartReport {
    /// Outcome of the single replayed delivery, if there was one
    pub dispatched: Option<DispatchOutcome>,
    /// Background notifications recorded while the app was not foregrounded
    pub background_notifications: Vec<PayloadSummary>,
}

/// Composition root wiring every pipeline component together.
///
/// Lifecycle: [`initialize`](Self::initialize) once at startup,
/// [`handle_cold_start`](Self::handle_cold_start) once the navigation root is
/// mounting, [`unsubscribe`](Self::unsubscribe) once at teardown.
pub struct PushPipeline {
    provider: Arc<dyn PushProvider>,
    config: PipelineConfig,
    platform: DevicePlatform,
    tokens: TokenManager,
    router: DeliveryRouter,
    readiness: ReadinessGate,
    host_events: mpsc::UnboundedSender<HostEvent>,
    host_receiver: Mutex<Option<mpsc::UnboundedReceiver<HostEvent>>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    app_state: Mutex<AppLifecycle>,
    initialized: AtomicBool,
    cold_start_handled: AtomicBool,
}

impl PushPipeline {
    pub fn builder(
        provider: Arc<dyn PushProvider>,
        store: Arc<dyn DurableStore>,
        navigator: Arc<dyn Navigator>,
    ) -> PushPipelineBuilder {
        PushPipelineBuilder::new(provider, store, navigator)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn platform(&self) -> DevicePlatform {
        self.platform
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn router(&self) -> &DeliveryRouter {
        &self.router
    }

    pub fn permissions(&self) -> &PermissionGate {
        self.tokens.permission_gate()
    }

    /// Signal handle the host flips once its navigation container is mounted
    pub fn readiness(&self) -> &ReadinessGate {
        &self.readiness
    }

    pub fn app_state(&self) -> AppLifecycle {
        *self.app_state.lock()
    }

    /// Sender for events that do not come from the provider SDK. They join the
    /// same ordered stream as provider events.
    pub fn host_events(&self) -> mpsc::UnboundedSender<HostEvent> {
        self.host_events.clone()
    }

    pub fn subscribe_popup<F>(&self, callback: F) -> PopupSubscription
    where
        F: Fn(&NotificationPayload) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.router.subscribe_popup(callback)
    }

    /// Acquire the device token and start consuming provider events. Calling
    /// it again is a no-op.
    pub async fn initialize(self: &Arc<Self>) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            tracing::debug!("Push pipeline already initialized");
            return;
        }

        let provider_events = self.provider.subscribe();
        let host_events = self.host_receiver.lock().take();
        let handle = tokio::spawn(run_event_loop(
            Arc::downgrade(self),
            provider_events,
            host_events,
        ));
        *self.event_loop.lock() = Some(handle);

        match self.tokens.acquire_and_persist().await {
            Some(_) => tracing::info!(platform = self.platform.name(), "Push pipeline initialized"),
            None => tracing::warn!(
                platform = self.platform.name(),
                "Push pipeline initialized without a device token"
            ),
        }
    }

    /// Stop consuming provider events. Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(handle) = self.event_loop.lock().take() {
            handle.abort();
            tracing::info!("Push pipeline unsubscribed");
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.event_loop
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Route one provider event. The event loop calls this in delivery order.
    pub async fn handle_provider_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::ForegroundMessage(message) => {
                self.router.on_foreground_message(&message).await;
            },
            ProviderEvent::BackgroundMessage(message) => {
                self.router.on_background_message(&message).await;
            },
            ProviderEvent::NotificationOpenedApp(message) => {
                self.router.on_notification_opened(&message).await;
            },
            ProviderEvent::TokenRefreshed(token) => {
                self.tokens.on_provider_refresh(&token).await;
            },
        }
    }

    pub async fn handle_host_event(&self, event: HostEvent) {
        match event {
            HostEvent::NativePress { message_id, data } => {
                self.router.on_native_press(message_id, data).await;
            },
            HostEvent::DeepLinkOpened(url) => {
                self.router.on_deep_link(&url).await;
            },
        }
    }

    /// Record an OS lifecycle transition. Returning to the foreground refreshes
    /// a stale token.
    pub async fn on_app_state_change(&self, next: AppLifecycle) -> Option<RefreshOutcome> {
        let previous = std::mem::replace(&mut *self.app_state.lock(), next);
        tracing::debug!(?previous, ?next, "App lifecycle changed");

        if next == AppLifecycle::Foreground && previous != AppLifecycle::Foreground {
            Some(self.tokens.refresh_if_stale().await)
        } else {
            None
        }
    }

    /// Replay whatever cold-started the app. Runs once; later calls return an
    /// empty report.
    ///
    /// After the settle delay: the provider's initial notification wins, then
    /// a held notification, then a held deep link. Each is removed from the
    /// store before its single dispatch attempt.
    pub async fn handle_cold_start(&self) -> ColdStartReport {
        if self.cold_start_handled.swap(true, Ordering::SeqCst) {
            return ColdStartReport::default();
        }

        tokio::time::sleep(self.config.cold_start_settle_delay).await;

        let pending = self.router.pending();
        let held_notification = pending.drain_pending_notification().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not read pending notification");
            None
        });
        let held_link = pending.drain_pending_link().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not read pending deep link");
            None
        });

        let initial = match self.provider.initial_notification().await {
            Ok(initial) => initial,
            Err(e) => {
                tracing::warn!(error = %e, "Initial notification query failed");
                None
            },
        };

        let dispatched = if let Some(message) = initial {
            tracing::info!(message_id = message.message_id.as_deref(), "App opened from notification");
            if held_notification.is_some() || held_link.is_some() {
                tracing::debug!("Discarding held deliveries superseded by the initial notification");
            }
            self.router.on_notification_opened(&message).await
        } else if let Some(held) = held_notification {
            match held.item {
                PendingItem::Notification(payload) => Some(
                    self.router
                        .dispatcher()
                        .dispatch(DispatchTarget::Payload(payload))
                        .await,
                ),
                PendingItem::Link(url) => {
                    Some(self.router.dispatcher().dispatch(DispatchTarget::Url(url)).await)
                },
            }
        } else if let Some(url) = held_link {
            Some(self.router.dispatcher().dispatch(DispatchTarget::Url(url)).await)
        } else {
            None
        };

        let background_notifications = pending
            .drain_background_notifications()
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Could not read background notifications");
                Vec::new()
            });
        for summary in &background_notifications {
            tracing::debug!(
                message_id = summary.message_id.as_deref(),
                screen = summary.screen.as_deref(),
                received_at = %summary.received_at,
                "Background notification received while inactive"
            );
        }

        ColdStartReport {
            dispatched,
            background_notifications,
        }
    }

    /// Invalidate the device token (logout)
    pub async fn logout(&self) {
        self.tokens.cleanup().await;
    }
}

impl Drop for PushPipeline {
    fn drop(&mut self) {
        if let Some(handle) = self.event_loop.get_mut().take() {
            handle.abort();
        }
    }
}

// Holds only a weak reference so dropping the last pipeline handle ends the loop
async fn run_event_loop(
    pipeline: Weak<PushPipeline>,
    mut provider_events: mpsc::UnboundedReceiver<ProviderEvent>,
    mut host_events: Option<mpsc::UnboundedReceiver<HostEvent>>,
) {
    loop {
        tokio::select! {
            event = provider_events.recv() => {
                let Some(event) = event else {
                    tracing::info!("Provider event stream closed");
                    break;
                };
                let Some(pipeline) = pipeline.upgrade() else { break };
                pipeline.handle_provider_event(event).await;
            },
            event = recv_host(&mut host_events) => {
                let Some(event) = event else {
                    host_events = None;
                    continue;
                };
                let Some(pipeline) = pipeline.upgrade() else { break };
                pipeline.handle_host_event(event).await;
            },
        }
    }
}

// Pending forever once the host channel is gone, so select! keeps serving
// provider events
async fn recv_host(receiver: &mut Option<mpsc::UnboundedReceiver<HostEvent>>) -> Option<HostEvent> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

/// Builder for [`PushPipeline`] with fluent API
pub struct PushPipelineBuilder {
    provider: Arc<dyn PushProvider>,
    store: Arc<dyn DurableStore>,
    navigator: Arc<dyn Navigator>,
    system_permissions: Option<Arc<dyn SystemPermissions>>,
    native_display: Option<Arc<dyn NativeDisplay>>,
    platform: DevicePlatform,
    config: PipelineConfig,
    readiness: Option<ReadinessGate>,
}

impl PushPipelineBuilder {
    pub fn new(
        provider: Arc<dyn PushProvider>,
        store: Arc<dyn DurableStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            provider,
            store,
            navigator,
            system_permissions: None,
            native_display: None,
            platform: DevicePlatform::default(),
            config: PipelineConfig::default(),
            readiness: None,
        }
    }

    pub fn with_platform(mut self, platform: DevicePlatform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_system_permissions(mut self, system: Arc<dyn SystemPermissions>) -> Self {
        self.system_permissions = Some(system);
        self
    }

    pub fn with_native_display(mut self, display: Arc<dyn NativeDisplay>) -> Self {
        self.native_display = Some(display);
        self
    }

    /// Share a readiness gate the host already flips from its navigation root
    pub fn with_readiness_gate(mut self, readiness: ReadinessGate) -> Self {
        self.readiness = Some(readiness);
        self
    }

    pub fn build(self) -> PushResult<Arc<PushPipeline>> {
        self.config.validate()?;

        let gate = PermissionGate::new(
            Arc::clone(&self.provider),
            self.system_permissions,
            self.platform,
        );
        let tokens = TokenManager::new(
            Arc::clone(&self.provider),
            gate,
            Arc::clone(&self.store),
            self.platform,
            &self.config,
        );

        let readiness = self.readiness.unwrap_or_default();
        let dispatcher = DeepLinkDispatcher::new(self.navigator, readiness.clone(), &self.config);
        let pending = PendingDeliveryStore::new(self.store, &self.config);
        let normalizer = MessageNormalizer::new(self.platform, self.config.fallback_screen.clone());
        let native = NativeCapability::probe(self.native_display);
        tracing::debug!(native = ?native, platform = self.platform.name(), "Resolved native display capability");

        let router = DeliveryRouter::new(normalizer, self.platform, pending, dispatcher, native);
        let (host_events, host_receiver) = mpsc::unbounded_channel();

        Ok(Arc::new(PushPipeline {
            provider: self.provider,
            config: self.config,
            platform: self.platform,
            tokens,
            router,
            readiness,
            host_events,
            host_receiver: Mutex::new(Some(host_receiver)),
            event_loop: Mutex::new(None),
            app_state: Mutex::new(AppLifecycle::Foreground),
            initialized: AtomicBool::new(false),
            cold_start_handled: AtomicBool::new(false),
        }))
    }
}
