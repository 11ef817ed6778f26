// Deep-link dispatcher - resolves payloads and URLs into navigation, waiting for readiness

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;
use url::Url;

use super::payload::TAB_KEY;
use super::{NotificationPayload, PipelineConfig, PushError, PushResult};
use crate::backends::Navigator;

/// Host segment of notification deep links: `<scheme>://notification/<Screen>`
pub const DEEP_LINK_HOST: &str = "notification";

static SCREEN_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").ok());

fn is_valid_screen_name(screen: &str) -> bool {
    match SCREEN_NAME.as_ref() {
        Some(pattern) => pattern.is_match(screen),
        None => !screen.is_empty(),
    }
}

/// What to dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchTarget {
    Payload(NotificationPayload),
    Url(String),
}

/// Resolved navigation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationRequest {
    pub screen: String,
    pub params: Option<Map<String, Value>>,
}

/// Result of a single dispatch attempt
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Navigated(NavigationRequest),
    /// Navigation never became ready within the timeout
    TimedOut(NavigationRequest),
    /// Target could not be resolved or the navigator refused it
    Rejected { reason: String },
}

impl DispatchOutcome {
    pub fn is_navigated(&self) -> bool {
        matches!(self, DispatchOutcome::Navigated(_))
    }
}

/// Parsed `<scheme>://notification/<Screen>?<query>` link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepLink {
    pub screen: String,
    pub params: Vec<(String, String)>,
}

impl DeepLink {
    pub fn parse(raw: &str, scheme: &str) -> PushResult<Self> {
        let invalid = |reason: &str| PushError::InvalidDeepLink {
            url: raw.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;

        if !url.scheme().eq_ignore_ascii_case(scheme) {
            return Err(invalid(&format!("expected scheme '{}'", scheme)));
        }
        if url.host_str() != Some(DEEP_LINK_HOST) {
            return Err(invalid(&format!("expected host '{}'", DEEP_LINK_HOST)));
        }

        let screen = url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| invalid("missing screen segment"))?;
        if !is_valid_screen_name(screen) {
            return Err(invalid("screen segment is not a route name"));
        }

        let params = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        Ok(Self {
            screen: screen.to_string(),
            params,
        })
    }
}

/// Host-driven "navigation container mounted" signal. Waiting dispatches wake
/// as soon as it flips instead of waiting for the next poll.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn mark_ready(&self) {
        self.sender.send_replace(true);
    }

    pub fn mark_not_ready(&self) {
        self.sender.send_replace(false);
    }

    pub fn is_marked_ready(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// Routes payloads and deep links to the navigation collaborator
#[derive(Clone)]
pub struct DeepLinkDispatcher {
    navigator: Arc<dyn Navigator>,
    readiness: ReadinessGate,
    main_screen: String,
    scheme: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl DeepLinkDispatcher {
    pub fn new(navigator: Arc<dyn Navigator>, readiness: ReadinessGate, config: &PipelineConfig) -> Self {
        Self {
            navigator,
            readiness,
            main_screen: config.fallback_screen.clone(),
            scheme: config.deep_link_scheme.clone(),
            poll_interval: config.readiness_poll_interval,
            timeout: config.readiness_timeout,
        }
    }

    pub fn readiness(&self) -> &ReadinessGate {
        &self.readiness
    }

    pub fn is_navigation_ready(&self) -> bool {
        self.navigator.is_ready()
    }

    /// Attempt one navigation. Never panics or propagates errors; the outcome
    /// says what happened.
    pub async fn dispatch(&self, target: DispatchTarget) -> DispatchOutcome {
        let request = match self.resolve(&target) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping dispatch of unresolvable target");
                return DispatchOutcome::Rejected {
                    reason: e.to_string(),
                };
            },
        };

        if !self.wait_until_ready().await {
            tracing::warn!(
                screen = %request.screen,
                timeout_ms = self.timeout.as_millis() as u64,
                "Navigation not ready, abandoning dispatch"
            );
            return DispatchOutcome::TimedOut(request);
        }

        match self.navigator.navigate(&request.screen, request.params.as_ref()) {
            Ok(()) => {
                tracing::info!(screen = %request.screen, "Dispatched notification navigation");
                DispatchOutcome::Navigated(request)
            },
            Err(e) => {
                tracing::warn!(screen = %request.screen, error = %e, "Navigation failed");
                DispatchOutcome::Rejected {
                    reason: e.to_string(),
                }
            },
        }
    }

    /// Resolve a target into a navigation call without navigating
    pub fn resolve(&self, target: &DispatchTarget) -> PushResult<NavigationRequest> {
        match target {
            DispatchTarget::Payload(payload) => {
                let screen = payload
                    .screen
                    .clone()
                    .unwrap_or_else(|| self.main_screen.clone());
                let tab = payload.sub_tab().map(str::to_string);
                Ok(self.build_request(screen, tab, payload.params.clone()))
            },
            DispatchTarget::Url(raw) => {
                let link = DeepLink::parse(raw, &self.scheme)?;
                let mut params = Map::new();
                let mut tab = None;
                for (key, value) in link.params {
                    if key == TAB_KEY {
                        tab = Some(value);
                    } else {
                        params.insert(key, Value::String(value));
                    }
                }
                let params = (!params.is_empty()).then_some(params);
                Ok(self.build_request(link.screen, tab, params))
            },
        }
    }

    // The main tab container is addressed through a nested route:
    // navigate(main, { screen: tab, params })
    fn build_request(
        &self,
        screen: String,
        tab: Option<String>,
        params: Option<Map<String, Value>>,
    ) -> NavigationRequest {
        match tab {
            Some(tab) if screen == self.main_screen => {
                let mut nested = Map::new();
                nested.insert("screen".to_string(), Value::String(tab));
                if let Some(params) = params {
                    nested.insert("params".to_string(), Value::Object(params));
                }
                NavigationRequest {
                    screen,
                    params: Some(nested),
                }
            },
            _ => NavigationRequest { screen, params },
        }
    }

    async fn wait_until_ready(&self) -> bool {
        if self.navigator.is_ready() {
            return true;
        }

        let mut readiness = self.readiness.subscribe();
        let wait = async {
            loop {
                if self.navigator.is_ready() {
                    return;
                }
                tokio::select! {
                    changed = readiness.changed() => {
                        if changed.is_err() {
                            tokio::time::sleep(self.poll_interval).await;
                        }
                    }
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        };

        tokio::time::timeout(self.timeout, wait).await.is_ok()
    }
}
