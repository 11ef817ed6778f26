// Device token lifecycle - acquisition with bounded retry, persistence, staleness refresh

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    DevicePlatform, PermissionGate, PipelineConfig, PushError, PushResult, RetryPolicy,
};
use crate::backends::{DurableStore, PushProvider};

/// The push-delivery identifier of this device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceToken {
    pub value: String,
    pub obtained_at: DateTime<Utc>,
}

impl DeviceToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            obtained_at: Utc::now(),
        }
    }

    /// A token obtained in the future (clock skew) is never stale
    pub fn is_stale_at(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        match now.signed_duration_since(self.obtained_at).to_std() {
            Ok(age) => age > threshold,
            Err(_) => false,
        }
    }
}

/// Result of a foreground staleness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Persisted token is younger than the threshold, nothing requested
    Fresh,
    /// A new token was acquired and persisted
    Refreshed(String),
    /// Acquisition failed; retried on the next foreground transition
    Failed,
}

/// Obtains, persists, refreshes and invalidates the device token
#[derive(Clone)]
pub struct TokenManager {
    provider: Arc<dyn PushProvider>,
    gate: PermissionGate,
    store: Arc<dyn DurableStore>,
    platform: DevicePlatform,
    token_key: String,
    stale_after: Duration,
    apns_wait: Duration,
    retry_policy: RetryPolicy,
}

impl TokenManager {
    pub fn new(
        provider: Arc<dyn PushProvider>,
        gate: PermissionGate,
        store: Arc<dyn DurableStore>,
        platform: DevicePlatform,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            provider,
            gate,
            store,
            platform,
            token_key: config.storage_key("device_token"),
            stale_after: config.token_stale_after,
            apns_wait: config.apns_token_wait,
            retry_policy: config.token_retry_policy(platform),
        }
    }

    pub fn permission_gate(&self) -> &PermissionGate {
        &self.gate
    }

    /// Request a token from the provider. `None` when permission is missing
    /// or every attempt failed. A denial the OS will not prompt for again is
    /// never re-requested.
    pub async fn acquire_token(&self) -> Option<String> {
        let state = self.gate.authorization_state().await;
        let granted = if state.is_authorized() {
            true
        } else if state.can_request() {
            self.gate.request_permission().await
        } else {
            false
        };

        if !granted {
            tracing::info!(
                platform = self.platform.name(),
                state = ?state,
                "Push permission not granted, continuing without push"
            );
            return None;
        }

        if self.platform.is_ios() {
            self.prepare_ios_registration().await;
        }

        self.retry_policy
            .run("get_token", |_attempt| async move {
                let token = self.provider.get_token().await?;
                if token.trim().is_empty() {
                    return Err(PushError::provider("get_token", "provider returned an empty token"));
                }
                Ok::<_, PushError>(token)
            })
            .await
    }

    // APNs must be registered and have issued its token before the provider
    // can mint one. Wait once for the APNs token, then proceed regardless.
    async fn prepare_ios_registration(&self) {
        if !self.provider.is_device_registered() {
            match self.provider.register_device().await {
                Ok(()) => tracing::debug!("Registered device for remote messages"),
                Err(e) => tracing::warn!(error = %e, "Remote message registration failed"),
            }
        }

        if self.has_apns_token().await {
            return;
        }

        tracing::debug!(wait_ms = self.apns_wait.as_millis() as u64, "APNs token not yet available");
        tokio::time::sleep(self.apns_wait).await;

        if !self.has_apns_token().await {
            tracing::warn!("APNs token still unavailable, requesting provider token anyway");
        }
    }

    async fn has_apns_token(&self) -> bool {
        match self.provider.apns_token().await {
            Ok(token) => token.is_some_and(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "APNs token query failed");
                false
            },
        }
    }

    /// Store `value` as the current token, obtained now
    pub async fn persist(&self, value: &str) -> PushResult<DeviceToken> {
        let token = DeviceToken::new(value);
        self.store_token(&token).await?;
        Ok(token)
    }

    /// Overwrite the persisted token record
    pub async fn store_token(&self, token: &DeviceToken) -> PushResult<()> {
        let encoded = serde_json::to_string(token).map_err(|source| PushError::SerializationError {
            key: self.token_key.clone(),
            source,
        })?;
        self.store.set_item(&self.token_key, encoded).await
    }

    pub async fn current_token(&self) -> PushResult<Option<DeviceToken>> {
        let Some(raw) = self.store.get_item(&self.token_key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                tracing::warn!(error = %e, "Persisted device token unreadable");
                Ok(None)
            },
        }
    }

    /// Acquire and persist a token, swallowing failures
    pub async fn acquire_and_persist(&self) -> Option<String> {
        let value = self.acquire_token().await?;
        if let Err(e) = self.persist(&value).await {
            tracing::warn!(error = %e, "Failed to persist device token");
        }
        Some(value)
    }

    /// Re-acquire the token when it is missing or older than the threshold
    pub async fn refresh_if_stale(&self) -> RefreshOutcome {
        self.refresh_if_stale_at(Utc::now()).await
    }

    pub async fn refresh_if_stale_at(&self, now: DateTime<Utc>) -> RefreshOutcome {
        let current = match self.current_token().await {
            Ok(current) => current,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read persisted device token");
                None
            },
        };

        if let Some(token) = &current
            && !token.is_stale_at(now, self.stale_after)
        {
            return RefreshOutcome::Fresh;
        }

        tracing::info!(had_token = current.is_some(), "Device token stale, refreshing");
        match self.acquire_and_persist().await {
            Some(value) => RefreshOutcome::Refreshed(value),
            None => RefreshOutcome::Failed,
        }
    }

    /// Provider rotated the token; persist immediately
    pub async fn on_provider_refresh(&self, new_token: &str) {
        match self.persist(new_token).await {
            Ok(_) => tracing::info!("Device token rotated by provider"),
            Err(e) => tracing::warn!(error = %e, "Failed to persist rotated device token"),
        }
    }

    /// Delete the token at the provider and locally. Safe to call repeatedly.
    pub async fn cleanup(&self) {
        if let Err(e) = self.provider.delete_token().await {
            tracing::warn!(error = %e, "Provider token deletion failed");
        }
        if let Err(e) = self.store.remove_item(&self.token_key).await {
            tracing::warn!(error = %e, "Failed to remove persisted device token");
        }
    }
}
