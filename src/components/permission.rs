// Permission gate - provider authorization plus the Android 13+ runtime permission
// Fails closed: any collaborator error is treated as "not authorized"

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{DevicePlatform, PushResult};
use crate::backends::{BoxFuture, PushProvider};

/// Authorization state reported by the push provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationState {
    /// Not yet requested
    NotDetermined,
    /// User granted permission
    Authorized,
    /// Provisional authorization (iOS quiet delivery), usable for push
    Provisional,
    /// User denied permission
    Denied {
        /// Whether the OS will show the prompt again
        can_retry: bool,
    },
}

impl AuthorizationState {
    pub fn is_authorized(&self) -> bool {
        matches!(
            self,
            AuthorizationState::Authorized | AuthorizationState::Provisional
        )
    }

    pub fn can_request(&self) -> bool {
        match self {
            AuthorizationState::NotDetermined => true,
            AuthorizationState::Denied { can_retry } => *can_retry,
            _ => false,
        }
    }
}

/// OS-level notification permission (Android `POST_NOTIFICATIONS`)
pub trait SystemPermissions: Send + Sync {
    fn request_post_notifications(&self) -> BoxFuture<'_, PushResult<bool>>;
}

/// Decides whether push delivery is authorized and prompts when asked to
#[derive(Clone)]
pub struct PermissionGate {
    provider: Arc<dyn PushProvider>,
    system: Option<Arc<dyn SystemPermissions>>,
    platform: DevicePlatform,
}

impl PermissionGate {
    pub fn new(
        provider: Arc<dyn PushProvider>,
        system: Option<Arc<dyn SystemPermissions>>,
        platform: DevicePlatform,
    ) -> Self {
        Self {
            provider,
            system,
            platform,
        }
    }

    /// Current provider authorization, `NotDetermined` when the query fails
    pub async fn authorization_state(&self) -> AuthorizationState {
        match self.provider.has_permission().await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "Permission check failed, treating as not authorized");
                AuthorizationState::NotDetermined
            },
        }
    }

    pub async fn check_permission(&self) -> bool {
        self.authorization_state().await.is_authorized()
    }

    /// Prompt for permission once. On Android 13+ the OS permission and the
    /// provider permission must both be granted.
    pub async fn request_permission(&self) -> bool {
        if self.platform.requires_os_notification_permission() {
            let Some(system) = &self.system else {
                tracing::warn!(
                    platform = self.platform.name(),
                    "No system permission handler configured for POST_NOTIFICATIONS"
                );
                return false;
            };

            match system.request_post_notifications().await {
                Ok(true) => {},
                Ok(false) => {
                    tracing::info!("POST_NOTIFICATIONS permission denied");
                    return false;
                },
                Err(e) => {
                    tracing::warn!(error = %e, "POST_NOTIFICATIONS request failed");
                    return false;
                },
            }
        }

        match self.provider.request_permission().await {
            Ok(state) => {
                tracing::info!(state = ?state, platform = self.platform.name(), "Push permission requested");
                state.is_authorized()
            },
            Err(e) => {
                tracing::warn!(error = %e, "Push permission request failed");
                false
            },
        }
    }

    /// True when permission is denied and the OS will not prompt again, so the
    /// host should offer a settings redirect
    pub async fn needs_settings_redirect(&self) -> bool {
        matches!(
            self.authorization_state().await,
            AuthorizationState::Denied { can_retry: false }
        )
    }
}
