// Pipeline configuration with serde defaults

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::serde_time::duration_millis;
use super::{DevicePlatform, PushError, PushResult, RetryPolicy};

const MAX_TOKEN_ATTEMPTS: u32 = 10;
const MAX_BACKOFF_STEP: Duration = Duration::from_secs(60);

/// Tunables for the push pipeline. Every field has a default so a partial JSON
/// document (or none at all) yields a working configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Token age beyond which a foreground transition re-acquires it
    #[serde(with = "duration_millis")]
    pub token_stale_after: Duration,
    /// Total token acquisition attempts
    pub token_max_attempts: u32,
    /// Linear backoff step between token attempts on Android
    #[serde(with = "duration_millis")]
    pub android_backoff_step: Duration,
    /// Linear backoff step between token attempts on iOS
    #[serde(with = "duration_millis")]
    pub ios_backoff_step: Duration,
    /// Wait before re-checking a missing APNs token
    #[serde(with = "duration_millis")]
    pub apns_token_wait: Duration,
    /// Interval between navigation readiness checks
    #[serde(with = "duration_millis")]
    pub readiness_poll_interval: Duration,
    /// Give up dispatching after this long without navigation readiness
    #[serde(with = "duration_millis")]
    pub readiness_timeout: Duration,
    /// Wait after cold start before consulting the pending store
    #[serde(with = "duration_millis")]
    pub cold_start_settle_delay: Duration,
    /// Route used when a message names no screen (main tab container)
    pub fallback_screen: String,
    /// Deep-link URL scheme, without `://`
    pub deep_link_scheme: String,
    /// Maximum background notification summaries kept for diagnostics
    pub max_background_notifications: usize,
    /// Prefix for every durable storage key
    pub storage_key_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            token_stale_after: Duration::from_secs(30 * 60),
            token_max_attempts: 3,
            android_backoff_step: Duration::from_secs(1),
            ios_backoff_step: Duration::from_secs(2),
            apns_token_wait: Duration::from_secs(1),
            readiness_poll_interval: Duration::from_millis(100),
            readiness_timeout: Duration::from_secs(5),
            cold_start_settle_delay: Duration::from_millis(750),
            fallback_screen: "MainTabs".to_string(),
            deep_link_scheme: "examreg".to_string(),
            max_background_notifications: 50,
            storage_key_prefix: "push".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON document, filling missing fields with defaults
    pub fn from_json(raw: &str) -> PushResult<Self> {
        let config: Self = serde_json::from_str(raw).map_err(|e| PushError::ConfigError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PushResult<()> {
        if !(1..=MAX_TOKEN_ATTEMPTS).contains(&self.token_max_attempts) {
            return Err(PushError::ConfigError {
                message: format!("token_max_attempts must be between 1 and {MAX_TOKEN_ATTEMPTS}"),
            });
        }
        for (name, step) in [
            ("android_backoff_step", self.android_backoff_step),
            ("ios_backoff_step", self.ios_backoff_step),
        ] {
            if step > MAX_BACKOFF_STEP {
                return Err(PushError::ConfigError {
                    message: format!("{name} must not exceed {}s", MAX_BACKOFF_STEP.as_secs()),
                });
            }
        }
        if self.readiness_poll_interval.is_zero() {
            return Err(PushError::ConfigError {
                message: "readiness_poll_interval must be non-zero".to_string(),
            });
        }
        if self.fallback_screen.trim().is_empty() {
            return Err(PushError::ConfigError {
                message: "fallback_screen must not be empty".to_string(),
            });
        }
        if self.deep_link_scheme.trim().is_empty() || self.deep_link_scheme.contains("://") {
            return Err(PushError::ConfigError {
                message: format!("invalid deep_link_scheme '{}'", self.deep_link_scheme),
            });
        }
        Ok(())
    }

    /// Token retry policy for the given platform
    pub fn token_retry_policy(&self, platform: DevicePlatform) -> RetryPolicy {
        let step = if platform.is_ios() {
            self.ios_backoff_step
        } else {
            self.android_backoff_step
        };
        RetryPolicy::linear(self.token_max_attempts, step)
    }

    /// Namespaced durable storage key
    pub fn storage_key(&self, name: &str) -> String {
        format!("{}.{}", self.storage_key_prefix, name)
    }

    pub fn with_fallback_screen(mut self, screen: impl Into<String>) -> Self {
        self.fallback_screen = screen.into();
        self
    }

    pub fn with_deep_link_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.deep_link_scheme = scheme.into();
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.cold_start_settle_delay = delay;
        self
    }

    pub fn with_max_background_notifications(mut self, max: usize) -> Self {
        self.max_background_notifications = max;
        self
    }
}
