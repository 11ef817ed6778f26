// Pending-delivery store - notifications and links that arrived before navigation was ready

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NotificationPayload, PayloadSummary, PipelineConfig, PushError, PushResult};
use crate::backends::DurableStore;

/// Something waiting to be routed once the UI can navigate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PendingItem {
    Notification(NotificationPayload),
    Link(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDelivery {
    pub item: PendingItem,
    pub enqueued_at: DateTime<Utc>,
}

/// Durable holding area with one slot per item kind plus a bounded list of
/// background notification summaries
#[derive(Clone)]
pub struct PendingDeliveryStore {
    store: Arc<dyn DurableStore>,
    link_key: String,
    notification_key: String,
    background_key: String,
    max_background: usize,
}

impl PendingDeliveryStore {
    pub fn new(store: Arc<dyn DurableStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            link_key: config.storage_key("pending_link"),
            notification_key: config.storage_key("pending_notification"),
            background_key: config.storage_key("background_notifications"),
            max_background: config.max_background_notifications,
        }
    }

    /// Persist an item, replacing any pending item of the same kind
    pub async fn enqueue(&self, item: PendingItem) -> PushResult<()> {
        let key = match &item {
            PendingItem::Notification(_) => &self.notification_key,
            PendingItem::Link(_) => &self.link_key,
        };
        let delivery = PendingDelivery {
            item,
            enqueued_at: Utc::now(),
        };
        let encoded = encode(key, &delivery)?;
        self.store.set_item(key, encoded).await?;
        tracing::debug!(key = %key, "Pending delivery enqueued");
        Ok(())
    }

    /// Read and delete the pending deep link. A bare URL string (written by a
    /// native layer) is accepted as well as the structured form.
    pub async fn drain_pending_link(&self) -> PushResult<Option<String>> {
        let Some(raw) = self.take(&self.link_key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<PendingDelivery>(&raw) {
            Ok(PendingDelivery {
                item: PendingItem::Link(url),
                ..
            }) => Ok(Some(url)),
            Ok(_) => {
                tracing::warn!("Pending link slot held a notification, discarding");
                Ok(None)
            },
            Err(_) => {
                let url = raw.trim();
                Ok((!url.is_empty()).then(|| url.to_string()))
            },
        }
    }

    /// Read and delete the pending notification
    pub async fn drain_pending_notification(&self) -> PushResult<Option<PendingDelivery>> {
        let Some(raw) = self.take(&self.notification_key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<PendingDelivery>(&raw) {
            Ok(delivery) => Ok(Some(delivery)),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable pending notification");
                Ok(None)
            },
        }
    }

    /// Append a background notification summary, dropping the oldest entries
    /// beyond the configured cap
    pub async fn record_background(&self, summary: PayloadSummary) -> PushResult<()> {
        if self.max_background == 0 {
            return Ok(());
        }

        let mut summaries = self.read_background().await?;
        summaries.push(summary);
        if summaries.len() > self.max_background {
            let excess = summaries.len() - self.max_background;
            summaries.drain(..excess);
        }

        let encoded = encode(&self.background_key, &summaries)?;
        self.store.set_item(&self.background_key, encoded).await
    }

    /// Read and clear the background notification list
    pub async fn drain_background_notifications(&self) -> PushResult<Vec<PayloadSummary>> {
        let summaries = self.read_background().await?;
        self.store.remove_item(&self.background_key).await?;
        Ok(summaries)
    }

    async fn read_background(&self) -> PushResult<Vec<PayloadSummary>> {
        let Some(raw) = self.store.get_item(&self.background_key).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&raw) {
            Ok(summaries) => Ok(summaries),
            Err(e) => {
                tracing::warn!(error = %e, "Background notification list unreadable, starting over");
                Ok(Vec::new())
            },
        }
    }

    // A failed removal still hands the value out so its one dispatch attempt
    // happens now; the stale record is logged and left behind
    async fn take(&self, key: &str) -> PushResult<Option<String>> {
        let value = self.store.get_item(key).await?;
        if value.is_some()
            && let Err(e) = self.store.remove_item(key).await
        {
            tracing::warn!(key = %key, error = %e, "Failed to remove drained pending delivery");
        }
        Ok(value)
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> PushResult<String> {
    serde_json::to_string(value).map_err(|source| PushError::SerializationError {
        key: key.to_string(),
        source,
    })
}
