//! Job notifications.
//!
//! Delivery is fire-and-forget: sinks never fail the caller, they log and
//! move on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use vframe_models::{JobId, OwnerId};

use crate::error::QueueResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEvent {
    ProcessingStarted,
    Completed,
    Failed,
}

/// Notification published for a job lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobNotification {
    pub job_id: JobId,
    pub owner_id: OwnerId,
    pub event: JobEvent,
    pub message: String,
    /// Archive path on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl JobNotification {
    pub fn processing_started(job_id: JobId, owner_id: OwnerId, filename: &str) -> Self {
        Self::new(
            job_id,
            owner_id,
            JobEvent::ProcessingStarted,
            format!("Processing started for {filename}"),
            None,
        )
    }

    pub fn completed(job_id: JobId, owner_id: OwnerId, filename: &str, result_path: impl Into<String>) -> Self {
        Self::new(
            job_id,
            owner_id,
            JobEvent::Completed,
            format!("Processing completed for {filename}"),
            Some(result_path.into()),
        )
    }

    pub fn failed(job_id: JobId, owner_id: OwnerId, filename: &str, detail: &str) -> Self {
        Self::new(
            job_id,
            owner_id,
            JobEvent::Failed,
            format!("Processing failed for {filename}: {detail}"),
            None,
        )
    }

    fn new(
        job_id: JobId,
        owner_id: OwnerId,
        event: JobEvent,
        message: String,
        result_path: Option<String>,
    ) -> Self {
        Self {
            job_id,
            owner_id,
            event,
            message,
            result_path,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: JobNotification);
}

/// Sink that only writes to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, notification: JobNotification) {
        info!(
            job_id = %notification.job_id,
            owner_id = %notification.owner_id,
            event = ?notification.event,
            "{}",
            notification.message
        );
    }
}

/// Publishes notifications on a per-owner Redis Pub/Sub channel.
pub struct RedisNotifier {
    client: redis::Client,
    channel_prefix: String,
}

impl RedisNotifier {
    pub fn new(redis_url: &str, channel_prefix: impl Into<String>) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            channel_prefix: channel_prefix.into(),
        })
    }

    /// Read `REDIS_URL` and `NOTIFY_CHANNEL_PREFIX`.
    pub fn from_env() -> QueueResult<Self> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let prefix = std::env::var("NOTIFY_CHANNEL_PREFIX")
            .unwrap_or_else(|_| "vframe:notifications".to_string());
        Self::new(&redis_url, prefix)
    }

    /// Get the channel name for an owner.
    pub fn channel_name(&self, owner_id: OwnerId) -> String {
        format!("{}:{}", self.channel_prefix, owner_id)
    }

    async fn publish(&self, notification: &JobNotification) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = self.channel_name(notification.owner_id);
        let payload = serde_json::to_string(notification)?;

        debug!("Publishing job notification to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for RedisNotifier {
    async fn notify(&self, notification: JobNotification) {
        if let Err(e) = self.publish(&notification).await {
            warn!(
                job_id = %notification.job_id,
                "Failed to publish job notification: {}", e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_payload() {
        let n = JobNotification::completed(JobId(5), OwnerId(7), "clip.mp4", "/out/7_clip_processed.zip");
        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["event"], "completed");
        assert_eq!(value["owner_id"], 7);
        assert_eq!(value["result_path"], "/out/7_clip_processed.zip");
    }

    #[test]
    fn test_failed_message_includes_detail() {
        let n = JobNotification::failed(JobId(5), OwnerId(7), "clip.mp4", "no frames extracted");
        assert!(n.message.ends_with("no frames extracted"));
        assert!(n.result_path.is_none());
    }

    #[test]
    fn test_channel_name() {
        let notifier = RedisNotifier::new("redis://localhost:6379", "vframe:notifications").unwrap();
        assert_eq!(notifier.channel_name(OwnerId(7)), "vframe:notifications:7");
    }

    #[tokio::test]
    async fn test_unreachable_redis_does_not_fail_caller() {
        let notifier = RedisNotifier::new("redis://127.0.0.1:1", "test").unwrap();
        notifier
            .notify(JobNotification::processing_started(JobId(1), OwnerId(1), "a.mp4"))
            .await;
    }
}
