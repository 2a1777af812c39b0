//! Job queue using Redis Streams.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::{Delivery, JobMessage};

/// Publishing side, shared by concurrent submissions.
#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Enqueue a message, returning the backend message id.
    async fn publish(&self, message: &JobMessage) -> QueueResult<String>;

    /// Reachability check for health reporting.
    async fn ping(&self) -> QueueResult<()>;
}

/// Consuming side, used by the worker loop.
///
/// Delivered messages stay pending until [`JobConsumer::ack`] is called.
#[async_trait]
pub trait JobConsumer: Send + Sync {
    /// Wait up to `block` for new messages.
    async fn receive(&self, consumer: &str, block: Duration, count: usize) -> QueueResult<Vec<Delivery>>;

    async fn ack(&self, delivery_id: &str) -> QueueResult<()>;

    /// Take over messages that were delivered but not acknowledged for at
    /// least `min_idle`, e.g. from a crashed worker.
    async fn reclaim(&self, consumer: &str, min_idle: Duration, count: usize) -> QueueResult<Vec<Delivery>>;
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter stream for payloads that cannot be decoded
    pub dlq_stream_name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vframe:jobs".to_string(),
            consumer_group: "vframe:workers".to_string(),
            dlq_stream_name: "vframe:dlq".to_string(),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
        }
    }
}

/// Redis Streams queue client.
pub struct RedisJobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisJobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| QueueError::connection_failed(format!("invalid redis url: {e}")))?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // Start at 0 so messages published before the first worker are still delivered
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Move an undecodable entry to the dead letter stream and ack it.
    async fn dead_letter(&self, message_id: &str, payload: &str, error: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id).await?;

        warn!("Moved message {} to DLQ: {}", message_id, error);
        Ok(())
    }

    /// Decode stream entries, dead-lettering the ones that are not job messages.
    async fn decode_entries(&self, entries: Vec<redis::streams::StreamId>) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(entries.len());

        for entry in entries {
            let payload = match entry.map.get("job") {
                Some(value) => redis::from_redis_value::<String>(value).unwrap_or_default(),
                None => String::new(),
            };

            match JobMessage::from_json(&payload) {
                Ok(message) => {
                    debug!("Consumed job {} as message {}", message.job_id, entry.id);
                    deliveries.push(Delivery {
                        id: entry.id,
                        message,
                    });
                }
                Err(e) => {
                    warn!("Failed to parse job payload {}: {}", entry.id, e);
                    if let Err(dlq_err) = self.dead_letter(&entry.id, &payload, &e.to_string()).await {
                        warn!("Failed to dead-letter message {}: {}", entry.id, dlq_err);
                    }
                }
            }
        }

        deliveries
    }
}

#[async_trait]
impl JobPublisher for RedisJobQueue {
    async fn publish(&self, message: &JobMessage) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = message.to_json()?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        info!("Enqueued job {} with message ID {}", message.job_id, message_id);
        Ok(message_id)
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl JobConsumer for RedisJobQueue {
    async fn receive(&self, consumer: &str, block: Duration, count: usize) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // A timed-out BLOCK comes back as nil
        let result: Option<redis::streams::StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let entries = result
            .map(|reply| reply.keys.into_iter().flat_map(|key| key.ids).collect())
            .unwrap_or_default();

        Ok(self.decode_entries(entries).await)
    }

    async fn ack(&self, delivery_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(delivery_id)
            .query_async::<()>(&mut conn)
            .await?;

        // Delete the message from the stream
        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(delivery_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged message: {}", delivery_id);
        Ok(())
    }

    async fn reclaim(&self, consumer: &str, min_idle: Duration, count: usize) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let min_idle_ms = min_idle.as_millis() as u64;

        let pending: redis::streams::StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(min_idle_ms);
        for entry in &pending.ids {
            cmd.arg(&entry.id);
        }

        let claimed: redis::streams::StreamClaimReply = cmd.query_async(&mut conn).await?;
        if !claimed.ids.is_empty() {
            info!("Claimed {} idle pending messages", claimed.ids.len());
        }

        Ok(self.decode_entries(claimed.ids).await)
    }
}
