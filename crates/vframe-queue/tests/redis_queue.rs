//! Redis Streams integration tests.

use std::time::Duration;

use vframe_models::{JobId, OwnerId};
use vframe_queue::{JobConsumer, JobMessage, JobPublisher, QueueConfig, RedisJobQueue};

/// Queue on a throwaway stream so runs do not interfere.
async fn queue() -> RedisJobQueue {
    dotenvy::dotenv().ok();
    let suffix = uuid::Uuid::new_v4();
    let config = QueueConfig {
        stream_name: format!("vframe:test:jobs:{suffix}"),
        consumer_group: format!("vframe:test:workers:{suffix}"),
        dlq_stream_name: format!("vframe:test:dlq:{suffix}"),
        ..QueueConfig::from_env()
    };
    let queue = RedisJobQueue::new(config).expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");
    queue
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_publish_receive_ack() {
    let queue = queue().await;
    queue.ping().await.expect("ping failed");

    let message = JobMessage::new(JobId(1), OwnerId(7), "uploads/7_x.mp4", "x.mp4");
    queue.publish(&message).await.expect("Failed to publish");

    let deliveries = queue
        .receive("test-consumer", Duration::from_secs(1), 1)
        .await
        .expect("Failed to receive");
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].message, message);

    queue.ack(&deliveries[0].id).await.expect("Failed to ack");
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_unacked_message_is_reclaimed() {
    let queue = queue().await;
    let message = JobMessage::new(JobId(2), OwnerId(7), "uploads/7_y.mp4", "y.mp4");
    queue.publish(&message).await.unwrap();

    let first = queue
        .receive("crashed-consumer", Duration::from_secs(1), 1)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let reclaimed = queue
        .reclaim("rescuer", Duration::from_millis(10), 10)
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].message.job_id, JobId(2));

    queue.ack(&reclaimed[0].id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_empty_stream_returns_nothing() {
    let queue = queue().await;
    let deliveries = queue
        .receive("idle-consumer", Duration::from_millis(100), 1)
        .await
        .unwrap();
    assert!(deliveries.is_empty());
    assert_eq!(queue.dlq_len().await.unwrap(), 0);
}
