//! Durable job queue and job notifications.
//!
//! This crate provides:
//! - [`JobMessage`], the wire payload referencing a ledger job
//! - [`JobPublisher`] / [`JobConsumer`] seams with Redis Streams and in-memory backends
//! - At-least-once delivery: messages stay pending until acknowledged and
//!   idle pending messages can be reclaimed
//! - Fire-and-forget job notifications via Redis Pub/Sub or tracing

pub mod error;
pub mod job;
pub mod memory;
pub mod notify;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{Delivery, JobMessage};
pub use memory::InMemoryJobQueue;
pub use notify::{JobEvent, JobNotification, LogNotifier, NotificationSink, RedisNotifier};
pub use queue::{JobConsumer, JobPublisher, QueueConfig, RedisJobQueue};
