//! In-process queue with the same delivery semantics as the Redis backend.
//!
//! Messages are stored serialized so payload decoding is exercised the same
//! way. Delivered messages stay pending until acked and can be reclaimed
//! once idle.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::{Delivery, JobMessage};
use crate::queue::{JobConsumer, JobPublisher};

struct PendingEntry {
    payload: String,
    consumer: String,
    delivered_at: Instant,
}

#[derive(Default)]
struct State {
    ready: VecDeque<(String, String)>,
    pending: HashMap<String, PendingEntry>,
    dead_letters: Vec<(String, String)>,
}

#[derive(Default)]
pub struct InMemoryJobQueue {
    state: Mutex<State>,
    next_id: AtomicU64,
    available: Notify,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a raw payload, bypassing serialization.
    pub async fn push_raw(&self, payload: impl Into<String>) -> String {
        let id = format!("{}-0", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.state.lock().await.ready.push_back((id.clone(), payload.into()));
        self.available.notify_one();
        id
    }

    /// Messages not yet delivered.
    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Messages delivered but not acknowledged.
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Payloads moved aside because they could not be decoded.
    pub async fn dead_letters(&self) -> Vec<(String, String)> {
        self.state.lock().await.dead_letters.clone()
    }

    /// Decode payloads; undecodable ones are dead-lettered and never pending.
    fn decode(state: &mut State, entries: Vec<(String, String)>, consumer: &str) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(entries.len());
        for (id, payload) in entries {
            match JobMessage::from_json(&payload) {
                Ok(message) => {
                    state.pending.insert(
                        id.clone(),
                        PendingEntry {
                            payload,
                            consumer: consumer.to_string(),
                            delivered_at: Instant::now(),
                        },
                    );
                    deliveries.push(Delivery { id, message });
                }
                Err(e) => {
                    warn!("Failed to parse job payload {}: {}", id, e);
                    state.pending.remove(&id);
                    state.dead_letters.push((id, payload));
                }
            }
        }
        deliveries
    }
}

#[async_trait]
impl JobPublisher for InMemoryJobQueue {
    async fn publish(&self, message: &JobMessage) -> QueueResult<String> {
        let payload = message.to_json()?;
        let id = self.push_raw(payload).await;
        debug!("Enqueued job {} with message ID {}", message.job_id, id);
        Ok(id)
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}

#[async_trait]
impl JobConsumer for InMemoryJobQueue {
    async fn receive(&self, consumer: &str, block: Duration, count: usize) -> QueueResult<Vec<Delivery>> {
        let deadline = tokio::time::Instant::now() + block;
        loop {
            {
                let mut state = self.state.lock().await;
                if !state.ready.is_empty() {
                    let take = count.max(1).min(state.ready.len());
                    let batch: Vec<(String, String)> = state.ready.drain(..take).collect();
                    let deliveries = Self::decode(&mut state, batch, consumer);
                    if !deliveries.is_empty() {
                        return Ok(deliveries);
                    }
                    continue;
                }
            }

            if tokio::time::timeout_at(deadline, self.available.notified())
                .await
                .is_err()
            {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, delivery_id: &str) -> QueueResult<()> {
        match self.state.lock().await.pending.remove(delivery_id) {
            Some(_) => Ok(()),
            None => Err(QueueError::UnknownDelivery(delivery_id.to_string())),
        }
    }

    async fn reclaim(&self, consumer: &str, min_idle: Duration, count: usize) -> QueueResult<Vec<Delivery>> {
        let mut state = self.state.lock().await;
        let mut idle: Vec<(String, String)> = state
            .pending
            .iter()
            .filter(|(_, entry)| entry.delivered_at.elapsed() >= min_idle)
            .map(|(id, entry)| (id.clone(), entry.payload.clone()))
            .collect();
        idle.sort();
        idle.truncate(count);

        for (id, _) in &idle {
            if let Some(entry) = state.pending.get(id) {
                debug!("Reclaiming message {} from {}", id, entry.consumer);
            }
        }

        Ok(Self::decode(&mut state, idle, consumer))
    }
}
