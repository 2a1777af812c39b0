//! Job executor.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vframe_models::JobId;
use vframe_queue::{Delivery, JobConsumer};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::processor::JobProcessor;

/// Messages fetched per queue read or reclaim pass.
const BATCH_SIZE: usize = 5;

/// Upper bound on messages reclaimed by one drain.
const DRAIN_RECLAIM_LIMIT: usize = 100;

/// State shared with spawned job tasks.
struct Shared {
    consumer: Arc<dyn JobConsumer>,
    processor: JobProcessor,
    /// Jobs currently running in this process
    in_flight: Mutex<HashSet<JobId>>,
}

impl Shared {
    fn begin(&self, job_id: JobId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(job_id)
    }

    fn finish(&self, job_id: JobId) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&job_id);
    }

    /// Process one delivery and ack it once the job is settled.
    async fn execute_job(&self, delivery: Delivery) {
        let job_id = delivery.message.job_id;

        // Two deliveries of one job must not share an output directory
        if !self.begin(job_id) {
            warn!(
                "Job {} is already running, leaving message {} for redelivery",
                job_id, delivery.id
            );
            return;
        }

        let result = self.processor.process(&delivery.message).await;
        self.finish(job_id);

        match result {
            Ok(outcome) => {
                info!("Job {} settled: {:?}", job_id, outcome);
                if let Err(e) = self.consumer.ack(&delivery.id).await {
                    error!("Failed to ack job {}: {}", job_id, e);
                }
            }
            Err(e) => {
                error!(
                    "Job {} not settled, message {} left for redelivery: {}",
                    job_id, delivery.id, e
                );
            }
        }
    }
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    shared: Arc<Shared>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    /// Flipped when in-flight jobs outlive the shutdown timeout
    abort: Option<watch::Sender<bool>>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, consumer: Arc<dyn JobConsumer>, processor: JobProcessor) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            shared: Arc::new(Shared {
                consumer,
                processor,
                in_flight: Mutex::new(HashSet::new()),
            }),
            job_semaphore,
            shutdown,
            abort: None,
            consumer_name,
        }
    }

    /// Sender used to kill running extractions on a forced shutdown.
    pub fn with_abort(mut self, abort: watch::Sender<bool>) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Consume until shutdown is signalled.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        // Periodically take over messages whose consumer died mid-job
        let shared = Arc::clone(&self.shared);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let claim_interval = self.config.claim_interval;
        let claim_min_idle = self.config.claim_min_idle;
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match shared.consumer.reclaim(&consumer_name, claim_min_idle, BATCH_SIZE).await {
                            Ok(deliveries) if !deliveries.is_empty() => {
                                info!("Claimed {} pending jobs", deliveries.len());
                                for delivery in deliveries {
                                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                        break;
                                    };
                                    let shared = Arc::clone(&shared);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        shared.execute_job(delivery).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Failed to claim pending jobs: {}", e),
                        }
                    }
                }
            }
        });

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs still running after {:?}, cancelling them",
                self.config.shutdown_timeout
            );
            if let Some(abort) = &self.abort {
                let _ = abort.send(true);
            }
            // Cancelled jobs return quickly and stay unacked
            let _ = tokio::time::timeout(Duration::from_secs(5), self.wait_for_jobs()).await;
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Read new messages for free job slots.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .shared
            .consumer
            .receive(&self.consumer_name, self.config.receive_block, available.min(BATCH_SIZE))
            .await?;

        if deliveries.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", deliveries.len());

        for delivery in deliveries {
            let shared = Arc::clone(&self.shared);
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::Cancelled)?;

            tokio::spawn(async move {
                let _permit = permit;
                shared.execute_job(delivery).await;
            });
        }

        Ok(())
    }

    /// Process everything currently available, one job at a time, then return.
    ///
    /// Reclaimable pending messages are taken first. Returns how many
    /// deliveries were handled.
    pub async fn drain(&self) -> WorkerResult<usize> {
        let mut handled = 0;

        let reclaimed = self
            .shared
            .consumer
            .reclaim(&self.consumer_name, self.config.claim_min_idle, DRAIN_RECLAIM_LIMIT)
            .await?;
        for delivery in reclaimed {
            self.shared.execute_job(delivery).await;
            handled += 1;
        }

        loop {
            let deliveries = self
                .shared
                .consumer
                .receive(&self.consumer_name, Duration::from_millis(10), 1)
                .await?;
            if deliveries.is_empty() {
                break;
            }
            for delivery in deliveries {
                self.shared.execute_job(delivery).await;
                handled += 1;
            }
        }

        Ok(handled)
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        let total = self.config.max_concurrent_jobs.max(1);
        while self.job_semaphore.available_permits() < total {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
