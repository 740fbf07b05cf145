use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use iotstream_nats::{BrokerMessage, QueueClient};
use iotstream_runner::AppProcess;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::service::IngestionService;

const FETCH_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Lifecycle of an [`IngestionWorker`]
///
/// `Idle → Connecting → Listening → (ProcessingMessage → Listening)* → Draining → Stopped`,
/// or `Connecting → Stopped` when the consumer cannot be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Connecting,
    Listening,
    ProcessingMessage,
    Draining,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct IngestionWorkerConfig {
    pub fetch_timeout: Duration,
}

impl Default for IngestionWorkerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_millis(1000),
        }
    }
}

/// Pulls batches from the ingest topic and hands each message to the ingestion service
///
/// Messages are processed one at a time in arrival order. Delivery is
/// at-most-once: a message that fails any step is logged and dropped.
pub struct IngestionWorker {
    queue: Arc<QueueClient>,
    service: Arc<IngestionService>,
    config: IngestionWorkerConfig,
    state: watch::Sender<WorkerState>,
}

impl IngestionWorker {
    pub fn new(
        queue: Arc<QueueClient>,
        service: Arc<IngestionService>,
        config: IngestionWorkerConfig,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Idle);
        Self {
            queue,
            service,
            config,
            state,
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    fn transition(&self, next: WorkerState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "Worker state changed");
        }
    }

    /// Run until `ctx` is cancelled
    ///
    /// Returns an error only when the consumer cannot be opened; the process
    /// supervisor is expected to restart the worker.
    pub async fn run(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        self.transition(WorkerState::Connecting);

        let topic = self.queue.config().ingest_topic.clone();
        if let Err(e) = self.queue.connect_consumer(&topic).await {
            error!(topic = %topic, error = %e, "Ingestion worker could not connect, stopping");
            self.queue.close().await;
            self.transition(WorkerState::Stopped);
            return Err(e).with_context(|| format!("Failed to open consumer on '{}'", topic));
        }

        info!(topic = %topic, "Ingestion worker listening");
        self.transition(WorkerState::Listening);

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    info!("Received shutdown signal, draining ingestion worker");
                    break;
                }
                result = self.queue.fetch_batch(self.config.fetch_timeout) => {
                    match result {
                        Ok(batch) => self.process_batch(batch).await,
                        Err(e) => {
                            error!(error = %e, "Error fetching batch");
                            tokio::select! {
                                _ = ctx.cancelled() => break,
                                _ = tokio::time::sleep(FETCH_ERROR_BACKOFF) => {}
                            }
                        }
                    }
                }
            }
        }

        self.transition(WorkerState::Draining);
        self.queue.close().await;
        self.transition(WorkerState::Stopped);
        info!("Ingestion worker stopped");
        Ok(())
    }

    /// Every message of a fetched batch is processed, even once shutdown has been requested
    async fn process_batch(&self, batch: Vec<BrokerMessage>) {
        for message in batch {
            self.transition(WorkerState::ProcessingMessage);

            let span = info_span!("ingest_message", subject = %message.subject);
            span.in_scope(|| message.attach_trace_parent());

            match self.service.ingest(&message).instrument(span).await {
                Ok(reading) => debug!(reading_id = reading.id, "Message ingested"),
                Err(e) => warn!(subject = %message.subject, error = %e, "Message dropped"),
            }

            self.transition(WorkerState::Listening);
        }
    }

    pub fn into_runner_process(self) -> AppProcess {
        Box::new(move |ctx| Box::pin(async move { self.run(ctx).await }))
    }
}
