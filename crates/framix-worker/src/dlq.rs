//! Dead-letter channel consumer.
//!
//! Every dead-lettered upload event gets exactly one remediation pass
//! through the same pipeline as a first delivery. The envelope is
//! acknowledged whichever way the pass goes and is never re-emitted; a
//! failed retry leaves the record at `Error` and surfaces only through
//! logs and metrics.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use framix_bus::{Delivery, EventBus};
use framix_models::DeadLetterEnvelope;

use crate::metrics;
use crate::pipeline::{self, PipelineContext, PipelineOutcome, RetryPass};

const READ_BATCH: usize = 1;
const CLAIM_BATCH: usize = 5;
const READ_RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct DlqConsumer {
    bus: Arc<EventBus>,
    ctx: Arc<PipelineContext>,
    shutdown: watch::Sender<bool>,
}

impl DlqConsumer {
    pub fn new(bus: Arc<EventBus>, ctx: Arc<PipelineContext>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self { bus, ctx, shutdown }
    }

    /// Spawn the dead-letter consumer tasks and return their join handles.
    pub fn run(&self) -> Vec<JoinHandle<()>> {
        let partitions = self.bus.config().dlq_partitions;
        let tasks = self
            .ctx
            .config
            .dlq_consumer_concurrency
            .min(partitions as usize)
            .max(1);
        info!(partitions, tasks, "Starting dead-letter consumers");

        (0..tasks)
            .map(|task_index| {
                let owned: Vec<u32> = (task_index as u32..partitions)
                    .step_by(tasks)
                    .collect();
                let bus = Arc::clone(&self.bus);
                let ctx = Arc::clone(&self.ctx);
                let shutdown = self.shutdown.subscribe();
                tokio::spawn(async move {
                    consume_partitions(bus, ctx, owned, shutdown).await;
                })
            })
            .collect()
    }

    /// Ask all consumer tasks to stop after their current delivery.
    pub fn shutdown(&self) {
        self.shutdown.send(true).ok();
    }
}

async fn consume_partitions(
    bus: Arc<EventBus>,
    ctx: Arc<PipelineContext>,
    partitions: Vec<u32>,
    shutdown: watch::Receiver<bool>,
) {
    let consumer_name = format!("dlq-worker-{}", Uuid::new_v4());
    info!(consumer = %consumer_name, ?partitions, "Dead-letter consumer started");

    let config = &ctx.config;
    let block_ms = config.read_block.as_millis() as u64;
    let mut last_claim = Instant::now();

    while !*shutdown.borrow() {
        if last_claim.elapsed() >= config.claim_interval {
            for &partition in &partitions {
                claim_pass(&bus, &ctx, partition, &consumer_name).await;
            }
            last_claim = Instant::now();
        }

        for &partition in &partitions {
            if *shutdown.borrow() {
                break;
            }
            match bus
                .read_dlq(partition, &consumer_name, READ_BATCH, block_ms)
                .await
            {
                Ok(deliveries) => {
                    for delivery in deliveries {
                        handle_delivery(&bus, &ctx, partition, delivery).await;
                    }
                }
                Err(e) => {
                    error!(partition, "Failed to read dead-letter channel: {e}");
                    tokio::time::sleep(READ_RETRY_DELAY).await;
                }
            }
        }
    }

    info!(consumer = %consumer_name, "Dead-letter consumer stopped");
}

async fn claim_pass(
    bus: &EventBus,
    ctx: &PipelineContext,
    partition: u32,
    consumer_name: &str,
) {
    let min_idle_ms = ctx.config.claim_min_idle.as_millis() as u64;
    match bus
        .claim_dlq(partition, consumer_name, min_idle_ms, CLAIM_BATCH)
        .await
    {
        Ok(claimed) => {
            for delivery in claimed {
                handle_delivery(bus, ctx, partition, delivery).await;
            }
        }
        Err(e) => warn!(partition, "Claim pass failed: {e}"),
    }
}

async fn handle_delivery(
    bus: &EventBus,
    ctx: &PipelineContext,
    partition: u32,
    delivery: Delivery,
) {
    let envelope: DeadLetterEnvelope = match serde_json::from_str(&delivery.payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(
                partition,
                entry_id = %delivery.entry_id,
                "Dropping poison dead-letter payload: {e}"
            );
            metrics::record_poison("dlq");
            ack(bus, partition, &delivery.entry_id).await;
            return;
        }
    };

    metrics::record_consumed("dlq");

    match envelope.event_type.as_str() {
        "video_upload" => retry_upload(ctx, &envelope).await,
        other => {
            warn!(event_type = %other, "No retry handler for dead-lettered event type, dropping");
        }
    }

    // One-shot remediation: acknowledged however the pass went, never
    // re-emitted.
    ack(bus, partition, &delivery.entry_id).await;
}

async fn retry_upload(ctx: &PipelineContext, envelope: &DeadLetterEnvelope) {
    let event = match envelope.decode_original() {
        Ok(event) => event,
        Err(e) => {
            warn!(
                reason = %envelope.failure_reason,
                "Dead-lettered event no longer decodes, dropping: {e}"
            );
            return;
        }
    };

    info!(
        video_id = %event.video_id(),
        reason = %envelope.failure_reason,
        "Retrying dead-lettered upload event"
    );

    match pipeline::process_event(ctx, &event, RetryPass::DlqRetry).await {
        PipelineOutcome::Finished { frame_count, .. } => {
            metrics::record_dlq_retry(true);
            info!(
                video_id = %event.video_id(),
                frame_count,
                "Video processing completed after DLQ retry"
            );
        }
        PipelineOutcome::Failed { failure } => {
            metrics::record_dlq_retry(false);
            // The error_message field matches what the pipeline just persisted
            error!(
                video_id = %event.video_id(),
                cause = failure.cause(),
                error_message = %failure.status_message(RetryPass::DlqRetry),
                "Video processing failed after DLQ retry"
            );
        }
        PipelineOutcome::AlreadyProcessing => {
            metrics::record_already_processing();
            info!(video_id = %event.video_id(), "Retry skipped, video locked by another worker");
        }
        PipelineOutcome::VideoMissing => {
            metrics::record_video_missing();
            warn!(video_id = %event.video_id(), "Dead-lettered event references a missing video, dropping");
        }
        PipelineOutcome::StoreUnavailable { detail } => {
            metrics::record_store_unavailable();
            metrics::record_dlq_retry(false);
            error!(
                video_id = %event.video_id(),
                "Retry could not reach the status store, giving up: {detail}"
            );
        }
    }
}

async fn ack(bus: &EventBus, partition: u32, entry_id: &str) {
    if let Err(e) = bus.ack_dlq(partition, entry_id).await {
        warn!(partition, entry_id, "Failed to acknowledge dead-letter entry: {e}");
    }
}
