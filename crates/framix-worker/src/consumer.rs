//! Processing-channel consumer.
//!
//! Partitions are divided round-robin across a fixed set of tasks, so each
//! partition has exactly one reader and per-video ordering holds. Every
//! delivery is acknowledged after handling, whatever the outcome; failed
//! videos rest at `Error` locally and are routed to the dead-letter channel
//! for the bounded retry instead of being redelivered here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use framix_bus::{Delivery, EventBus};
use framix_models::{DeadLetterEnvelope, VideoEvent};

use crate::config::WorkerConfig;
use crate::metrics;
use crate::pipeline::{self, PipelineContext, PipelineOutcome, RetryPass};

/// One entry per read; the pipeline runs long, batching buys nothing.
const READ_BATCH: usize = 1;
/// Upper bound on entries reclaimed from dead consumers per pass.
const CLAIM_BATCH: usize = 5;
/// Backoff after a failed channel read.
const READ_RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct ProcessingConsumer {
    bus: Arc<EventBus>,
    ctx: Arc<PipelineContext>,
    shutdown: watch::Sender<bool>,
}

impl ProcessingConsumer {
    pub fn new(bus: Arc<EventBus>, ctx: Arc<PipelineContext>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self { bus, ctx, shutdown }
    }

    /// Spawn the consumer tasks and return their join handles.
    pub fn run(&self) -> Vec<JoinHandle<()>> {
        let partitions = self.bus.config().processing_partitions;
        let tasks = self
            .ctx
            .config
            .consumer_concurrency
            .min(partitions as usize)
            .max(1);
        info!(partitions, tasks, "Starting processing consumers");

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
    let consumer_name = format!("worker-{}", Uuid::new_v4());
    info!(consumer = %consumer_name, ?partitions, "Processing consumer started");

    let config = &ctx.config;
    let block_ms = config.read_block.as_millis() as u64;
    let mut last_claim = Instant::now();

    while !*shutdown.borrow() {
        // Periodically reclaim entries left pending by crashed consumers
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
                .read_processing(partition, &consumer_name, READ_BATCH, block_ms)
                .await
            {
                Ok(deliveries) => {
                    for delivery in deliveries {
                        handle_delivery(&bus, &ctx, partition, delivery).await;
                    }
                }
                Err(e) => {
                    error!(partition, "Failed to read processing channel: {e}");
                    tokio::time::sleep(READ_RETRY_DELAY).await;
                }
            }
        }
    }

    info!(consumer = %consumer_name, "Processing consumer stopped");
}

async fn claim_pass(
    bus: &EventBus,
    ctx: &PipelineContext,
    partition: u32,
    consumer_name: &str,
) {
    let min_idle_ms = ctx.config.claim_min_idle.as_millis() as u64;
    match bus
        .claim_processing(partition, consumer_name, min_idle_ms, CLAIM_BATCH)
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
    let event: VideoEvent = match serde_json::from_str(&delivery.payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(
                partition,
                entry_id = %delivery.entry_id,
                "Dropping poison payload: {e}"
            );
            metrics::record_poison("processing");
            ack(bus, partition, &delivery.entry_id).await;
            return;
        }
    };

    metrics::record_consumed("processing");
    let started = Instant::now();
    let outcome = pipeline::process_event(ctx, &event, RetryPass::Initial).await;
    let elapsed = started.elapsed().as_secs_f64();

    match &outcome {
        PipelineOutcome::Finished { frame_count, .. } => {
            metrics::record_finished(elapsed);
            info!(video_id = %event.video_id(), frame_count, "Event processed");
        }
        PipelineOutcome::Failed { failure } => {
            metrics::record_failed(failure.cause(), elapsed);
        }
        PipelineOutcome::AlreadyProcessing => metrics::record_already_processing(),
        PipelineOutcome::VideoMissing => metrics::record_video_missing(),
        PipelineOutcome::StoreUnavailable { .. } => metrics::record_store_unavailable(),
    }

    if ctx.config.route_failures_to_dlq {
        let routed = match &outcome {
            PipelineOutcome::Failed { failure } => Some((
                failure.status_message(RetryPass::Initial),
                format!("{failure:?}"),
            )),
            PipelineOutcome::StoreUnavailable { detail } => Some((
                format!("Status store unavailable: {detail}"),
                detail.clone(),
            )),
            _ => None,
        };
        if let Some((reason, trace)) = routed {
            route_to_dlq(bus, &event, &reason, trace).await;
        }
    }

    // At-least-once meets local terminal states: the entry is acknowledged
    // whatever happened, so this channel never redelivers it.
    ack(bus, partition, &delivery.entry_id).await;
}

async fn route_to_dlq(bus: &EventBus, event: &VideoEvent, reason: &str, trace: String) {
    let envelope = match DeadLetterEnvelope::for_event(event, reason) {
        Ok(envelope) => envelope
            .with_stack_trace(trace)
            .with_original_topic(&bus.config().processing_stream),
        Err(e) => {
            error!(video_id = %event.video_id(), "Failed to build dead-letter envelope: {e}");
            return;
        }
    };

    match bus.send_to_dlq(&envelope).await {
        Ok(_) => metrics::record_dlq_routed(),
        Err(e) => error!(
            video_id = %event.video_id(),
            "CRITICAL: dead-letter routing failed, this failure will not be retried: {e}"
        ),
    }
}

async fn ack(bus: &EventBus, partition: u32, entry_id: &str) {
    if let Err(e) = bus.ack_processing(partition, entry_id).await {
        warn!(partition, entry_id, "Failed to acknowledge entry: {e}");
    }
}
