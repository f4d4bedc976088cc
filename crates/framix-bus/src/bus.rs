//! Partitioned event bus over Redis Streams.
//!
//! Each channel is a set of `{base}.{partition}` streams with one consumer
//! group per stream. A message's partition is derived from its key, so all
//! events for one video land on the same stream and stay ordered; different
//! videos spread across partitions and process in parallel.

use redis::AsyncCommands;
use tracing::{debug, error, info, warn};

use framix_models::{DeadLetterEnvelope, VideoEvent};

use crate::config::BusConfig;
use crate::error::{BusError, BusResult};

/// Key every dead-letter envelope is published under.
const DLQ_KEY: &str = "failure";

/// Result of a publish attempt.
///
/// Publishing is at-least-once with a synchronous dead-letter fallback;
/// the outcome makes the fallback observable instead of burying it in logs.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum PublishOutcome {
    /// Delivered to the processing channel.
    Delivered { partition: u32, entry_id: String },
    /// Processing channel rejected the event; the dead-letter envelope went
    /// through instead.
    DeadLettered { reason: String },
    /// Both sends failed. The event is gone; the critical log line is the
    /// only trace of it.
    Lost { reason: String },
}

impl PublishOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PublishOutcome::Delivered { .. })
    }
}

/// One raw entry read from a channel.
///
/// Payload decoding happens at the consumer boundary, not here, so poison
/// payloads survive long enough to be acknowledged and dropped explicitly.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Stream entry id, needed for acknowledgment
    pub entry_id: String,
    /// Partition key the entry was published under
    pub key: Option<String>,
    /// Raw JSON payload
    pub payload: String,
}

/// Event bus client.
pub struct EventBus {
    client: redis::Client,
    config: BusConfig,
}

impl EventBus {
    /// Create a new bus client.
    pub fn new(config: BusConfig) -> BusResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> BusResult<Self> {
        Self::new(BusConfig::from_env())
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Partition index for a message key on the processing channel.
    pub fn processing_partition(&self, key: &str) -> u32 {
        partition_for(key, self.config.processing_partitions)
    }

    /// Initialize all partition streams and their consumer groups.
    pub async fn init(&self) -> BusResult<()> {
        for partition in 0..self.config.processing_partitions {
            self.create_group(
                &partition_stream(&self.config.processing_stream, partition),
                &self.config.processing_group,
            )
            .await?;
        }
        for partition in 0..self.config.dlq_partitions {
            self.create_group(
                &partition_stream(&self.config.dlq_stream, partition),
                &self.config.dlq_group,
            )
            .await?;
        }
        Ok(())
    }

    async fn create_group(&self, stream: &str, group: &str) -> BusResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // Create consumer group (ignore error if already exists)
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group {group} on {stream}"),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group {group} already exists on {stream}");
            }
            Err(e) => return Err(BusError::Redis(e)),
        }

        Ok(())
    }

    /// Health probe against the bus backend.
    pub async fn ping(&self) -> BusResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(BusError::unexpected_reply(reply))
        }
    }

    /// Publish an event to the processing channel.
    ///
    /// On send failure the event is synchronously redirected to the
    /// dead-letter channel; if that also fails, the loss is logged as
    /// critical and reported via [`PublishOutcome::Lost`].
    pub async fn publish(&self, event: &VideoEvent) -> BusResult<PublishOutcome> {
        let payload = serde_json::to_string(event)?;
        let key = event.partition_key();
        let partition = self.processing_partition(&key);
        let stream = partition_stream(&self.config.processing_stream, partition);

        match self
            .append(&stream, &key, &payload, self.config.processing_maxlen)
            .await
        {
            Ok(entry_id) => {
                debug!(
                    video_id = %event.video_id(),
                    partition,
                    entry_id = %entry_id,
                    "Published event"
                );
                Ok(PublishOutcome::Delivered { partition, entry_id })
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(
                    video_id = %event.video_id(),
                    "Publish failed, redirecting to dead-letter channel: {reason}"
                );

                let envelope = DeadLetterEnvelope::for_event(event, &reason)?
                    .with_stack_trace(format!("{e:?}"))
                    .with_original_topic(&self.config.processing_stream);

                match self.send_to_dlq(&envelope).await {
                    Ok(_) => Ok(PublishOutcome::DeadLettered { reason }),
                    Err(dlq_err) => {
                        error!(
                            video_id = %event.video_id(),
                            publish_error = %reason,
                            dlq_error = %dlq_err,
                            "CRITICAL: dead-letter redirect failed, event lost"
                        );
                        Ok(PublishOutcome::Lost { reason })
                    }
                }
            }
        }
    }

    /// Append a dead-letter envelope to the dead-letter channel.
    pub async fn send_to_dlq(&self, envelope: &DeadLetterEnvelope) -> BusResult<String> {
        let payload = serde_json::to_string(envelope)?;
        let partition = partition_for(DLQ_KEY, self.config.dlq_partitions);
        let stream = partition_stream(&self.config.dlq_stream, partition);

        let entry_id = self
            .append(&stream, DLQ_KEY, &payload, self.config.dlq_maxlen)
            .await?;
        warn!(
            event_type = %envelope.event_type,
            reason = %envelope.failure_reason,
            entry_id = %entry_id,
            "Event routed to dead-letter channel"
        );
        Ok(entry_id)
    }

    async fn append(
        &self,
        stream: &str,
        key: &str,
        payload: &str,
        maxlen: Option<u64>,
    ) -> BusResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream);
        if let Some(maxlen) = maxlen {
            cmd.arg("MAXLEN").arg("~").arg(maxlen);
        }
        cmd.arg("*").arg("key").arg(key).arg("payload").arg(payload);

        let entry_id: String = cmd.query_async(&mut conn).await?;
        Ok(entry_id)
    }

    /// Read new entries from one processing partition.
    pub async fn read_processing(
        &self,
        partition: u32,
        consumer_name: &str,
        count: usize,
        block_ms: u64,
    ) -> BusResult<Vec<Delivery>> {
        self.read(
            &partition_stream(&self.config.processing_stream, partition),
            &self.config.processing_group,
            consumer_name,
            count,
            block_ms,
        )
        .await
    }

    /// Read new entries from one dead-letter partition.
    pub async fn read_dlq(
        &self,
        partition: u32,
        consumer_name: &str,
        count: usize,
        block_ms: u64,
    ) -> BusResult<Vec<Delivery>> {
        self.read(
            &partition_stream(&self.config.dlq_stream, partition),
            &self.config.dlq_group,
            consumer_name,
            count,
            block_ms,
        )
        .await
    }

    async fn read(
        &self,
        stream: &str,
        group: &str,
        consumer_name: &str,
        count: usize,
        block_ms: u64,
    ) -> BusResult<Vec<Delivery>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(stream)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let mut deliveries = Vec::new();
        for stream_key in result.keys {
            for entry in stream_key.ids {
                match parse_entry(&entry) {
                    Some(delivery) => deliveries.push(delivery),
                    None => {
                        // Entry without a payload field; ack so it never redelivers
                        warn!(entry_id = %entry.id, "Dropping malformed bus entry");
                        self.ack(stream, group, &entry.id).await.ok();
                    }
                }
            }
        }

        Ok(deliveries)
    }

    /// Acknowledge a processing-channel entry.
    pub async fn ack_processing(&self, partition: u32, entry_id: &str) -> BusResult<()> {
        self.ack(
            &partition_stream(&self.config.processing_stream, partition),
            &self.config.processing_group,
            entry_id,
        )
        .await
    }

    /// Acknowledge a dead-letter entry.
    pub async fn ack_dlq(&self, partition: u32, entry_id: &str) -> BusResult<()> {
        self.ack(
            &partition_stream(&self.config.dlq_stream, partition),
            &self.config.dlq_group,
            entry_id,
        )
        .await
    }

    async fn ack(&self, stream: &str, group: &str, entry_id: &str) -> BusResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(stream)
            .arg(group)
            .arg(entry_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!(entry_id, "Acknowledged entry");
        Ok(())
    }

    /// Claim processing-channel entries stuck pending on crashed consumers.
    pub async fn claim_processing(
        &self,
        partition: u32,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> BusResult<Vec<Delivery>> {
        self.claim(
            &partition_stream(&self.config.processing_stream, partition),
            &self.config.processing_group,
            consumer_name,
            min_idle_ms,
            count,
        )
        .await
    }

    /// Claim dead-letter entries stuck pending on crashed consumers.
    pub async fn claim_dlq(
        &self,
        partition: u32,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> BusResult<Vec<Delivery>> {
        self.claim(
            &partition_stream(&self.config.dlq_stream, partition),
            &self.config.dlq_group,
            consumer_name,
            min_idle_ms,
            count,
        )
        .await
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> BusResult<Vec<Delivery>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // XCLAIM transfers only ids named explicitly, so the candidates come
        // from the extended XPENDING listing, filtered to entries idle past
        // the threshold
        let pending: redis::streams::StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(stream)
            .arg(group)
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
        cmd.arg(stream).arg(group).arg(consumer_name).arg(min_idle_ms);
        for entry in &pending.ids {
            cmd.arg(&entry.id);
        }

        // An entry another consumer claimed in between has its idle time
        // reset and drops out of the reply
        let result: redis::streams::StreamClaimReply = cmd.query_async(&mut conn).await?;

        let mut deliveries = Vec::new();
        for entry in result.ids {
            match parse_entry(&entry) {
                Some(delivery) => {
                    info!(entry_id = %delivery.entry_id, "Claimed pending entry");
                    deliveries.push(delivery);
                }
                None => {
                    warn!(entry_id = %entry.id, "Dropping malformed claimed entry");
                    self.ack(stream, group, &entry.id).await.ok();
                }
            }
        }

        Ok(deliveries)
    }

    /// Length of one processing partition stream.
    pub async fn processing_len(&self, partition: u32) -> BusResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn
            .xlen(partition_stream(&self.config.processing_stream, partition))
            .await?;
        Ok(len)
    }

    /// Length of one dead-letter partition stream.
    pub async fn dlq_len(&self, partition: u32) -> BusResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn
            .xlen(partition_stream(&self.config.dlq_stream, partition))
            .await?;
        Ok(len)
    }
}

fn parse_entry(entry: &redis::streams::StreamId) -> Option<Delivery> {
    let payload = match entry.map.get("payload") {
        Some(redis::Value::BulkString(bytes)) => String::from_utf8_lossy(bytes).to_string(),
        _ => return None,
    };
    let key = match entry.map.get("key") {
        Some(redis::Value::BulkString(bytes)) => Some(String::from_utf8_lossy(bytes).to_string()),
        _ => None,
    };
    Some(Delivery {
        entry_id: entry.id.clone(),
        key,
        payload,
    })
}

/// Stream name of one partition.
pub fn partition_stream(base: &str, partition: u32) -> String {
    format!("{base}.{partition}")
}

/// Stable key-to-partition mapping (FNV-1a over the key bytes).
///
/// Producers and consumers on different hosts must agree on the mapping,
/// so the std hasher with its per-version behavior is not an option.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in key.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    (hash % u64::from(partitions.max(1))) as u32
}
