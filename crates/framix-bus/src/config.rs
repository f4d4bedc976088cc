//! Bus configuration.

/// Event bus configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Redis URL
    pub redis_url: String,
    /// Base name of the processing channel streams
    pub processing_stream: String,
    /// Number of processing partitions
    pub processing_partitions: u32,
    /// Consumer group on the processing channel
    pub processing_group: String,
    /// Base name of the dead-letter channel streams
    pub dlq_stream: String,
    /// Number of dead-letter partitions
    pub dlq_partitions: u32,
    /// Consumer group on the dead-letter channel
    pub dlq_group: String,
    /// Approximate cap on processing stream length (`XADD MAXLEN ~`);
    /// stands in for time-based retention
    pub processing_maxlen: Option<u64>,
    /// Approximate cap on dead-letter stream length
    pub dlq_maxlen: Option<u64>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            processing_stream: "video.processing.events".to_string(),
            processing_partitions: 6,
            processing_group: "video-processing-group".to_string(),
            dlq_stream: "video.processing.dlq".to_string(),
            dlq_partitions: 2,
            dlq_group: "dlq-processor-group".to_string(),
            processing_maxlen: None,
            dlq_maxlen: None,
        }
    }
}

impl BusConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            processing_stream: std::env::var("BUS_PROCESSING_STREAM")
                .unwrap_or(defaults.processing_stream),
            processing_partitions: std::env::var("BUS_PROCESSING_PARTITIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.processing_partitions),
            processing_group: std::env::var("BUS_PROCESSING_GROUP")
                .unwrap_or(defaults.processing_group),
            dlq_stream: std::env::var("BUS_DLQ_STREAM").unwrap_or(defaults.dlq_stream),
            dlq_partitions: std::env::var("BUS_DLQ_PARTITIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.dlq_partitions),
            dlq_group: std::env::var("BUS_DLQ_GROUP").unwrap_or(defaults.dlq_group),
            processing_maxlen: std::env::var("BUS_PROCESSING_MAXLEN")
                .ok()
                .and_then(|s| s.parse().ok()),
            dlq_maxlen: std::env::var("BUS_DLQ_MAXLEN").ok().and_then(|s| s.parse().ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_channel_layout() {
        let config = BusConfig::default();
        assert_eq!(config.processing_partitions, 6);
        assert_eq!(config.dlq_partitions, 2);
        assert_eq!(config.processing_group, "video-processing-group");
        assert_eq!(config.dlq_group, "dlq-processor-group");
        assert!(config.processing_maxlen.is_none());
    }
}
