//! Frame-extraction worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use framix_bus::{DistributedLock, EventBus, NullCache, RedisLock, RedisStatusCache, StatusCache};
use framix_media::{FfmpegExtractor, ZipArchiver};
use framix_notify::{HttpNotifier, LogNotifier, Notifier};
use framix_store::InMemoryStatusStore;
use framix_worker::{
    metrics::init_metrics, DlqConsumer, PipelineContext, ProcessingConsumer, WorkerConfig,
};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::from_default_env().add_directive("framix=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting framix-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    init_metrics(config.metrics_port);

    // Both directories must exist before the first video lands
    if let Err(e) = std::fs::create_dir_all(&config.work_dir) {
        error!(
            "Failed to create work directory {}: {e}",
            config.work_dir.display()
        );
        std::process::exit(1);
    }
    if let Err(e) = std::fs::create_dir_all(&config.output_dir) {
        error!(
            "Failed to create output directory {}: {e}",
            config.output_dir.display()
        );
        std::process::exit(1);
    }

    // Event bus: client, partition streams, consumer groups
    let bus = match EventBus::from_env() {
        Ok(bus) => Arc::new(bus),
        Err(e) => {
            error!("Failed to create event bus client: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = bus.init().await {
        error!("Failed to initialize bus channels: {}", e);
        std::process::exit(1);
    }
    match bus.ping().await {
        Ok(()) => info!("Event bus reachable"),
        Err(e) => warn!("Event bus ping failed, consumers will keep retrying: {e}"),
    }

    let lock: Arc<dyn DistributedLock> = match RedisLock::from_env() {
        Ok(lock) => Arc::new(lock),
        Err(e) => {
            error!("Failed to create distributed lock client: {}", e);
            std::process::exit(1);
        }
    };

    let cache: Arc<dyn StatusCache> = match RedisStatusCache::from_env() {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            warn!("Status cache unavailable, continuing without it: {e}");
            Arc::new(NullCache::new())
        }
    };

    let notifier: Arc<dyn Notifier> = match HttpNotifier::from_env() {
        Ok(notifier) => Arc::new(notifier),
        Err(e) => {
            warn!("Mail relay not configured, logging notifications instead: {e}");
            Arc::new(LogNotifier::new())
        }
    };

    let ctx = Arc::new(PipelineContext {
        config: config.clone(),
        store: Arc::new(InMemoryStatusStore::new()),
        extractor: Arc::new(FfmpegExtractor::new()),
        archiver: Arc::new(ZipArchiver::new()),
        notifier,
        lock,
        cache,
    });

    let consumer = ProcessingConsumer::new(Arc::clone(&bus), Arc::clone(&ctx));
    let dlq_consumer = DlqConsumer::new(Arc::clone(&bus), Arc::clone(&ctx));

    let mut handles = consumer.run();
    handles.extend(dlq_consumer.run());

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");

    consumer.shutdown();
    dlq_consumer.shutdown();

    let drain = async {
        for handle in handles {
            handle.await.ok();
        }
    };
    if tokio::time::timeout(config.shutdown_timeout, drain)
        .await
        .is_err()
    {
        warn!("Shutdown timed out with deliveries still in flight");
    }

    info!("Worker shutdown complete");
}
