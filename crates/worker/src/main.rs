//! Party import worker entry point.

use import::{BatchImportConsumer, ChannelSender, InMemoryJobTracker, ValidationConsumer};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use worker::{Batcher, Config, LogFormat, NdjsonPublisher, WorkerError};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(%error, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Logs go to stderr; stdout carries the published events.
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Prometheus exporter with its own HTTP listener
    PrometheusBuilder::new()
        .with_http_listener(config.metrics_addr)
        .install()?;
    tracing::info!(addr = %config.metrics_addr, "metrics exporter listening");

    // 3. Store and unit-of-work manager
    let store = worker::connect_store(&config).await?;
    let manager = worker::build_manager(&store)?;

    // 4. Batch consumer behind an in-process batching channel
    let consumer = BatchImportConsumer::new(
        manager,
        NdjsonPublisher::new(tokio::io::stdout()),
        InMemoryJobTracker::new(),
    );
    let (sender, receiver) = mpsc::channel(config.batch_size.saturating_mul(2));
    let batcher = Batcher::new(receiver, consumer, config.batch_size, config.batch_window);
    let cancellation = batcher.cancellation_token();
    let batcher = tokio::spawn(batcher.run());
    let validation = ValidationConsumer::new(ChannelSender::new(sender));

    tracing::info!(
        batch_size = config.batch_size,
        window_ms = config.batch_window.as_millis() as u64,
        "reading upsert messages from stdin"
    );

    // 5. Read until EOF or a shutdown signal
    tokio::select! {
        result = worker::read_messages(BufReader::new(tokio::io::stdin()), &validation) => {
            result?;
        }
        () = shutdown_signal() => cancellation.cancel(),
    }

    // 6. Closing the channel lets the batcher drain; after a signal the
    //    remaining batches are abandoned for redelivery
    drop(validation);
    let stats = batcher.await?;
    tracing::info!(
        batches = stats.batches,
        failed = stats.failed_batches,
        messages = stats.messages,
        "worker shut down gracefully"
    );

    Ok(())
}
