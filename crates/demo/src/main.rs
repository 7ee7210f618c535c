//! Demo entry point.

use checkout::PipelineConfig;
use checkout_demo::{DemoConfig, LogFormat};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, cancelling checkouts");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, cancelling checkouts");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = DemoConfig::from_env();

    // 1. Initialize tracing
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Build the pipeline
    let pipeline = PipelineConfig::from_env();
    tracing::info!(?pipeline, "pipeline configuration");
    let orchestrator = checkout_demo::create_orchestrator(pipeline);

    // 4. Run the burst, cancelling on SIGINT/SIGTERM
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    let signal_task = tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let (_results, summary) = checkout_demo::run(&orchestrator, &config, shutdown).await;
    signal_task.abort();

    let stats = orchestrator.registry().stats();
    tracing::info!(
        completed = summary.completed,
        failed = summary.failed_total(),
        distinct_users = summary.distinct_users,
        user_creations = stats.creations,
        coalescing_ratio = stats.coalescing_ratio(),
        elapsed_ms = summary.elapsed_ms,
        "demo finished"
    );

    // 5. Report
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).expect("summary serializes")
    );
    println!("{}", metrics_handle.render());
}
