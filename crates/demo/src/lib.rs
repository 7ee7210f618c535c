//! Demo driver for the checkout pipeline.
//!
//! Submits a burst of concurrent checkouts for a single user key against
//! in-memory collaborators and summarizes the results. With a fresh
//! directory the burst registers the user exactly once.

pub mod config;
pub mod summary;

use std::time::Instant;

use checkout::{
    CheckoutOrchestrator, CheckoutResult, InMemoryCartService, InMemoryNotificationService,
    InMemoryPaymentService, PipelineConfig,
};
use domain::{Item, Money};
use futures_util::future::join_all;
use identity::InMemoryUserDirectory;
use tokio_util::sync::CancellationToken;

pub use config::{DemoConfig, LogFormat};
pub use summary::DemoSummary;

pub type DemoOrchestrator = CheckoutOrchestrator<
    InMemoryUserDirectory,
    InMemoryCartService,
    InMemoryPaymentService,
    InMemoryNotificationService,
>;

/// Builds an orchestrator over in-memory collaborators with a stocked
/// default cart.
pub fn create_orchestrator(config: PipelineConfig) -> DemoOrchestrator {
    let carts = InMemoryCartService::new();
    carts.set_default_items(vec![
        Item::new("SKU-001", "Widget", 2, Money::from_cents(1000)),
        Item::new("SKU-002", "Gadget", 1, Money::from_cents(2500)),
    ]);

    CheckoutOrchestrator::with_config(
        InMemoryUserDirectory::new(),
        carts,
        InMemoryPaymentService::new(),
        InMemoryNotificationService::new(),
        config,
    )
}

/// Runs `config.checkouts` concurrent checkouts for `config.user_key`.
///
/// When `shutdown` fires first, every checkout still ahead of Charging is
/// cancelled; the rest run to completion.
pub async fn run(
    orchestrator: &DemoOrchestrator,
    config: &DemoConfig,
    shutdown: CancellationToken,
) -> (Vec<CheckoutResult>, DemoSummary) {
    let start = Instant::now();
    tracing::info!(
        key = %config.user_key,
        checkouts = config.checkouts,
        max_in_flight = orchestrator.config().max_in_flight,
        "Submitting checkouts"
    );

    let handles: Vec<_> = (0..config.checkouts)
        .map(|_| orchestrator.checkout(config.user_key.clone()))
        .collect();

    let settled = join_all(handles.iter().map(|handle| {
        let mut stage = handle.watch_stage();
        async move {
            if let Err(error) = stage.wait_for(|s| s.is_terminal()).await {
                tracing::debug!(%error, "stage channel closed before a terminal stage");
            }
        }
    }));

    tokio::select! {
        _ = settled => {}
        _ = shutdown.cancelled() => {
            tracing::warn!("Shutdown requested, cancelling outstanding checkouts");
            for handle in &handles {
                handle.cancel();
            }
        }
    }

    let results = join_all(handles.into_iter().map(|handle| handle.wait())).await;
    let summary = DemoSummary::from_results(&results, start.elapsed());
    (results, summary)
}
