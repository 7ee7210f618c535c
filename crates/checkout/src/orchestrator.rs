//! Checkout orchestrator driving each checkout through its stages.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use common::CheckoutId;
use domain::{Cart, Money, TransactionId, User, UserKey};
use futures_util::future::join_all;
use identity::{IdentityRegistry, UserDirectory};
use tokio::sync::{Semaphore, watch};
use tokio_util::sync::CancellationToken;

use crate::config::{PipelineConfig, StageTimeouts, ZeroTotalPolicy};
use crate::error::CheckoutError;
use crate::events::CheckoutEvent;
use crate::handle::CheckoutHandle;
use crate::outcome::{
    CheckoutFailure, CheckoutOutcome, CheckoutResult, CheckoutWarning, CompletedCheckout,
    FailureKind,
};
use crate::request::CheckoutRequest;
use crate::services::{CartService, NotificationService, PaymentService};
use crate::state::CheckoutStage;

/// Runs checkouts concurrently, each through
/// identity → cart → payment → notification.
///
/// Every submitted checkout runs on its own task and ends in exactly one
/// [`CheckoutResult`]. Checkouts share only the identity registry, so a slow
/// or failing checkout never holds up an unrelated one.
///
/// Cloning the orchestrator yields another handle to the same pipeline.
pub struct CheckoutOrchestrator<D, C, P, N> {
    inner: Arc<Pipeline<D, C, P, N>>,
}

impl<D, C, P, N> Clone for CheckoutOrchestrator<D, C, P, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Pipeline<D, C, P, N> {
    registry: IdentityRegistry<D>,
    carts: C,
    payments: P,
    notifier: N,
    config: PipelineConfig,
    permits: Semaphore,
}

impl<D, C, P, N> CheckoutOrchestrator<D, C, P, N>
where
    D: UserDirectory + 'static,
    C: CartService + 'static,
    P: PaymentService + 'static,
    N: NotificationService + 'static,
{
    /// Creates an orchestrator with the default configuration.
    pub fn new(directory: D, carts: C, payments: P, notifier: N) -> Self {
        Self::with_config(directory, carts, payments, notifier, PipelineConfig::default())
    }

    /// Creates an orchestrator with its own identity registry over `directory`.
    ///
    /// Each directory call made by the registry is bounded by the configured
    /// identity timeout, so a hung call clears the key's pending marker
    /// instead of holding it forever.
    pub fn with_config(
        directory: D,
        carts: C,
        payments: P,
        notifier: N,
        config: PipelineConfig,
    ) -> Self {
        let registry = IdentityRegistry::with_call_timeout(directory, config.timeouts.identity);
        Self::with_registry(registry, carts, payments, notifier, config)
    }

    /// Creates an orchestrator over an existing registry, so that several
    /// pipelines resolve users through the same slots.
    ///
    /// The registry keeps its own call timeout; `config.timeouts.identity`
    /// only bounds how long a checkout waits for it.
    pub fn with_registry(
        registry: IdentityRegistry<D>,
        carts: C,
        payments: P,
        notifier: N,
        config: PipelineConfig,
    ) -> Self {
        let permits = Semaphore::new(config.max_in_flight.max(1));
        Self {
            inner: Arc::new(Pipeline {
                registry,
                carts,
                payments,
                notifier,
                config,
                permits,
            }),
        }
    }

    pub fn registry(&self) -> &IdentityRegistry<D> {
        &self.inner.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Starts a checkout for `key` with the pipeline's timeouts.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn checkout(&self, key: impl Into<UserKey>) -> CheckoutHandle {
        self.submit(CheckoutRequest::new(key))
    }

    /// Starts a checkout and returns immediately with a handle to it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, request: CheckoutRequest) -> CheckoutHandle {
        let CheckoutRequest {
            checkout_id,
            key,
            timeouts,
        } = request;

        let cancellation = CancellationToken::new();
        let (stage_tx, stage_rx) = watch::channel(CheckoutStage::ResolvingIdentity);

        let pipeline = Arc::clone(&self.inner);
        let token = cancellation.clone();
        let run_key = key.clone();
        let task = tokio::spawn(async move {
            pipeline
                .run(checkout_id, run_key, timeouts, token, stage_tx)
                .await
        });

        CheckoutHandle::new(checkout_id, key, stage_rx, cancellation, task)
    }

    /// Runs one checkout per key and returns the results in submission order.
    pub async fn checkout_all<I, K>(&self, keys: I) -> Vec<CheckoutResult>
    where
        I: IntoIterator<Item = K>,
        K: Into<UserKey>,
    {
        let handles: Vec<CheckoutHandle> = keys.into_iter().map(|key| self.checkout(key)).collect();
        join_all(handles.into_iter().map(CheckoutHandle::wait)).await
    }
}

/// Where a checkout is, along with everything earlier stages produced.
enum Step {
    ResolvingIdentity,
    LoadingCart {
        user: Arc<User>,
    },
    Charging {
        user: Arc<User>,
        cart: Cart,
        total: Money,
    },
    Notifying {
        user: Arc<User>,
        cart: Cart,
        total: Money,
        transaction_id: Option<TransactionId>,
    },
}

impl Step {
    fn stage(&self) -> CheckoutStage {
        match self {
            Step::ResolvingIdentity => CheckoutStage::ResolvingIdentity,
            Step::LoadingCart { .. } => CheckoutStage::LoadingCart,
            Step::Charging { .. } => CheckoutStage::Charging,
            Step::Notifying { .. } => CheckoutStage::Notifying,
        }
    }
}

impl<D, C, P, N> Pipeline<D, C, P, N>
where
    D: UserDirectory + 'static,
    C: CartService,
    P: PaymentService,
    N: NotificationService,
{
    #[tracing::instrument(
        name = "checkout",
        skip(self, timeouts, cancellation, stage_tx),
        fields(checkout_id = %checkout_id, key = %key)
    )]
    async fn run(
        &self,
        checkout_id: CheckoutId,
        key: UserKey,
        timeouts: Option<StageTimeouts>,
        cancellation: CancellationToken,
        stage_tx: watch::Sender<CheckoutStage>,
    ) -> CheckoutResult {
        metrics::counter!("checkout_started_total").increment(1);
        let start = Instant::now();
        let timeouts = timeouts.unwrap_or(self.config.timeouts);
        let mut run = CheckoutRun::new(checkout_id, key, stage_tx);

        // Queued checkouts can still be cancelled; running ones hold the
        // permit until they reach a terminal result.
        let _permit = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                return finish(run.cancel_at(CheckoutStage::ResolvingIdentity), start);
            }
            permit = self.permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(err) => {
                    return finish(
                        run.fail(CheckoutStage::ResolvingIdentity, FailureKind::Aborted, err),
                        start,
                    );
                }
            },
        };
        run.record(CheckoutEvent::checkout_started(checkout_id, run.key.clone()));

        let mut step = Step::ResolvingIdentity;
        loop {
            let stage = step.stage();
            if stage.accepts_cancellation() && cancellation.is_cancelled() {
                return finish(run.cancel_at(stage), start);
            }
            run.enter(stage);

            step = match step {
                Step::ResolvingIdentity => {
                    let limit = timeouts.for_stage(stage);
                    let resolved = bounded(stage, limit, self.registry.resolve(&run.key)).await;
                    match resolved {
                        Ok(user) => {
                            run.complete(stage, None, None);
                            Step::LoadingCart { user }
                        }
                        Err(err) => {
                            return finish(
                                run.fail(stage, FailureKind::IdentityResolutionFailed, err),
                                start,
                            );
                        }
                    }
                }

                Step::LoadingCart { user } => {
                    let load = self.carts.load_cart(&user);
                    match bounded(stage, timeouts.for_stage(stage), load).await {
                        Ok(cart) => {
                            let total = cart.total();
                            run.complete(stage, Some(total), None);
                            Step::Charging { user, cart, total }
                        }
                        Err(err) => {
                            return finish(run.fail(stage, FailureKind::CartLoadFailed, err), start);
                        }
                    }
                }

                Step::Charging { user, cart, total } => {
                    let rejected = total.is_negative()
                        || (total.is_zero() && self.config.zero_total == ZeroTotalPolicy::Reject);
                    if rejected {
                        let reason = format!("cart total {total} is not chargeable");
                        return finish(run.fail(stage, FailureKind::InvalidTotal, reason), start);
                    }

                    if total.is_zero() {
                        tracing::info!("Cart total is zero, skipping charge");
                        run.record(CheckoutEvent::charge_skipped(total));
                        run.complete(stage, None, None);
                        Step::Notifying {
                            user,
                            cart,
                            total,
                            transaction_id: None,
                        }
                    } else {
                        // Charged at most once: failures and timeouts are
                        // never retried here.
                        let charge = self.payments.charge(checkout_id, &user, total);
                        match bounded(stage, timeouts.for_stage(stage), charge).await {
                            Ok(payment) => {
                                run.complete(stage, None, Some(payment.transaction_id.clone()));
                                Step::Notifying {
                                    user,
                                    cart,
                                    total,
                                    transaction_id: Some(payment.transaction_id),
                                }
                            }
                            Err(err) => {
                                return finish(
                                    run.fail(stage, FailureKind::PaymentFailed, err),
                                    start,
                                );
                            }
                        }
                    }
                }

                Step::Notifying {
                    user,
                    cart,
                    total,
                    transaction_id,
                } => {
                    let send =
                        self.notifier
                            .send_confirmation(&user, &cart, transaction_id.as_ref());
                    let mut warnings = Vec::new();
                    match bounded(stage, timeouts.for_stage(stage), send).await {
                        Ok(()) => run.complete(stage, None, None),
                        Err(err) => {
                            let reason = err.to_string();
                            tracing::warn!(error = %reason, "Confirmation not delivered");
                            metrics::counter!("checkout_notification_failed_total").increment(1);
                            run.record(CheckoutEvent::notification_failed(reason.clone()));
                            warnings.push(CheckoutWarning::NotificationFailed { reason });
                        }
                    }

                    let completed = CompletedCheckout {
                        user,
                        cart,
                        total,
                        transaction_id,
                        warnings,
                    };
                    return finish(run.succeed(completed), start);
                }
            };
        }
    }
}

/// Bounds a stage call by its timeout, if it has one.
async fn bounded<T, E, F>(
    stage: CheckoutStage,
    limit: Option<Duration>,
    call: F,
) -> Result<T, CheckoutError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<CheckoutError>,
{
    match limit {
        Some(after) => match tokio::time::timeout(after, call).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(CheckoutError::Timeout { stage, after }),
        },
        None => call.await.map_err(Into::into),
    }
}

/// Records metrics for a terminal result and hands it back.
fn finish(result: CheckoutResult, start: Instant) -> CheckoutResult {
    metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());

    match &result.outcome {
        CheckoutOutcome::Completed(completed) => {
            metrics::counter!("checkout_completed_total").increment(1);
            tracing::info!(
                total = %completed.total,
                transaction_id = ?completed.transaction_id.as_ref().map(TransactionId::as_str),
                warnings = completed.warnings.len(),
                "Checkout completed"
            );
        }
        CheckoutOutcome::Failed(failure) => {
            metrics::counter!("checkout_failed_total", "kind" => failure.kind.as_str())
                .increment(1);
            tracing::warn!(
                kind = %failure.kind,
                stage = %failure.stage,
                reason = %failure.reason,
                "Checkout failed"
            );
        }
    }

    result
}

/// Trail and stage reporting for one running checkout.
struct CheckoutRun {
    checkout_id: CheckoutId,
    key: UserKey,
    events: Vec<CheckoutEvent>,
    stage_tx: watch::Sender<CheckoutStage>,
    started_at: DateTime<Utc>,
}

impl CheckoutRun {
    fn new(checkout_id: CheckoutId, key: UserKey, stage_tx: watch::Sender<CheckoutStage>) -> Self {
        Self {
            checkout_id,
            key,
            events: Vec::new(),
            stage_tx,
            started_at: Utc::now(),
        }
    }

    fn enter(&mut self, stage: CheckoutStage) {
        tracing::info!(stage = %stage, "Entering stage");
        self.stage_tx.send_replace(stage);
        self.events.push(CheckoutEvent::stage_started(stage));
    }

    fn complete(
        &mut self,
        stage: CheckoutStage,
        total: Option<Money>,
        transaction_id: Option<TransactionId>,
    ) {
        self.events
            .push(CheckoutEvent::stage_completed(stage, total, transaction_id));
    }

    fn record(&mut self, event: CheckoutEvent) {
        self.events.push(event);
    }

    fn fail(
        mut self,
        stage: CheckoutStage,
        kind: FailureKind,
        reason: impl std::fmt::Display,
    ) -> CheckoutResult {
        let reason = reason.to_string();
        self.events
            .push(CheckoutEvent::stage_failed(stage, reason.clone()));
        self.events
            .push(CheckoutEvent::checkout_failed(kind, reason.clone()));
        self.finish(
            CheckoutStage::Failed,
            CheckoutOutcome::Failed(CheckoutFailure {
                kind,
                stage,
                reason,
            }),
        )
    }

    fn cancel_at(mut self, stage: CheckoutStage) -> CheckoutResult {
        let reason = format!("cancelled before {stage}");
        self.events.push(CheckoutEvent::checkout_cancelled(stage));
        self.events.push(CheckoutEvent::checkout_failed(
            FailureKind::Cancelled,
            reason.clone(),
        ));
        self.finish(
            CheckoutStage::Failed,
            CheckoutOutcome::Failed(CheckoutFailure {
                kind: FailureKind::Cancelled,
                stage,
                reason,
            }),
        )
    }

    fn succeed(mut self, completed: CompletedCheckout) -> CheckoutResult {
        self.events.push(CheckoutEvent::checkout_completed());
        self.finish(
            CheckoutStage::Completed,
            CheckoutOutcome::Completed(completed),
        )
    }

    fn finish(self, terminal: CheckoutStage, outcome: CheckoutOutcome) -> CheckoutResult {
        self.stage_tx.send_replace(terminal);
        CheckoutResult {
            checkout_id: self.checkout_id,
            key: self.key,
            outcome,
            events: self.events,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Item;
    use identity::InMemoryUserDirectory;

    use crate::services::{InMemoryCartService, InMemoryNotificationService, InMemoryPaymentService};

    type TestOrchestrator = CheckoutOrchestrator<
        InMemoryUserDirectory,
        InMemoryCartService,
        InMemoryPaymentService,
        InMemoryNotificationService,
    >;

    fn orchestrator(config: PipelineConfig) -> (TestOrchestrator, InMemoryCartService) {
        let carts = InMemoryCartService::new();
        carts.set_default_items(vec![Item::new("SKU-1", "Widget", 2, Money::from_cents(1500))]);
        let orchestrator = CheckoutOrchestrator::with_config(
            InMemoryUserDirectory::new(),
            carts.clone(),
            InMemoryPaymentService::new(),
            InMemoryNotificationService::new(),
            config,
        );
        (orchestrator, carts)
    }

    #[tokio::test]
    async fn test_happy_path_trail() {
        let (orchestrator, _) = orchestrator(PipelineConfig::default());

        let result = orchestrator.checkout("alice").wait().await;

        assert!(result.is_completed());
        assert_eq!(result.completed().unwrap().total.cents(), 3000);
        assert!(result.transaction_id().is_some());
        assert_eq!(
            result.stages_started(),
            vec![
                CheckoutStage::ResolvingIdentity,
                CheckoutStage::LoadingCart,
                CheckoutStage::Charging,
                CheckoutStage::Notifying,
            ]
        );
        let types: Vec<_> = result.events.iter().map(CheckoutEvent::event_type).collect();
        assert_eq!(types.first(), Some(&"CheckoutStarted"));
        assert_eq!(types.last(), Some(&"CheckoutCompleted"));
    }

    #[tokio::test]
    async fn test_handle_reports_terminal_stage() {
        let (orchestrator, _) = orchestrator(PipelineConfig::default());

        let handle = orchestrator.checkout("alice");
        let mut stages = handle.watch_stage();
        stages.wait_for(|stage| stage.is_terminal()).await.unwrap();

        assert_eq!(handle.stage(), CheckoutStage::Completed);
        assert!(handle.wait().await.is_completed());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (orchestrator, carts) = orchestrator(PipelineConfig::default());

        let handle = orchestrator.checkout("alice");
        handle.cancel();
        assert!(handle.is_cancelled());
        let result = handle.wait().await;

        assert_eq!(result.failure_kind(), Some(FailureKind::Cancelled));
        assert_eq!(carts.load_count(), 0);
        assert!(
            result
                .events
                .iter()
                .any(|e| matches!(e, CheckoutEvent::CheckoutCancelled(_)))
        );
    }

    #[tokio::test]
    async fn test_zero_total_rejected_by_policy() {
        let config = PipelineConfig::default().with_zero_total(ZeroTotalPolicy::Reject);
        let (orchestrator, carts) = orchestrator(config);
        carts.set_cart("bob", Vec::new());

        let result = orchestrator.checkout("bob").wait().await;

        let failure = result.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::InvalidTotal);
        assert_eq!(failure.stage, CheckoutStage::Charging);
    }

    #[tokio::test]
    async fn test_bounded_maps_timeout_to_stage() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<(), CheckoutError>(())
        };

        let result = bounded(CheckoutStage::LoadingCart, Some(Duration::from_millis(5)), slow).await;

        assert!(matches!(
            result,
            Err(CheckoutError::Timeout {
                stage: CheckoutStage::LoadingCart,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_bounded_without_limit_passes_through() {
        let result = bounded(CheckoutStage::Charging, None, async {
            Err::<(), _>(CheckoutError::PaymentService("declined".to_string()))
        })
        .await;

        assert!(matches!(result, Err(CheckoutError::PaymentService(_))));
    }
}
