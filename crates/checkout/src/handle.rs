//! Handles to running checkouts.

use common::CheckoutId;
use domain::UserKey;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::outcome::CheckoutResult;
use crate::state::CheckoutStage;

/// A checkout that has been submitted to the orchestrator.
///
/// Dropping the handle does not stop the checkout; it runs to its terminal
/// result regardless.
#[derive(Debug)]
pub struct CheckoutHandle {
    checkout_id: CheckoutId,
    key: UserKey,
    stage_rx: watch::Receiver<CheckoutStage>,
    cancellation: CancellationToken,
    task: JoinHandle<CheckoutResult>,
}

impl CheckoutHandle {
    pub(crate) fn new(
        checkout_id: CheckoutId,
        key: UserKey,
        stage_rx: watch::Receiver<CheckoutStage>,
        cancellation: CancellationToken,
        task: JoinHandle<CheckoutResult>,
    ) -> Self {
        Self {
            checkout_id,
            key,
            stage_rx,
            cancellation,
            task,
        }
    }

    pub fn id(&self) -> CheckoutId {
        self.checkout_id
    }

    pub fn key(&self) -> &UserKey {
        &self.key
    }

    /// Returns the stage the checkout is currently in.
    pub fn stage(&self) -> CheckoutStage {
        *self.stage_rx.borrow()
    }

    /// Returns a receiver that observes every stage transition.
    pub fn watch_stage(&self) -> watch::Receiver<CheckoutStage> {
        self.stage_rx.clone()
    }

    /// Requests cancellation.
    ///
    /// Honoured only before the checkout enters Charging. Once Charging has
    /// started the checkout runs to completion and the request is ignored.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Waits for the terminal result.
    ///
    /// A checkout task that panicked yields a `Failed` result of kind
    /// `Aborted` at the stage it had reached.
    pub async fn wait(self) -> CheckoutResult {
        match self.task.await {
            Ok(result) => result,
            Err(err) => {
                let stage = *self.stage_rx.borrow();
                tracing::error!(
                    checkout_id = %self.checkout_id,
                    key = %self.key,
                    stage = %stage,
                    error = %err,
                    "Checkout task ended without a result"
                );
                metrics::counter!("checkout_failed_total", "kind" => "Aborted").increment(1);
                CheckoutResult::aborted(self.checkout_id, self.key, stage, err.to_string())
            }
        }
    }
}
