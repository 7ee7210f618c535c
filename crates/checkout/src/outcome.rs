//! Terminal checkout results.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::CheckoutId;
use domain::{Cart, Money, TransactionId, User, UserKey};
use serde::{Deserialize, Serialize};

use crate::events::CheckoutEvent;
use crate::state::CheckoutStage;

/// Why a checkout failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The user could not be resolved or registered.
    IdentityResolutionFailed,
    /// The cart could not be loaded.
    CartLoadFailed,
    /// The payment processor declined or errored. Never retried automatically.
    PaymentFailed,
    /// The cart total was not chargeable.
    InvalidTotal,
    /// The caller cancelled the checkout before Charging.
    Cancelled,
    /// The checkout task ended without producing a result.
    Aborted,
}

impl FailureKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::IdentityResolutionFailed => "IdentityResolutionFailed",
            FailureKind::CartLoadFailed => "CartLoadFailed",
            FailureKind::PaymentFailed => "PaymentFailed",
            FailureKind::InvalidTotal => "InvalidTotal",
            FailureKind::Cancelled => "Cancelled",
            FailureKind::Aborted => "Aborted",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failed checkout: which stage failed, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutFailure {
    pub kind: FailureKind,
    pub stage: CheckoutStage,
    pub reason: String,
}

/// A non-fatal problem attached to a completed checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CheckoutWarning {
    /// The confirmation was not delivered. The charge stands.
    NotificationFailed { reason: String },
}

/// A completed checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedCheckout {
    pub user: Arc<User>,
    pub cart: Cart,
    pub total: Money,
    /// `None` when the charge was skipped for a zero total.
    pub transaction_id: Option<TransactionId>,
    pub warnings: Vec<CheckoutWarning>,
}

/// How a checkout ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum CheckoutOutcome {
    Completed(CompletedCheckout),
    Failed(CheckoutFailure),
}

/// The terminal result of one checkout. Produced exactly once per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResult {
    pub checkout_id: CheckoutId,
    pub key: UserKey,
    pub outcome: CheckoutOutcome,
    /// Everything that happened, in order.
    pub events: Vec<CheckoutEvent>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CheckoutResult {
    /// Builds the result for a checkout task that died without reporting.
    pub(crate) fn aborted(
        checkout_id: CheckoutId,
        key: UserKey,
        stage: CheckoutStage,
        reason: impl Into<String>,
    ) -> Self {
        let reason = reason.into();
        let now = Utc::now();
        Self {
            checkout_id,
            key,
            events: vec![CheckoutEvent::checkout_failed(
                FailureKind::Aborted,
                reason.clone(),
            )],
            outcome: CheckoutOutcome::Failed(CheckoutFailure {
                kind: FailureKind::Aborted,
                stage,
                reason,
            }),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, CheckoutOutcome::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, CheckoutOutcome::Failed(_))
    }

    /// Returns the completed checkout, if it completed.
    pub fn completed(&self) -> Option<&CompletedCheckout> {
        match &self.outcome {
            CheckoutOutcome::Completed(completed) => Some(completed),
            CheckoutOutcome::Failed(_) => None,
        }
    }

    /// Returns the failure, if it failed.
    pub fn failure(&self) -> Option<&CheckoutFailure> {
        match &self.outcome {
            CheckoutOutcome::Completed(_) => None,
            CheckoutOutcome::Failed(failure) => Some(failure),
        }
    }

    /// Returns the failure kind, if it failed.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure().map(|f| f.kind)
    }

    /// Returns the transaction id of a completed, charged checkout.
    pub fn transaction_id(&self) -> Option<&TransactionId> {
        self.completed().and_then(|c| c.transaction_id.as_ref())
    }

    /// Returns the warnings of a completed checkout.
    pub fn warnings(&self) -> &[CheckoutWarning] {
        match &self.outcome {
            CheckoutOutcome::Completed(completed) => &completed.warnings,
            CheckoutOutcome::Failed(_) => &[],
        }
    }

    /// Returns the terminal stage.
    pub fn stage(&self) -> CheckoutStage {
        match self.outcome {
            CheckoutOutcome::Completed(_) => CheckoutStage::Completed,
            CheckoutOutcome::Failed(_) => CheckoutStage::Failed,
        }
    }

    /// Returns the stages that were started, in order.
    pub fn stages_started(&self) -> Vec<CheckoutStage> {
        self.events
            .iter()
            .filter_map(|event| match event {
                CheckoutEvent::StageStarted(data) => Some(data.stage),
                _ => None,
            })
            .collect()
    }
}
