//! Checkout trail events.

use chrono::{DateTime, Utc};
use common::CheckoutId;
use domain::{Money, TransactionId, UserKey};
use serde::{Deserialize, Serialize};

use crate::outcome::FailureKind;
use crate::state::CheckoutStage;

/// Events recorded while a checkout runs, in the order they happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CheckoutEvent {
    /// The checkout started running on a worker.
    CheckoutStarted(CheckoutStartedData),

    /// A stage started.
    StageStarted(StageData),

    /// A stage finished successfully.
    StageCompleted(StageCompletedData),

    /// A stage failed; the checkout fails with it.
    StageFailed(StageFailedData),

    /// The cart total was zero and the charge was skipped.
    ChargeSkipped(ChargeSkippedData),

    /// The confirmation could not be sent (the checkout still completes).
    NotificationFailed(NotificationFailedData),

    /// The checkout was cancelled before entering a stage.
    CheckoutCancelled(StageData),

    /// The checkout completed.
    CheckoutCompleted(CheckoutCompletedData),

    /// The checkout failed.
    CheckoutFailed(CheckoutFailedData),
}

impl CheckoutEvent {
    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            CheckoutEvent::CheckoutStarted(_) => "CheckoutStarted",
            CheckoutEvent::StageStarted(_) => "StageStarted",
            CheckoutEvent::StageCompleted(_) => "StageCompleted",
            CheckoutEvent::StageFailed(_) => "StageFailed",
            CheckoutEvent::ChargeSkipped(_) => "ChargeSkipped",
            CheckoutEvent::NotificationFailed(_) => "NotificationFailed",
            CheckoutEvent::CheckoutCancelled(_) => "CheckoutCancelled",
            CheckoutEvent::CheckoutCompleted(_) => "CheckoutCompleted",
            CheckoutEvent::CheckoutFailed(_) => "CheckoutFailed",
        }
    }
}

/// Data for CheckoutStarted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutStartedData {
    pub checkout_id: CheckoutId,
    pub key: UserKey,
    pub started_at: DateTime<Utc>,
}

/// Data for events that only name a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageData {
    pub stage: CheckoutStage,
}

/// Data for StageCompleted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCompletedData {
    pub stage: CheckoutStage,
    /// Cart total (set after LoadingCart).
    pub total: Option<Money>,
    /// Transaction id (set after Charging).
    pub transaction_id: Option<TransactionId>,
}

/// Data for StageFailed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailedData {
    pub stage: CheckoutStage,
    pub error: String,
}

/// Data for ChargeSkipped event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeSkippedData {
    pub total: Money,
}

/// Data for NotificationFailed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationFailedData {
    pub error: String,
}

/// Data for CheckoutCompleted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutCompletedData {
    pub completed_at: DateTime<Utc>,
}

/// Data for CheckoutFailed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutFailedData {
    pub kind: FailureKind,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

// Convenience constructors
impl CheckoutEvent {
    /// Creates a CheckoutStarted event.
    pub fn checkout_started(checkout_id: CheckoutId, key: UserKey) -> Self {
        CheckoutEvent::CheckoutStarted(CheckoutStartedData {
            checkout_id,
            key,
            started_at: Utc::now(),
        })
    }

    /// Creates a StageStarted event.
    pub fn stage_started(stage: CheckoutStage) -> Self {
        CheckoutEvent::StageStarted(StageData { stage })
    }

    /// Creates a StageCompleted event.
    pub fn stage_completed(
        stage: CheckoutStage,
        total: Option<Money>,
        transaction_id: Option<TransactionId>,
    ) -> Self {
        CheckoutEvent::StageCompleted(StageCompletedData {
            stage,
            total,
            transaction_id,
        })
    }

    /// Creates a StageFailed event.
    pub fn stage_failed(stage: CheckoutStage, error: impl Into<String>) -> Self {
        CheckoutEvent::StageFailed(StageFailedData {
            stage,
            error: error.into(),
        })
    }

    /// Creates a ChargeSkipped event.
    pub fn charge_skipped(total: Money) -> Self {
        CheckoutEvent::ChargeSkipped(ChargeSkippedData { total })
    }

    /// Creates a NotificationFailed event.
    pub fn notification_failed(error: impl Into<String>) -> Self {
        CheckoutEvent::NotificationFailed(NotificationFailedData {
            error: error.into(),
        })
    }

    /// Creates a CheckoutCancelled event.
    pub fn checkout_cancelled(stage: CheckoutStage) -> Self {
        CheckoutEvent::CheckoutCancelled(StageData { stage })
    }

    /// Creates a CheckoutCompleted event.
    pub fn checkout_completed() -> Self {
        CheckoutEvent::CheckoutCompleted(CheckoutCompletedData {
            completed_at: Utc::now(),
        })
    }

    /// Creates a CheckoutFailed event.
    pub fn checkout_failed(kind: FailureKind, reason: impl Into<String>) -> Self {
        CheckoutEvent::CheckoutFailed(CheckoutFailedData {
            kind,
            reason: reason.into(),
            failed_at: Utc::now(),
        })
    }
}
