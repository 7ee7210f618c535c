//! Checkout error types.

use std::time::Duration;

use identity::IdentityError;
use thiserror::Error;

use crate::state::CheckoutStage;

/// Errors raised by a single stage of a checkout.
///
/// These never escape the orchestrator as `Err`; each one is folded into the
/// terminal [`CheckoutResult`](crate::CheckoutResult) of its checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Identity resolution failed.
    #[error("Identity resolution error: {0}")]
    Identity(#[from] IdentityError),

    /// Cart service error.
    #[error("Cart service error: {0}")]
    CartService(String),

    /// Payment service error.
    #[error("Payment service error: {0}")]
    PaymentService(String),

    /// Notification service error.
    #[error("Notification service error: {0}")]
    NotificationService(String),

    /// A stage did not finish within its timeout.
    #[error("Stage '{stage}' timed out after {after:?}")]
    Timeout { stage: CheckoutStage, after: Duration },
}
