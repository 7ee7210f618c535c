//! Concurrent checkout pipeline.
//!
//! Each checkout runs through four stages on its own task:
//! 1. Resolve the user for the request key (created on first sight)
//! 2. Load the user's cart and compute its total
//! 3. Charge the total, at most once
//! 4. Send a confirmation (best-effort)
//!
//! Failures before Charging abort the checkout. A failed confirmation is
//! attached to the completed result as a warning. Users are resolved through a
//! shared [`IdentityRegistry`](identity::IdentityRegistry), so concurrent
//! checkouts for a new key register the user exactly once.

pub mod config;
pub mod error;
pub mod events;
pub mod handle;
pub mod orchestrator;
pub mod outcome;
pub mod request;
pub mod services;
pub mod state;

pub use config::{PipelineConfig, StageTimeouts, ZeroTotalPolicy};
pub use error::CheckoutError;
pub use events::CheckoutEvent;
pub use handle::CheckoutHandle;
pub use orchestrator::CheckoutOrchestrator;
pub use outcome::{
    CheckoutFailure, CheckoutOutcome, CheckoutResult, CheckoutWarning, CompletedCheckout,
    FailureKind,
};
pub use request::CheckoutRequest;
pub use services::{
    CartService, InMemoryCartService, InMemoryNotificationService, InMemoryPaymentService,
    NotificationService, PaymentResult, PaymentService, SentConfirmation,
};
pub use state::CheckoutStage;
