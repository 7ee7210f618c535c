//! Notification service trait and in-memory implementation.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use domain::{Cart, Money, TransactionId, User, UserKey};

use crate::error::CheckoutError;

/// Trait for sending checkout confirmations.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Sends a confirmation for a finished charge.
    ///
    /// `transaction_id` is `None` when the charge was skipped for a zero total.
    async fn send_confirmation(
        &self,
        user: &User,
        cart: &Cart,
        transaction_id: Option<&TransactionId>,
    ) -> Result<(), CheckoutError>;
}

/// A confirmation recorded by the in-memory service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentConfirmation {
    pub key: UserKey,
    pub email: String,
    pub item_count: usize,
    pub total: Money,
    pub transaction_id: Option<TransactionId>,
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    sent: Vec<SentConfirmation>,
    attempts: usize,
    fail_on_send: bool,
    latency: Option<Duration>,
}

/// In-memory notification service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationService {
    state: Arc<RwLock<InMemoryNotificationState>>,
}

impl InMemoryNotificationService {
    /// Creates a new in-memory notification service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail on send.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Delays every send by the given duration.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.write().unwrap().latency = latency;
    }

    /// Returns the number of delivered confirmations.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }

    /// Returns how many sends were attempted, including failed ones.
    pub fn attempt_count(&self) -> usize {
        self.state.read().unwrap().attempts
    }

    /// Returns the delivered confirmations.
    pub fn sent(&self) -> Vec<SentConfirmation> {
        self.state.read().unwrap().sent.clone()
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn send_confirmation(
        &self,
        user: &User,
        cart: &Cart,
        transaction_id: Option<&TransactionId>,
    ) -> Result<(), CheckoutError> {
        let latency = self.state.read().unwrap().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.write().unwrap();
        state.attempts += 1;

        if state.fail_on_send {
            return Err(CheckoutError::NotificationService(
                "Mail relay rejected the message".to_string(),
            ));
        }

        state.sent.push(SentConfirmation {
            key: user.key.clone(),
            email: user.email.clone(),
            item_count: cart.item_count(),
            total: cart.total(),
            transaction_id: transaction_id.cloned(),
        });
        Ok(())
    }
}
