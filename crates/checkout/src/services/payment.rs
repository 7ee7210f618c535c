//! Payment service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::CheckoutId;
use domain::{Money, TransactionId, User, UserId, UserKey};

use crate::error::CheckoutError;

/// Result of a successful payment charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentResult {
    /// The transaction ID assigned by the payment processor.
    pub transaction_id: TransactionId,
}

/// Trait for payment processing operations.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Charges a user for a checkout.
    ///
    /// `checkout_id` identifies the logical charge; processors can use it as
    /// an idempotency key.
    async fn charge(
        &self,
        checkout_id: CheckoutId,
        user: &User,
        amount: Money,
    ) -> Result<PaymentResult, CheckoutError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    payments: HashMap<TransactionId, (CheckoutId, UserId, Money)>,
    by_checkout: HashMap<CheckoutId, TransactionId>,
    charge_calls: usize,
    next_id: u32,
    fail_on_charge: bool,
    latency: Option<Duration>,
    user_latency: HashMap<UserKey, Duration>,
}

/// In-memory payment service for testing.
///
/// Repeated charges for the same checkout return the original transaction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentService {
    /// Creates a new in-memory payment service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to decline charges.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.state.write().unwrap().fail_on_charge = fail;
    }

    /// Delays every charge by the given duration.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.write().unwrap().latency = latency;
    }

    /// Delays charges for one user, overriding the global latency.
    pub fn set_latency_for(&self, key: impl Into<UserKey>, latency: Duration) {
        self.state
            .write()
            .unwrap()
            .user_latency
            .insert(key.into(), latency);
    }

    /// Returns how many times `charge` has been called.
    pub fn charge_calls(&self) -> usize {
        self.state.read().unwrap().charge_calls
    }

    /// Returns the number of recorded payments.
    pub fn payment_count(&self) -> usize {
        self.state.read().unwrap().payments.len()
    }

    /// Returns true if a payment exists with the given ID.
    pub fn has_payment(&self, transaction_id: &TransactionId) -> bool {
        self.state
            .read()
            .unwrap()
            .payments
            .contains_key(transaction_id)
    }

    /// Returns the amount charged under a transaction.
    pub fn charged_amount(&self, transaction_id: &TransactionId) -> Option<Money> {
        self.state
            .read()
            .unwrap()
            .payments
            .get(transaction_id)
            .map(|(_, _, amount)| *amount)
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn charge(
        &self,
        checkout_id: CheckoutId,
        user: &User,
        amount: Money,
    ) -> Result<PaymentResult, CheckoutError> {
        let latency = {
            let state = self.state.read().unwrap();
            state.user_latency.get(&user.key).copied().or(state.latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.write().unwrap();
        state.charge_calls += 1;

        if state.fail_on_charge {
            return Err(CheckoutError::PaymentService("Payment declined".to_string()));
        }

        if let Some(existing) = state.by_checkout.get(&checkout_id) {
            return Ok(PaymentResult {
                transaction_id: existing.clone(),
            });
        }

        state.next_id += 1;
        let transaction_id = TransactionId::new(format!("TXN-{:04}", state.next_id));
        state
            .payments
            .insert(transaction_id.clone(), (checkout_id, user.id, amount));
        state
            .by_checkout
            .insert(checkout_id, transaction_id.clone());

        Ok(PaymentResult { transaction_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::NewUser;

    fn user() -> User {
        User::from_seed(NewUser::from_key(&UserKey::new("alice")))
    }

    #[tokio::test]
    async fn test_charge() {
        let service = InMemoryPaymentService::new();
        let amount = Money::from_cents(5000);

        let result = service
            .charge(CheckoutId::new(), &user(), amount)
            .await
            .unwrap();
        assert!(result.transaction_id.as_str().starts_with("TXN-"));
        assert_eq!(service.payment_count(), 1);
        assert!(service.has_payment(&result.transaction_id));
        assert_eq!(service.charged_amount(&result.transaction_id), Some(amount));
    }

    #[tokio::test]
    async fn test_fail_on_charge() {
        let service = InMemoryPaymentService::new();
        service.set_fail_on_charge(true);

        let result = service
            .charge(CheckoutId::new(), &user(), Money::from_cents(5000))
            .await;
        assert!(matches!(result, Err(CheckoutError::PaymentService(_))));
        assert_eq!(service.payment_count(), 0);
        assert_eq!(service.charge_calls(), 1);
    }

    #[tokio::test]
    async fn test_sequential_transaction_ids() {
        let service = InMemoryPaymentService::new();
        let user = user();
        let amount = Money::from_cents(1000);

        let r1 = service.charge(CheckoutId::new(), &user, amount).await.unwrap();
        let r2 = service.charge(CheckoutId::new(), &user, amount).await.unwrap();

        assert_eq!(r1.transaction_id.as_str(), "TXN-0001");
        assert_eq!(r2.transaction_id.as_str(), "TXN-0002");
    }

    #[tokio::test]
    async fn test_repeated_checkout_id_is_deduplicated() {
        let service = InMemoryPaymentService::new();
        let user = user();
        let checkout_id = CheckoutId::new();

        let r1 = service
            .charge(checkout_id, &user, Money::from_cents(1000))
            .await
            .unwrap();
        let r2 = service
            .charge(checkout_id, &user, Money::from_cents(1000))
            .await
            .unwrap();

        assert_eq!(r1, r2);
        assert_eq!(service.payment_count(), 1);
        assert_eq!(service.charge_calls(), 2);
    }
}
