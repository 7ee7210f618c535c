//! Checkout requests.

use common::CheckoutId;
use domain::UserKey;

use crate::config::StageTimeouts;

/// A request to check out the cart of the user identified by `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub checkout_id: CheckoutId,
    pub key: UserKey,
    /// Overrides the pipeline's stage timeouts for this checkout only.
    pub timeouts: Option<StageTimeouts>,
}

impl CheckoutRequest {
    /// Creates a request with a fresh checkout id and the pipeline's timeouts.
    pub fn new(key: impl Into<UserKey>) -> Self {
        Self {
            checkout_id: CheckoutId::new(),
            key: key.into(),
            timeouts: None,
        }
    }

    pub fn with_checkout_id(mut self, checkout_id: CheckoutId) -> Self {
        self.checkout_id = checkout_id;
        self
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }
}
