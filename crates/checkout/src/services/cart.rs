//! Cart service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use domain::{Cart, Item, User, UserKey};

use crate::error::CheckoutError;

/// Trait for loading a user's current cart.
#[async_trait]
pub trait CartService: Send + Sync {
    /// Returns a snapshot of the user's cart.
    async fn load_cart(&self, user: &User) -> Result<Cart, CheckoutError>;
}

#[derive(Debug, Default)]
struct InMemoryCartState {
    carts: HashMap<UserKey, Vec<Item>>,
    default_items: Vec<Item>,
    loads: usize,
    fail_on_load: bool,
    latency: Option<Duration>,
}

/// In-memory cart service for testing.
///
/// Users without a stored cart get the default items (empty unless set).
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartService {
    state: Arc<RwLock<InMemoryCartState>>,
}

impl InMemoryCartService {
    /// Creates a new in-memory cart service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the cart contents for a user.
    pub fn set_cart(&self, key: impl Into<UserKey>, items: Vec<Item>) {
        self.state.write().unwrap().carts.insert(key.into(), items);
    }

    /// Sets the contents returned for users without a stored cart.
    pub fn set_default_items(&self, items: Vec<Item>) {
        self.state.write().unwrap().default_items = items;
    }

    /// Configures the service to fail on load.
    pub fn set_fail_on_load(&self, fail: bool) {
        self.state.write().unwrap().fail_on_load = fail;
    }

    /// Delays every load by the given duration.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.write().unwrap().latency = latency;
    }

    /// Returns how many times a cart has been loaded.
    pub fn load_count(&self) -> usize {
        self.state.read().unwrap().loads
    }
}

#[async_trait]
impl CartService for InMemoryCartService {
    async fn load_cart(&self, user: &User) -> Result<Cart, CheckoutError> {
        let latency = self.state.read().unwrap().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.write().unwrap();
        state.loads += 1;

        if state.fail_on_load {
            return Err(CheckoutError::CartService("Cart store unavailable".to_string()));
        }

        let items = state
            .carts
            .get(&user.key)
            .unwrap_or(&state.default_items)
            .clone();
        Ok(Cart::new(user.key.clone(), items))
    }
}
