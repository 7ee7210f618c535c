//! Cart snapshots.

use serde::{Deserialize, Serialize};

use crate::user::UserKey;
use crate::value_objects::Money;

/// A priced line in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Stock keeping unit.
    pub sku: String,

    /// Human-readable product name.
    pub name: String,

    /// Quantity in the cart.
    pub quantity: u32,

    /// Cost per unit.
    pub unit_cost: Money,
}

impl Item {
    /// Creates a new cart item.
    pub fn new(
        sku: impl Into<String>,
        name: impl Into<String>,
        quantity: u32,
        unit_cost: Money,
    ) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            quantity,
            unit_cost,
        }
    }

    /// Creates a single-unit item where the name doubles as the SKU.
    pub fn priced(name: impl Into<String>, cost: Money) -> Self {
        let name = name.into();
        Self::new(name.clone(), name, 1, cost)
    }

    /// Returns quantity * unit cost.
    pub fn line_total(&self) -> Money {
        self.unit_cost.multiply(self.quantity)
    }
}

/// A read-only snapshot of a user's cart, valid for one checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    owner: UserKey,
    items: Vec<Item>,
}

impl Cart {
    /// Creates a cart snapshot for a user.
    pub fn new(owner: UserKey, items: Vec<Item>) -> Self {
        Self { owner, items }
    }

    /// Creates an empty cart for a user.
    pub fn empty(owner: UserKey) -> Self {
        Self::new(owner, Vec::new())
    }

    /// Returns the key of the user owning this cart.
    pub fn owner(&self) -> &UserKey {
        &self.owner
    }

    /// Returns the items in the cart.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of all line totals. An empty cart totals zero.
    pub fn total(&self) -> Money {
        self.items.iter().map(Item::line_total).sum()
    }
}
