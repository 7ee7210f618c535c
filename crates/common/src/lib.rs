//! Shared identifiers used across the checkout pipeline crates.

mod types;

pub use types::CheckoutId;
