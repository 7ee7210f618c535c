use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one checkout run.
///
/// Minted when the checkout is submitted and handed to the payment processor
/// as its idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckoutId(Uuid);

impl CheckoutId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CheckoutId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CheckoutId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_checkout_gets_a_distinct_id() {
        assert_ne!(CheckoutId::new(), CheckoutId::new());
    }

    #[test]
    fn test_serializes_as_bare_uuid_string() {
        let id = CheckoutId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));

        let back: CheckoutId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
