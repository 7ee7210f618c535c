//! Checkout stage state machine.

use serde::{Deserialize, Serialize};

/// The stage a checkout is in.
///
/// State transitions:
/// ```text
/// ResolvingIdentity ──► LoadingCart ──► Charging ──► Notifying ──► Completed
///         │                  │              │
///         └──────────────────┴──────────────┴──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CheckoutStage {
    /// Resolving (or registering) the user for the checkout's key.
    #[default]
    ResolvingIdentity,

    /// Loading the user's cart and computing its total.
    LoadingCart,

    /// Charging the cart total.
    Charging,

    /// Sending the confirmation. Best-effort.
    Notifying,

    /// The checkout finished (terminal state).
    Completed,

    /// The checkout ended without completing (terminal state).
    Failed,
}

impl CheckoutStage {
    /// Returns true if a cancelled checkout may stop instead of entering this stage.
    ///
    /// Once Charging has been entered the checkout always runs to Completed
    /// or Failed, so Notifying is never skipped.
    pub fn accepts_cancellation(&self) -> bool {
        matches!(
            self,
            CheckoutStage::ResolvingIdentity | CheckoutStage::LoadingCart | CheckoutStage::Charging
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckoutStage::Completed | CheckoutStage::Failed)
    }

    /// Returns the stage name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStage::ResolvingIdentity => "ResolvingIdentity",
            CheckoutStage::LoadingCart => "LoadingCart",
            CheckoutStage::Charging => "Charging",
            CheckoutStage::Notifying => "Notifying",
            CheckoutStage::Completed => "Completed",
            CheckoutStage::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for CheckoutStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stage_is_resolving_identity() {
        assert_eq!(CheckoutStage::default(), CheckoutStage::ResolvingIdentity);
    }

    #[test]
    fn test_accepts_cancellation() {
        assert!(CheckoutStage::ResolvingIdentity.accepts_cancellation());
        assert!(CheckoutStage::LoadingCart.accepts_cancellation());
        assert!(CheckoutStage::Charging.accepts_cancellation());
        assert!(!CheckoutStage::Notifying.accepts_cancellation());
        assert!(!CheckoutStage::Completed.accepts_cancellation());
        assert!(!CheckoutStage::Failed.accepts_cancellation());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!CheckoutStage::ResolvingIdentity.is_terminal());
        assert!(!CheckoutStage::LoadingCart.is_terminal());
        assert!(!CheckoutStage::Charging.is_terminal());
        assert!(!CheckoutStage::Notifying.is_terminal());
        assert!(CheckoutStage::Completed.is_terminal());
        assert!(CheckoutStage::Failed.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(CheckoutStage::ResolvingIdentity.to_string(), "ResolvingIdentity");
        assert_eq!(CheckoutStage::Notifying.to_string(), "Notifying");
        assert_eq!(CheckoutStage::Failed.to_string(), "Failed");
    }

    #[test]
    fn test_serialization() {
        let stage = CheckoutStage::Charging;
        let json = serde_json::to_string(&stage).unwrap();
        let deserialized: CheckoutStage = serde_json::from_str(&json).unwrap();
        assert_eq!(stage, deserialized);
    }
}
