//! Pipeline configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::state::CheckoutStage;

const DEFAULT_MAX_IN_FLIGHT: usize = 64;
const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// What to do when a cart totals exactly zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroTotalPolicy {
    /// Skip the payment call and still send the confirmation.
    #[default]
    SkipCharge,
    /// Fail the checkout with `InvalidTotal`.
    Reject,
}

impl FromStr for ZeroTotalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" | "skip_charge" => Ok(ZeroTotalPolicy::SkipCharge),
            "reject" => Ok(ZeroTotalPolicy::Reject),
            other => Err(format!("unknown zero-total policy: {other}")),
        }
    }
}

/// Per-stage bounds on external calls. `None` leaves a stage unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub identity: Option<Duration>,
    pub cart: Option<Duration>,
    pub payment: Option<Duration>,
    pub notification: Option<Duration>,
}

impl StageTimeouts {
    /// No stage is bounded.
    pub fn none() -> Self {
        Self {
            identity: None,
            cart: None,
            payment: None,
            notification: None,
        }
    }

    /// Every stage is bounded by the same duration.
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            identity: Some(timeout),
            cart: Some(timeout),
            payment: Some(timeout),
            notification: Some(timeout),
        }
    }

    /// Returns the bound for a stage.
    pub fn for_stage(&self, stage: CheckoutStage) -> Option<Duration> {
        match stage {
            CheckoutStage::ResolvingIdentity => self.identity,
            CheckoutStage::LoadingCart => self.cart,
            CheckoutStage::Charging => self.payment,
            CheckoutStage::Notifying => self.notification,
            CheckoutStage::Completed | CheckoutStage::Failed => None,
        }
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self::uniform(DEFAULT_STAGE_TIMEOUT)
    }
}

/// Orchestrator configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `CHECKOUT_MAX_IN_FLIGHT` — concurrently running checkouts (default: `64`)
/// - `CHECKOUT_IDENTITY_TIMEOUT_MS`, `CHECKOUT_CART_TIMEOUT_MS`,
///   `CHECKOUT_PAYMENT_TIMEOUT_MS`, `CHECKOUT_NOTIFICATION_TIMEOUT_MS` —
///   per-stage bounds (default: `5000`; `0` disables the bound)
/// - `CHECKOUT_ZERO_TOTAL` — `skip` or `reject` (default: `skip`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub max_in_flight: usize,
    pub timeouts: StageTimeouts,
    pub zero_total: ZeroTotalPolicy,
}

impl PipelineConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let timeout = |name: &str| match var(name).and_then(|v| v.trim().parse::<u64>().ok()) {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => Some(DEFAULT_STAGE_TIMEOUT),
        };

        Self {
            max_in_flight: var("CHECKOUT_MAX_IN_FLIGHT")
                .and_then(|v| v.trim().parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_IN_FLIGHT),
            timeouts: StageTimeouts {
                identity: timeout("CHECKOUT_IDENTITY_TIMEOUT_MS"),
                cart: timeout("CHECKOUT_CART_TIMEOUT_MS"),
                payment: timeout("CHECKOUT_PAYMENT_TIMEOUT_MS"),
                notification: timeout("CHECKOUT_NOTIFICATION_TIMEOUT_MS"),
            },
            zero_total: var("CHECKOUT_ZERO_TOTAL")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_zero_total(mut self, policy: ZeroTotalPolicy) -> Self {
        self.zero_total = policy;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            timeouts: StageTimeouts::default(),
            zero_total: ZeroTotalPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_in_flight, 64);
        assert_eq!(config.timeouts, StageTimeouts::uniform(Duration::from_secs(5)));
        assert_eq!(config.zero_total, ZeroTotalPolicy::SkipCharge);
    }

    #[test]
    fn test_empty_environment_matches_default() {
        assert_eq!(PipelineConfig::from_vars(vars(&[])), PipelineConfig::default());
    }

    #[test]
    fn test_from_vars() {
        let config = PipelineConfig::from_vars(vars(&[
            ("CHECKOUT_MAX_IN_FLIGHT", "8"),
            ("CHECKOUT_PAYMENT_TIMEOUT_MS", "250"),
            ("CHECKOUT_NOTIFICATION_TIMEOUT_MS", "0"),
            ("CHECKOUT_ZERO_TOTAL", "reject"),
        ]));

        assert_eq!(config.max_in_flight, 8);
        assert_eq!(config.timeouts.payment, Some(Duration::from_millis(250)));
        assert_eq!(config.timeouts.notification, None);
        assert_eq!(config.timeouts.cart, Some(Duration::from_secs(5)));
        assert_eq!(config.zero_total, ZeroTotalPolicy::Reject);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = PipelineConfig::from_vars(vars(&[
            ("CHECKOUT_MAX_IN_FLIGHT", "0"),
            ("CHECKOUT_CART_TIMEOUT_MS", "soon"),
            ("CHECKOUT_ZERO_TOTAL", "maybe"),
        ]));

        assert_eq!(config.max_in_flight, 64);
        assert_eq!(config.timeouts.cart, Some(Duration::from_secs(5)));
        assert_eq!(config.zero_total, ZeroTotalPolicy::SkipCharge);
    }

    #[test]
    fn test_zero_total_policy_parsing() {
        assert_eq!("skip".parse::<ZeroTotalPolicy>(), Ok(ZeroTotalPolicy::SkipCharge));
        assert_eq!(" Reject ".parse::<ZeroTotalPolicy>(), Ok(ZeroTotalPolicy::Reject));
        assert!("charge".parse::<ZeroTotalPolicy>().is_err());
    }

    #[test]
    fn test_timeouts_for_stage() {
        let timeouts = StageTimeouts {
            identity: Some(Duration::from_millis(1)),
            cart: Some(Duration::from_millis(2)),
            payment: Some(Duration::from_millis(3)),
            notification: None,
        };
        assert_eq!(
            timeouts.for_stage(CheckoutStage::Charging),
            Some(Duration::from_millis(3))
        );
        assert_eq!(timeouts.for_stage(CheckoutStage::Notifying), None);
        assert_eq!(timeouts.for_stage(CheckoutStage::Completed), None);
    }

    #[test]
    fn test_builder_clamps_pool_size() {
        let config = PipelineConfig::default().with_max_in_flight(0);
        assert_eq!(config.max_in_flight, 1);
    }
}
