//! Aggregate view over a batch of checkout results.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use checkout::CheckoutResult;
use domain::Money;
use serde::Serialize;

/// What happened across a batch of checkouts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DemoSummary {
    pub checkouts: usize,
    pub completed: usize,
    /// Failure counts keyed by failure kind.
    pub failed: BTreeMap<String, usize>,
    pub notification_warnings: usize,
    pub distinct_users: usize,
    pub transactions: usize,
    pub charged: Money,
    pub elapsed_ms: u64,
}

impl DemoSummary {
    pub fn from_results(results: &[CheckoutResult], elapsed: Duration) -> Self {
        let mut summary = DemoSummary {
            checkouts: results.len(),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            ..Default::default()
        };
        let mut users = HashSet::new();

        for result in results {
            if let Some(completed) = result.completed() {
                summary.completed += 1;
                summary.notification_warnings += completed.warnings.len();
                users.insert(completed.user.id);
                if completed.transaction_id.is_some() {
                    summary.transactions += 1;
                    summary.charged += completed.total;
                }
            }
            if let Some(kind) = result.failure_kind() {
                *summary.failed.entry(kind.to_string()).or_default() += 1;
            }
        }

        summary.distinct_users = users.len();
        summary
    }

    pub fn failed_total(&self) -> usize {
        self.failed.values().sum()
    }
}
