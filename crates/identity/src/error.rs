//! Identity resolution error types.

use std::time::Duration;

use domain::UserKey;
use thiserror::Error;

/// Errors that can occur while resolving a user.
///
/// Cloneable so that every resolver waiting on the same creation receives
/// the same failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// The directory lookup failed.
    #[error("User lookup failed for '{key}': {reason}")]
    Lookup { key: UserKey, reason: String },

    /// The directory rejected or failed the creation.
    #[error("User creation failed for '{key}': {reason}")]
    Create { key: UserKey, reason: String },

    /// A directory call did not finish in time.
    #[error("Directory call for '{key}' timed out after {after:?}")]
    Timeout { key: UserKey, after: Duration },

    /// The creation task ended without publishing a result.
    #[error("Creation for '{key}' was abandoned before it completed")]
    Abandoned { key: UserKey },
}
