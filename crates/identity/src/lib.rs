//! Identity registry for the checkout pipeline.
//!
//! Resolves a [`UserKey`](domain::UserKey) to a shared [`User`](domain::User),
//! creating the user through a [`UserDirectory`] when it does not exist yet.
//! Concurrent resolvers of the same key are fanned onto a single in-flight
//! creation, so the directory's create path runs at most once per key.

pub mod directory;
pub mod error;
pub mod registry;

pub use directory::{InMemoryUserDirectory, UserDirectory};
pub use error::IdentityError;
pub use registry::{IdentityRegistry, RegistryStats};
