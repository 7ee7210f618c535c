//! Data model for the checkout pipeline.
//!
//! This crate provides the records shared by the identity registry and the
//! checkout orchestrator:
//! - `UserKey` / `User` / `NewUser` for identity resolution
//! - `Cart` and `Item` snapshots loaded per checkout
//! - `Money` and `TransactionId` value objects

pub mod cart;
pub mod user;
pub mod value_objects;

pub use cart::{Cart, Item};
pub use user::{NewUser, User, UserId, UserKey};
pub use value_objects::{Money, TransactionId};
