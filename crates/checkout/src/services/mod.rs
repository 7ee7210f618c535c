//! External collaborator traits and in-memory implementations for checkout stages.

pub mod cart;
pub mod notification;
pub mod payment;

pub use cart::{CartService, InMemoryCartService};
pub use notification::{InMemoryNotificationService, NotificationService, SentConfirmation};
pub use payment::{InMemoryPaymentService, PaymentResult, PaymentService};
