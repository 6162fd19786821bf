//! Shared types and functions for the community subscription coordinator.
//!
//! This crate is the base foundation for the coordinator, its storage backends and the
//! daemon. It contains the order entity and its state machine, the directory records the
//! coordinator reads, the store/payment/notifier traits the coordinator is generic over,
//! and the in-process notification bus that wakes waiters when a payment completes.

pub mod common;
pub mod database;
pub mod error;
pub mod notify;
pub mod order;
pub mod payment;
pub mod pub_sub;
pub mod task;
pub mod util;

pub use common::{Community, CommunityId, Identity, Price};
pub use error::{Error, ErrorCode, ErrorResponse};
pub use order::{OrderCompletion, OrderId, OrderStatus, SubscriptionOrder};
