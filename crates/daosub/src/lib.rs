//! Community subscription payment coordinator
//!
//! Orchestrates order lookup and creation, payment initiation, the asynchronous wait for
//! the processor's completion callback, idempotent resume, and the notifications sent
//! once a subscription is paid.

pub mod coordinator;
pub mod database;

pub use coordinator::{
    CompletionBus, CompletionReporter, Coordinator, CoordinatorBuilder, CoordinatorSettings,
    SubscribeOutcome,
};
pub use daosub_common::error::{self, Error, ErrorCode, ErrorResponse};
pub use daosub_common::{
    common, notify, order, payment, pub_sub, Community, CommunityId, Identity, OrderCompletion,
    OrderId, OrderStatus, Price, SubscriptionOrder,
};
