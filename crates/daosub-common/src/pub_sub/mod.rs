//! In-process notification bus
//!
//! Waiters register interest in a key and receive at most one value published for that
//! key. Publishing removes every listener registered for the key, so a completion is
//! delivered exactly once to each waiter that was attached at the time and never
//! buffered for waiters that attach later.
//!
//! The bus carries no history: a waiter that attaches after a publish must consult the
//! durable order record instead.

mod bus;
mod error;
mod subscription;

pub use self::bus::{ListenerTree, NotificationBus};
pub use self::error::Error;
pub use self::subscription::Subscription;
