//! Subscription order and its state transition rules

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::{CommunityId, Price};

/// State transition Error
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Order already reached a terminal state
    #[error("Order already final with status {0}")]
    AlreadyFinal(OrderStatus),
    /// Invalid transition
    #[error("Invalid order transition: From {0} to {1}")]
    InvalidTransition(OrderStatus, OrderStatus),
    /// Transaction id can not be reassigned
    #[error("Order already bound to transaction {current}, refusing {proposed}")]
    TxIdMismatch {
        /// Stored transaction id
        current: String,
        /// Rejected transaction id
        proposed: String,
    },
}

/// Order Id
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Generate a new random [`OrderId`]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Raw bytes, used as storage key
    pub fn to_bytes(&self) -> [u8; 16] {
        *self.0.as_bytes()
    }

    /// Build from storage key
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for OrderId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::from_str(s).map(Self)
    }
}

impl From<Uuid> for OrderId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Order status
///
/// `Created -> Submitted -> {Success, Failed, Cancelled}`
#[derive(Debug, Clone, Copy, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order persisted, payment not initiated yet
    #[default]
    Created,
    /// Payment initiated, waiting for the processor
    Submitted,
    /// Payment completed
    Success,
    /// Payment failed
    Failed,
    /// Payment cancelled at the processor
    Cancelled,
}

impl OrderStatus {
    /// Terminal statuses never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Success | OrderStatus::Failed | OrderStatus::Cancelled
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Created => "created",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Success => "success",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(OrderStatus::Created),
            "submitted" => Ok(OrderStatus::Submitted),
            "success" => Ok(OrderStatus::Success),
            "failed" => Ok(OrderStatus::Failed),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            _ => Err(format!("Unknown order status: {}", s)),
        }
    }
}

#[inline]
/// Check if the order status transition is allowed
///
/// Valid transitions:
/// - Created -> Submitted, Success, Failed, Cancelled
/// - Submitted -> Success, Failed, Cancelled
/// - Success, Failed, Cancelled -> (no transitions allowed)
pub fn check_order_status_transition(
    current: OrderStatus,
    new: OrderStatus,
) -> Result<(), StateError> {
    let is_valid_transition = match current {
        OrderStatus::Created => new != OrderStatus::Created,
        OrderStatus::Submitted => new.is_terminal(),
        _ => false,
    };

    if !is_valid_transition {
        Err(if current.is_terminal() {
            StateError::AlreadyFinal(current)
        } else {
            StateError::InvalidTransition(current, new)
        })
    } else {
        Ok(())
    }
}

/// Subscription Order
///
/// Durable record of one subscription payment attempt. Orders are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionOrder {
    /// Order id
    pub id: OrderId,
    /// Subscriber address
    pub subscriber: String,
    /// Community subscribed to
    pub community_id: CommunityId,
    /// Processor transaction id, set once payment initiation succeeds
    pub tx_id: Option<String>,
    /// Status
    pub status: OrderStatus,
    /// Community price at order time
    pub price: Price,
    /// Unix time the order was created
    pub created_time: u64,
    /// Unix time of the latest payment initiation attempt
    pub initiated_time: u64,
    /// The latest initiation attempt is known to have failed
    ///
    /// Only set when the payment initiator returned an error, so nothing is in flight at
    /// the processor. An attempt with an unknown outcome leaves it unset.
    #[serde(default)]
    pub initiation_failed: bool,
}

impl SubscriptionOrder {
    /// Create new [`SubscriptionOrder`] in the `Created` state
    pub fn new(subscriber: &str, community_id: CommunityId, price: Price, now: u64) -> Self {
        Self {
            id: OrderId::new(),
            subscriber: subscriber.to_string(),
            community_id,
            tx_id: None,
            status: OrderStatus::Created,
            price,
            created_time: now,
            initiated_time: now,
            initiation_failed: false,
        }
    }

    /// Whether the order reached a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Bind the processor transaction id
    ///
    /// Re-binding the same id is accepted, a different one is rejected.
    pub fn set_tx_id(&mut self, tx_id: &str) -> Result<(), StateError> {
        match &self.tx_id {
            Some(current) if current != tx_id => Err(StateError::TxIdMismatch {
                current: current.clone(),
                proposed: tx_id.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.tx_id = Some(tx_id.to_string());
                Ok(())
            }
        }
    }

    /// Apply the result of a successful payment initiation
    ///
    /// Moves `Created` to `Submitted`. An order that was already finalized by the
    /// completion callback only gets its missing tx id filled in.
    pub fn mark_submitted(&mut self, tx_id: &str) -> Result<(), StateError> {
        self.set_tx_id(tx_id)?;
        if self.status == OrderStatus::Created {
            self.status = OrderStatus::Submitted;
        }
        self.initiation_failed = false;
        Ok(())
    }

    /// Apply a terminal status reported by the processor
    ///
    /// Returns `false` when the order already carried this exact status.
    pub fn finalize(&mut self, tx_id: &str, status: OrderStatus) -> Result<bool, StateError> {
        if self.status == status && status.is_terminal() {
            self.set_tx_id(tx_id)?;
            return Ok(false);
        }

        check_order_status_transition(self.status, status)?;
        self.set_tx_id(tx_id)?;
        self.status = status;
        Ok(true)
    }

    /// Whether payment initiation may run again for this order
    ///
    /// True only for a `Created` order whose last attempt was refused by the initiator.
    pub fn can_retry_initiation(&self) -> bool {
        self.status == OrderStatus::Created && self.tx_id.is_none() && self.initiation_failed
    }

    /// Record that the initiator refused the latest attempt
    ///
    /// Returns `false` when the order moved on in the meantime.
    pub fn release_initiation(&mut self) -> bool {
        if self.status != OrderStatus::Created || self.tx_id.is_some() || self.initiation_failed
        {
            return false;
        }

        self.initiation_failed = true;
        true
    }

    /// Take a failed order for another initiation attempt
    ///
    /// Returns `false` unless [`SubscriptionOrder::can_retry_initiation`] holds.
    pub fn claim_initiation(&mut self, now: u64) -> bool {
        if !self.can_retry_initiation() {
            return false;
        }

        self.initiation_failed = false;
        self.initiated_time = now;
        true
    }
}

/// Value published on the notification bus when an order completes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCompletion {
    /// Order id
    pub order_id: OrderId,
    /// Processor transaction id
    pub tx_id: String,
    /// Terminal status
    pub status: OrderStatus,
}
