//! Order store and directory traits

use std::sync::Arc;

use async_trait::async_trait;

use crate::common::{Community, CommunityId, Identity};
use crate::order::{OrderId, OrderStatus, StateError, SubscriptionOrder};


/// Database error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database Error
    #[error(transparent)]
    Database(Box<dyn std::error::Error + Send + Sync>),
    /// Serde Error
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    /// An order that is not terminal already exists for the pair
    #[error("Open order already exists for pair")]
    DuplicateOrder,
    /// Unknown order
    #[error("Unknown order `{0}`")]
    UnknownOrder(OrderId),
    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(StateError),
}

impl From<StateError> for Error {
    fn from(state: StateError) -> Self {
        Error::InvalidStateTransition(state)
    }
}

/// Subscription order store
///
/// Implementations must make [`OrderDatabase::add_order`] an atomic conditional insert:
/// it is the only serialization point preventing two open orders for the same
/// subscriber/community pair.
#[async_trait]
pub trait OrderDatabase {
    /// Database Error
    type Err: Into<Error> + From<Error>;

    /// Persist a new order
    ///
    /// Fails with [`Error::DuplicateOrder`] when the pair already has an order in the
    /// `Created` or `Submitted` state.
    async fn add_order(&self, order: SubscriptionOrder) -> Result<(), Self::Err>;

    /// Get [`SubscriptionOrder`]
    async fn get_order(&self, order_id: &OrderId) -> Result<Option<SubscriptionOrder>, Self::Err>;

    /// Most recent order for the subscriber/community pair
    async fn find_order(
        &self,
        subscriber: &str,
        community_id: &CommunityId,
    ) -> Result<Option<SubscriptionOrder>, Self::Err>;

    /// All orders in the given status
    async fn get_orders_by_status(
        &self,
        status: OrderStatus,
    ) -> Result<Vec<SubscriptionOrder>, Self::Err>;

    /// Record that the payment initiator refused the latest attempt for the order
    ///
    /// Atomically sets the order's `initiation_failed` flag. Returns `false` when the order
    /// is no longer `Created` without a transaction id.
    async fn release_initiation(&self, order_id: &OrderId) -> Result<bool, Self::Err>;

    /// Claim a released order for another payment initiation attempt
    ///
    /// Atomically clears `initiation_failed`, sets `initiated_time` to `now` and returns
    /// `true` only for a `Created` order whose previous attempt was released. At most one
    /// concurrent caller wins the claim.
    async fn claim_initiation(&self, order_id: &OrderId, now: u64) -> Result<bool, Self::Err>;

    /// Bind the transaction id returned by the payment initiator and move the order to
    /// `Submitted`
    async fn attach_tx_id(
        &self,
        order_id: &OrderId,
        tx_id: &str,
    ) -> Result<SubscriptionOrder, Self::Err>;

    /// Persist the terminal status reported by the payment processor
    ///
    /// Re-applying the stored terminal status is a no-op. The returned flag tells whether
    /// this call changed the status.
    async fn finalize_order(
        &self,
        order_id: &OrderId,
        tx_id: &str,
        status: OrderStatus,
    ) -> Result<(SubscriptionOrder, bool), Self::Err>;
}

/// Read access to communities and identities
#[async_trait]
pub trait Directory {
    /// Database Error
    type Err: Into<Error> + From<Error>;

    /// Get [`Community`]
    async fn get_community(&self, id: &CommunityId) -> Result<Option<Community>, Self::Err>;

    /// Get [`Identity`] by address
    async fn get_identity(&self, address: &str) -> Result<Option<Identity>, Self::Err>;
}

/// Write access used to sync directory records from the rest of the backend
#[async_trait]
pub trait DirectoryWriter {
    /// Database Error
    type Err: Into<Error> + From<Error>;

    /// Insert or replace [`Community`]
    async fn put_community(&self, community: Community) -> Result<(), Self::Err>;

    /// Insert or replace [`Identity`]
    async fn put_identity(&self, identity: Identity) -> Result<(), Self::Err>;
}

/// Order store trait object
pub type DynOrderDatabase = Arc<dyn OrderDatabase<Err = Error> + Send + Sync>;

/// Directory trait object
pub type DynDirectory = Arc<dyn Directory<Err = Error> + Send + Sync>;

/// Directory writer trait object
pub type DynDirectoryWriter = Arc<dyn DirectoryWriter<Err = Error> + Send + Sync>;
