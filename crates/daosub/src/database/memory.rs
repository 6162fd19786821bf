//! Order in memory database

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use daosub_common::{Community, CommunityId, Identity, OrderId, OrderStatus, SubscriptionOrder};
use tokio::sync::RwLock;

use super::{Directory, DirectoryWriter, Error, OrderDatabase};

#[derive(Debug, Default)]
struct Inner {
    orders: HashMap<OrderId, SubscriptionOrder>,
    /// Latest order for each subscriber/community pair
    latest: HashMap<(String, CommunityId), OrderId>,
    communities: HashMap<CommunityId, Community>,
    identities: HashMap<String, Identity>,
}

impl Inner {
    fn order_mut(&mut self, order_id: &OrderId) -> Result<&mut SubscriptionOrder, Error> {
        self.orders
            .get_mut(order_id)
            .ok_or(Error::UnknownOrder(*order_id))
    }
}

/// Order Memory Database
///
/// Every write runs under a single lock, which makes the open-order check in
/// [`OrderDatabase::add_order`] atomic with the insert.
#[derive(Debug, Clone, Default)]
pub struct OrderMemoryDatabase {
    inner: Arc<RwLock<Inner>>,
}

impl OrderMemoryDatabase {
    /// Create new [`OrderMemoryDatabase`] seeded with directory records
    pub fn new(communities: Vec<Community>, identities: Vec<Identity>) -> Self {
        let inner = Inner {
            communities: communities.into_iter().map(|c| (c.id.clone(), c)).collect(),
            identities: identities
                .into_iter()
                .map(|i| (i.address.clone(), i))
                .collect(),
            ..Default::default()
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }
}

#[async_trait]
impl OrderDatabase for OrderMemoryDatabase {
    type Err = Error;

    async fn add_order(&self, order: SubscriptionOrder) -> Result<(), Self::Err> {
        let mut inner = self.inner.write().await;
        let pair = (order.subscriber.clone(), order.community_id.clone());

        if let Some(existing) = inner.latest.get(&pair).and_then(|id| inner.orders.get(id)) {
            if !existing.is_terminal() {
                return Err(Error::DuplicateOrder);
            }
        }

        inner.latest.insert(pair, order.id);
        inner.orders.insert(order.id, order);

        Ok(())
    }

    async fn get_order(&self, order_id: &OrderId) -> Result<Option<SubscriptionOrder>, Self::Err> {
        Ok(self.inner.read().await.orders.get(order_id).cloned())
    }

    async fn find_order(
        &self,
        subscriber: &str,
        community_id: &CommunityId,
    ) -> Result<Option<SubscriptionOrder>, Self::Err> {
        let inner = self.inner.read().await;

        Ok(inner
            .latest
            .get(&(subscriber.to_string(), community_id.clone()))
            .and_then(|id| inner.orders.get(id))
            .cloned())
    }

    async fn get_orders_by_status(
        &self,
        status: OrderStatus,
    ) -> Result<Vec<SubscriptionOrder>, Self::Err> {
        Ok(self
            .inner
            .read()
            .await
            .orders
            .values()
            .filter(|order| order.status == status)
            .cloned()
            .collect())
    }

    async fn release_initiation(&self, order_id: &OrderId) -> Result<bool, Self::Err> {
        let mut inner = self.inner.write().await;
        Ok(inner.order_mut(order_id)?.release_initiation())
    }

    async fn claim_initiation(&self, order_id: &OrderId, now: u64) -> Result<bool, Self::Err> {
        let mut inner = self.inner.write().await;
        Ok(inner.order_mut(order_id)?.claim_initiation(now))
    }

    async fn attach_tx_id(
        &self,
        order_id: &OrderId,
        tx_id: &str,
    ) -> Result<SubscriptionOrder, Self::Err> {
        let mut inner = self.inner.write().await;
        let order = inner.order_mut(order_id)?;

        let mut updated = order.clone();
        updated.mark_submitted(tx_id)?;
        *order = updated.clone();

        Ok(updated)
    }

    async fn finalize_order(
        &self,
        order_id: &OrderId,
        tx_id: &str,
        status: OrderStatus,
    ) -> Result<(SubscriptionOrder, bool), Self::Err> {
        let mut inner = self.inner.write().await;
        let order = inner.order_mut(order_id)?;

        let mut updated = order.clone();
        let changed = updated.finalize(tx_id, status)?;
        *order = updated.clone();

        Ok((updated, changed))
    }
}

#[async_trait]
impl Directory for OrderMemoryDatabase {
    type Err = Error;

    async fn get_community(&self, id: &CommunityId) -> Result<Option<Community>, Self::Err> {
        Ok(self.inner.read().await.communities.get(id).cloned())
    }

    async fn get_identity(&self, address: &str) -> Result<Option<Identity>, Self::Err> {
        Ok(self.inner.read().await.identities.get(address).cloned())
    }
}

#[async_trait]
impl DirectoryWriter for OrderMemoryDatabase {
    type Err = Error;

    async fn put_community(&self, community: Community) -> Result<(), Self::Err> {
        self.inner
            .write()
            .await
            .communities
            .insert(community.id.clone(), community);
        Ok(())
    }

    async fn put_identity(&self, identity: Identity) -> Result<(), Self::Err> {
        self.inner
            .write()
            .await
            .identities
            .insert(identity.address.clone(), identity);
        Ok(())
    }
}
