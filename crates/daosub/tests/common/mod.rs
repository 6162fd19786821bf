//! Shared setup for coordinator tests

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use daosub::database::{DynOrderDatabase, Error, OrderDatabase, OrderMemoryDatabase};
use daosub::{
    Community, CommunityId, Coordinator, CoordinatorBuilder, Identity, OrderId, OrderStatus,
    Price, SubscriptionOrder,
};
use daosub_fake_processor::{FakeNotifier, FakePaymentProcessor};

pub const COMMUNITY: &str = "c1";
pub const SUBSCRIBER: &str = "alice";
pub const OWNER: &str = "owner-address";
/// Community whose owner has no identity record
pub const ORPHAN_COMMUNITY: &str = "c2";

pub struct Harness {
    pub coordinator: Coordinator,
    pub store: Arc<OrderMemoryDatabase>,
    pub processor: Arc<FakePaymentProcessor>,
    pub notifier: Arc<FakeNotifier>,
}

pub fn community_id() -> CommunityId {
    CommunityId::from(COMMUNITY)
}

fn store() -> OrderMemoryDatabase {
    OrderMemoryDatabase::new(
        vec![
            Community {
                id: community_id(),
                name: "rustaceans".to_string(),
                owner: OWNER.to_string(),
                price: Price::from_milli(10_000),
            },
            Community {
                id: CommunityId::from(ORPHAN_COMMUNITY),
                name: "ferris".to_string(),
                owner: "departed-owner".to_string(),
                price: Price::from_milli(2_000),
            },
        ],
        vec![
            Identity {
                id: "u1".to_string(),
                address: SUBSCRIBER.to_string(),
                nickname: "Alice".to_string(),
            },
            Identity {
                id: "u2".to_string(),
                address: OWNER.to_string(),
                nickname: "Owner".to_string(),
            },
            Identity {
                id: "u3".to_string(),
                address: "bob".to_string(),
                nickname: "Bob".to_string(),
            },
        ],
    )
}

pub fn harness_with(processor: FakePaymentProcessor, builder: CoordinatorBuilder) -> Harness {
    let store = Arc::new(store());
    let localstore: DynOrderDatabase = store.clone();
    build(store, localstore, processor, builder)
}

/// Harness whose order store loses every tx id write
pub fn harness_losing_tx_ids() -> Harness {
    let store = Arc::new(store());
    let localstore: DynOrderDatabase = Arc::new(LosesTxIds(store.as_ref().clone()));
    build(
        store,
        localstore,
        FakePaymentProcessor::default(),
        CoordinatorBuilder::new(),
    )
}

fn build(
    store: Arc<OrderMemoryDatabase>,
    localstore: DynOrderDatabase,
    processor: FakePaymentProcessor,
    builder: CoordinatorBuilder,
) -> Harness {
    let processor = Arc::new(processor);
    let notifier = Arc::new(FakeNotifier::default());

    let coordinator = builder
        .with_localstore(localstore)
        .with_directory(store.clone())
        .with_payment_initiator(processor.clone())
        .with_notifier(notifier.clone())
        .with_callback_url("https://api.example.com".to_string())
        .with_network("net-1".to_string(), "eu".to_string())
        .build()
        .expect("all backends set");

    Harness {
        coordinator,
        store,
        processor,
        notifier,
    }
}

pub fn harness() -> Harness {
    harness_with(FakePaymentProcessor::default(), CoordinatorBuilder::new())
}

impl Harness {
    /// Latest order for the default pair
    pub async fn order(&self) -> Option<SubscriptionOrder> {
        self.order_for(SUBSCRIBER).await
    }

    pub async fn order_for(&self, subscriber: &str) -> Option<SubscriptionOrder> {
        self.order_in(subscriber, &community_id()).await
    }

    pub async fn order_in(
        &self,
        subscriber: &str,
        community_id: &CommunityId,
    ) -> Option<SubscriptionOrder> {
        self.store
            .find_order(subscriber, community_id)
            .await
            .expect("store lookup")
    }

    /// Wait until the default pair has an order carrying a tx id
    pub async fn submitted_order(&self) -> SubscriptionOrder {
        for _ in 0..1_000 {
            if let Some(order) = self.order().await.filter(|order| order.tx_id.is_some()) {
                return order;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        panic!("order never submitted");
    }

    /// Wait until `count` waiters are attached to the order
    pub async fn waiters(&self, order: &SubscriptionOrder, count: usize) {
        let bus = self.coordinator.bus();
        let order_id = order.id;
        eventually(|| {
            let bus = bus.clone();
            async move { bus.listeners_for(&order_id) == count }
        })
        .await;
    }
}

/// Poll `check` until it holds, panics after a few seconds
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..1_000 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    panic!("condition not reached in time");
}

/// Order store that fails every tx id write and delegates everything else
struct LosesTxIds(OrderMemoryDatabase);

#[async_trait]
impl OrderDatabase for LosesTxIds {
    type Err = Error;

    async fn add_order(&self, order: SubscriptionOrder) -> Result<(), Self::Err> {
        self.0.add_order(order).await
    }

    async fn get_order(&self, order_id: &OrderId) -> Result<Option<SubscriptionOrder>, Self::Err> {
        self.0.get_order(order_id).await
    }

    async fn find_order(
        &self,
        subscriber: &str,
        community_id: &CommunityId,
    ) -> Result<Option<SubscriptionOrder>, Self::Err> {
        self.0.find_order(subscriber, community_id).await
    }

    async fn get_orders_by_status(
        &self,
        status: OrderStatus,
    ) -> Result<Vec<SubscriptionOrder>, Self::Err> {
        self.0.get_orders_by_status(status).await
    }

    async fn release_initiation(&self, order_id: &OrderId) -> Result<bool, Self::Err> {
        self.0.release_initiation(order_id).await
    }

    async fn claim_initiation(&self, order_id: &OrderId, now: u64) -> Result<bool, Self::Err> {
        self.0.claim_initiation(order_id, now).await
    }

    async fn attach_tx_id(
        &self,
        _order_id: &OrderId,
        _tx_id: &str,
    ) -> Result<SubscriptionOrder, Self::Err> {
        Err(Error::Database("tx id write lost".into()))
    }

    async fn finalize_order(
        &self,
        order_id: &OrderId,
        tx_id: &str,
        status: OrderStatus,
    ) -> Result<(SubscriptionOrder, bool), Self::Err> {
        self.0.finalize_order(order_id, tx_id, status).await
    }
}
