//! Subscription Coordinator

use std::sync::Arc;

use daosub_common::database::{DynDirectory, DynOrderDatabase};
use daosub_common::notify::{DynUserNotifier, NotificationContext};
use daosub_common::payment::{DynPaymentInitiator, SUBSCRIPTION_CHANNEL};
use daosub_common::pub_sub::NotificationBus;
use daosub_common::{OrderCompletion, OrderId, OrderStatus, SubscriptionOrder};
use serde::{Deserialize, Serialize};
use tokio_util::task::TaskTracker;
use tracing::instrument;

use crate::Error;

mod builder;
mod dispatch;
mod reporter;
mod subscribe;

pub use builder::CoordinatorBuilder;
use dispatch::Dispatcher;
pub use reporter::CompletionReporter;

/// Bus carrying order completions, keyed by order id
pub type CompletionBus = NotificationBus<OrderId, OrderCompletion>;

/// Coordinator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    /// Public base url the payment processor calls back on
    pub callback_url: String,
    /// Payment channel tag
    pub payment_channel: String,
    /// Fields copied into every notification
    pub notification: NotificationContext,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            callback_url: String::new(),
            payment_channel: SUBSCRIPTION_CHANNEL.to_string(),
            notification: NotificationContext {
                currency: "FavT".to_string(),
                ..Default::default()
            },
        }
    }
}

/// Result of a subscribe call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeOutcome {
    /// Order the outcome belongs to
    pub order_id: OrderId,
    /// Processor transaction id
    pub tx_id: Option<String>,
    /// Order status
    pub status: OrderStatus,
}

impl From<&SubscriptionOrder> for SubscribeOutcome {
    fn from(order: &SubscriptionOrder) -> Self {
        Self {
            order_id: order.id,
            tx_id: order.tx_id.clone(),
            status: order.status,
        }
    }
}

impl From<OrderCompletion> for SubscribeOutcome {
    fn from(completion: OrderCompletion) -> Self {
        Self {
            order_id: completion.order_id,
            tx_id: Some(completion.tx_id),
            status: completion.status,
        }
    }
}

/// Subscription Coordinator
#[derive(Clone)]
pub struct Coordinator {
    /// Order Storage backend
    localstore: DynOrderDatabase,
    /// Community and identity lookups
    directory: DynDirectory,
    /// Payment processor
    payment: DynPaymentInitiator,
    /// Paid notices, shared with the reporter
    dispatcher: Dispatcher,
    /// Completion bus
    bus: Arc<CompletionBus>,
    settings: Arc<CoordinatorSettings>,
    /// Background notification dispatches
    tasks: TaskTracker,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("settings", &self.settings)
            .field("bus", &self.bus)
            .field("pending_dispatches", &self.tasks.len())
            .finish()
    }
}

impl Coordinator {
    /// Create new [`Coordinator`]
    pub fn new(
        localstore: DynOrderDatabase,
        directory: DynDirectory,
        payment: DynPaymentInitiator,
        notifier: DynUserNotifier,
        bus: Arc<CompletionBus>,
        settings: CoordinatorSettings,
    ) -> Self {
        let tasks = TaskTracker::new();
        let dispatcher = Dispatcher::new(
            localstore.clone(),
            directory.clone(),
            notifier,
            settings.notification.clone(),
            tasks.clone(),
        );

        Self {
            localstore,
            directory,
            payment,
            dispatcher,
            bus,
            settings: Arc::new(settings),
            tasks,
        }
    }

    /// Settings
    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Completion bus shared with the [`CompletionReporter`]
    pub fn bus(&self) -> Arc<CompletionBus> {
        self.bus.clone()
    }

    /// Reporter publishing completions to this coordinator's waiters
    pub fn completion_reporter(&self) -> CompletionReporter {
        CompletionReporter::new(
            self.localstore.clone(),
            self.bus.clone(),
            self.dispatcher.clone(),
        )
    }

    /// Get order
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: &OrderId) -> Result<SubscriptionOrder, Error> {
        self.localstore
            .get_order(order_id)
            .await
            .map_err(Error::OrderLookupFailed)?
            .ok_or(Error::UnknownOrder(*order_id))
    }

    /// Log orders that are still waiting on the payment processor
    ///
    /// Waiters do not survive a restart. These orders resume once their subscriber calls
    /// again or the processor reports completion.
    pub async fn check_pending_orders(&self) -> Result<usize, Error> {
        let mut pending = 0;

        for status in [OrderStatus::Created, OrderStatus::Submitted] {
            let orders = self
                .localstore
                .get_orders_by_status(status)
                .await
                .map_err(Error::OrderLookupFailed)?;

            for order in &orders {
                tracing::debug!(
                    "Pending order {} for {} on {} is {}",
                    order.id,
                    order.subscriber,
                    order.community_id,
                    order.status
                );
            }

            pending += orders.len();
        }

        if pending > 0 {
            tracing::info!("{} subscription orders are waiting on the processor", pending);
        }

        Ok(pending)
    }

    /// Wait until every notification dispatched so far has finished
    pub async fn wait_dispatches(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Stop accepting dispatches and wait for the in-flight ones
    pub async fn shutdown(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        tracing::info!("Coordinator stopped");
    }
}
