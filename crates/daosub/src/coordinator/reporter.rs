//! Completion Reporter

use std::sync::Arc;

use daosub_common::database::DynOrderDatabase;
use daosub_common::{OrderCompletion, OrderId, OrderStatus, SubscriptionOrder};
use tracing::instrument;

use super::dispatch::Dispatcher;
use super::CompletionBus;
use crate::Error;

/// Entry point for payment processor callbacks
///
/// The only producer of completion events. Each report is persisted before it is
/// published, so a woken waiter that reads the order sees at least the published status.
/// The report that first moves an order to `Success` also sends the paid notices.
#[derive(Clone)]
pub struct CompletionReporter {
    localstore: DynOrderDatabase,
    bus: Arc<CompletionBus>,
    dispatcher: Dispatcher,
}

impl std::fmt::Debug for CompletionReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionReporter")
            .field("bus", &self.bus)
            .finish()
    }
}

impl CompletionReporter {
    pub(super) fn new(
        localstore: DynOrderDatabase,
        bus: Arc<CompletionBus>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            localstore,
            bus,
            dispatcher,
        }
    }

    /// Record the terminal status of an order and wake its waiters
    ///
    /// Reporting the status an order already has changes nothing in the store and sends no
    /// notices, but is still published, so processors may safely retry their callbacks.
    #[instrument(skip(self))]
    pub async fn report_completion(
        &self,
        order_id: &OrderId,
        tx_id: &str,
        status: OrderStatus,
    ) -> Result<SubscriptionOrder, Error> {
        if !status.is_terminal() {
            return Err(Error::NonTerminalCompletion(status));
        }

        let (order, changed) = self
            .localstore
            .finalize_order(order_id, tx_id, status)
            .await
            .map_err(|err| {
                tracing::warn!("Could not finalize order {}: {}", order_id, err);
                Error::from(err)
            })?;

        let completion = OrderCompletion {
            order_id: order.id,
            tx_id: order.tx_id.clone().unwrap_or_else(|| tx_id.to_string()),
            status: order.status,
        };

        let woken = self.bus.publish(order_id, completion);

        if changed && order.status == OrderStatus::Success {
            self.dispatcher.paid(order.id);
        }

        tracing::info!(
            "Order {} completed with {}, woke {} waiters",
            order_id,
            status,
            woken
        );

        Ok(order)
    }
}
