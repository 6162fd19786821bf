use std::future::Future;

use daosub_common::payment::PaymentRequest;
use daosub_common::pub_sub::Subscription;
use daosub_common::util::unix_time;
use daosub_common::{Community, CommunityId, OrderCompletion, OrderId, SubscriptionOrder};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::{Coordinator, SubscribeOutcome};
use crate::Error;

/// Lookups performed before giving up on a pair that keeps changing under us
const MAX_LOOKUP_ATTEMPTS: usize = 3;

type Waiter = Subscription<OrderId, OrderCompletion>;

impl Coordinator {
    /// Subscribe `subscriber` to a community
    ///
    /// Creates the order and starts the payment when the pair has no order yet, attaches to
    /// the open order otherwise, and blocks until the payment processor reports
    /// completion or `cancel` fires. An order that already reached a terminal status is
    /// answered from the store without waiting. An open order whose last initiation was
    /// refused by the initiator is initiated again.
    ///
    /// Cancelling leaves the order untouched; a later call attaches to it again.
    #[instrument(skip(self, cancel))]
    pub async fn subscribe(
        &self,
        cancel: &CancellationToken,
        community_id: &CommunityId,
        subscriber: &str,
    ) -> Result<SubscribeOutcome, Error> {
        for _ in 0..MAX_LOOKUP_ATTEMPTS {
            let waiter = match self.prepare_waiter(community_id, subscriber).await? {
                Prepared::Done(order) => {
                    tracing::debug!("Order {} already {}", order.id, order.status);
                    return Ok(SubscribeOutcome::from(&order));
                }
                Prepared::Wait(waiter) => waiter,
            };

            match self.wait_for_completion(cancel, waiter).await {
                // The initiation we waited on was refused and released
                Err(Error::NotificationChannelClosed) => {
                    tracing::debug!(
                        "Initiation for {} on {} released, looking up again",
                        subscriber,
                        community_id
                    );
                    continue;
                }
                result => return result.map(SubscribeOutcome::from),
            }
        }

        Err(Error::NotificationChannelClosed)
    }

    /// Find or create the order for the pair and register a waiter on it
    async fn prepare_waiter(
        &self,
        community_id: &CommunityId,
        subscriber: &str,
    ) -> Result<Prepared, Error> {
        for _ in 0..MAX_LOOKUP_ATTEMPTS {
            let existing = self
                .localstore
                .find_order(subscriber, community_id)
                .await
                .map_err(Error::OrderLookupFailed)?;

            let order = match existing {
                Some(order) => order,
                None => {
                    let community = self.get_community(community_id).await?;
                    self.ensure_identity(subscriber).await?;

                    match self
                        .create_order_and_initiate_payment(subscriber, &community, |order_id| {
                            self.initiate(order_id, subscriber, &community)
                        })
                        .await
                    {
                        Ok((order, (waiter, tx_id))) => {
                            self.attach_tx_id(&order.id, &tx_id).await;
                            return Ok(Prepared::Wait(waiter));
                        }
                        Err(Error::DuplicateOrder) => {
                            tracing::debug!(
                                "Lost the race creating an order for {} on {}",
                                subscriber,
                                community_id
                            );
                            continue;
                        }
                        Err(err) => return Err(err),
                    }
                }
            };

            if order.is_terminal() {
                return Ok(Prepared::Done(order));
            }

            // An attempt with an unknown outcome is never repeated, its completion arrives
            // through the reporter
            if order.can_retry_initiation() {
                let community = self.get_community(community_id).await?;

                if self
                    .localstore
                    .claim_initiation(&order.id, unix_time())
                    .await?
                {
                    tracing::info!("Retrying refused payment initiation for order {}", order.id);
                    let (waiter, tx_id) = self.initiate(order.id, subscriber, &community).await?;
                    self.attach_tx_id(&order.id, &tx_id).await;
                    return Ok(Prepared::Wait(waiter));
                }
            }

            match self.attach_waiter(order.id).await? {
                Some(prepared) => return Ok(prepared),
                None => continue,
            }
        }

        Err(Error::DuplicateOrder)
    }

    /// Persist a `Created` order and run `on_initiated` for it
    ///
    /// `on_initiated` runs after the order is durable and before this returns, so the
    /// caller can register interest in the order before the payment starts. Nothing is
    /// rolled back when it fails: the order stays `Created`.
    pub async fn create_order_and_initiate_payment<F, Fut, T>(
        &self,
        subscriber: &str,
        community: &Community,
        on_initiated: F,
    ) -> Result<(SubscriptionOrder, T), Error>
    where
        F: FnOnce(OrderId) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let order = SubscriptionOrder::new(
            subscriber,
            community.id.clone(),
            community.price,
            unix_time(),
        );

        self.localstore.add_order(order.clone()).await?;

        tracing::debug!(
            "Created order {} for {} on {}",
            order.id,
            subscriber,
            community.id
        );

        let initiated = on_initiated(order.id).await?;

        Ok((order, initiated))
    }

    /// Register a waiter for the order, then start the payment
    ///
    /// The waiter is registered first so a completion reported while the initiator call
    /// is in flight is not missed. A refused initiation releases the order for the next
    /// call.
    async fn initiate(
        &self,
        order_id: OrderId,
        subscriber: &str,
        community: &Community,
    ) -> Result<(Waiter, String), Error> {
        let waiter = self.bus.subscribe(order_id);

        let request = PaymentRequest::for_order(
            order_id,
            subscriber,
            &community.owner,
            community.price.charge_amount(),
            &self.settings.payment_channel,
            &self.settings.callback_url,
        );

        let tx_id = match self.payment.initiate_payment(request).await {
            Ok(tx_id) => tx_id,
            Err(err) => {
                tracing::warn!("Payment initiation for order {} failed: {}", order_id, err);
                drop(waiter);
                if self.release_initiation(&order_id).await {
                    // Callers attached meanwhile look the order up again
                    self.bus.close(&order_id);
                }
                return Err(Error::PaymentInitiationFailed(err));
            }
        };

        tracing::info!("Payment {} initiated for order {}", tx_id, order_id);

        Ok((waiter, tx_id))
    }

    /// Bind the transaction id, best effort
    ///
    /// The completion callback carries the tx id as well and reconciles it if this write
    /// is lost.
    async fn attach_tx_id(&self, order_id: &OrderId, tx_id: &str) {
        if let Err(err) = self.localstore.attach_tx_id(order_id, tx_id).await {
            tracing::error!(
                "Could not attach tx id {} to order {}: {}",
                tx_id,
                order_id,
                err
            );
        }
    }

    /// Mark the order as free for another initiation attempt
    ///
    /// When this write is lost the order keeps waiting for a completion instead.
    async fn release_initiation(&self, order_id: &OrderId) -> bool {
        match self.localstore.release_initiation(order_id).await {
            Ok(released) => {
                tracing::debug!("Order {} released for a retry: {}", order_id, released);
                released
            }
            Err(err) => {
                tracing::error!(
                    "Could not release order {} after a refused initiation: {}",
                    order_id,
                    err
                );
                false
            }
        }
    }

    /// Attach a waiter to an open order
    ///
    /// The order is read again after registration: a completion published between the
    /// lookup and the registration is only visible in the store. Returns `None` when the
    /// order was released for another initiation attempt meanwhile.
    async fn attach_waiter(&self, order_id: OrderId) -> Result<Option<Prepared>, Error> {
        let waiter = self.bus.subscribe(order_id);

        let order = self
            .localstore
            .get_order(&order_id)
            .await
            .map_err(Error::OrderLookupFailed)?
            .ok_or(Error::UnknownOrder(order_id))?;

        if order.is_terminal() {
            return Ok(Some(Prepared::Done(order)));
        }

        if order.can_retry_initiation() {
            return Ok(None);
        }

        tracing::debug!("Waiting on {} order {}", order.status, order_id);

        Ok(Some(Prepared::Wait(waiter)))
    }

    async fn wait_for_completion(
        &self,
        cancel: &CancellationToken,
        mut waiter: Waiter,
    ) -> Result<OrderCompletion, Error> {
        let order_id = *waiter.key();

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Wait on order {} cancelled", order_id);
                Err(Error::Cancelled)
            }
            completion = waiter.recv() => {
                completion.map_err(|_| Error::NotificationChannelClosed)
            }
        }
    }

    async fn get_community(&self, community_id: &CommunityId) -> Result<Community, Error> {
        self.directory
            .get_community(community_id)
            .await?
            .ok_or_else(|| Error::CommunityNotFound(community_id.clone()))
    }

    async fn ensure_identity(&self, address: &str) -> Result<(), Error> {
        match self.directory.get_identity(address).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(Error::IdentityNotFound(address.to_string())),
            Err(err) => {
                tracing::warn!("Identity lookup for {} failed: {}", address, err);
                Err(Error::IdentityLookupFailed(address.to_string()))
            }
        }
    }
}

enum Prepared {
    /// Order is terminal
    Done(SubscriptionOrder),
    /// Waiter registered on an open order
    Wait(Waiter),
}
