//! Notifications sent once a subscription is paid

use daosub_common::database::{DynDirectory, DynOrderDatabase};
use daosub_common::notify::{DynUserNotifier, NotificationContext, PushNotification};
use daosub_common::task::supervised;
use daosub_common::{Community, Identity, OrderId, SubscriptionOrder};
use tokio_util::task::TaskTracker;

use crate::Error;

/// Which side of the payment a notification is addressed to
#[derive(Debug, Clone, Copy)]
enum Recipient {
    Subscriber,
    Owner,
}

impl Recipient {
    fn task_name(&self) -> &'static str {
        match self {
            Recipient::Subscriber => "notify-subscriber",
            Recipient::Owner => "notify-community-owner",
        }
    }
}

/// Sends the paid notices for an order in the background
#[derive(Clone)]
pub(crate) struct Dispatcher {
    localstore: DynOrderDatabase,
    directory: DynDirectory,
    notifier: DynUserNotifier,
    context: NotificationContext,
    tasks: TaskTracker,
}

impl Dispatcher {
    pub(crate) fn new(
        localstore: DynOrderDatabase,
        directory: DynDirectory,
        notifier: DynUserNotifier,
        context: NotificationContext,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            localstore,
            directory,
            notifier,
            context,
            tasks,
        }
    }

    /// Send the subscriber and the community owner a notice about the payment
    ///
    /// Each notice runs as its own background task. Failures are logged and never reach
    /// the caller.
    pub(crate) fn paid(&self, order_id: OrderId) {
        for recipient in [Recipient::Subscriber, Recipient::Owner] {
            let dispatch = self.clone();
            self.tasks.spawn(supervised(
                recipient.task_name(),
                async move { dispatch.send(order_id, recipient).await },
            ));
        }
    }

    async fn send(self, order_id: OrderId, recipient: Recipient) -> Result<(), Error> {
        let notification = self.build(order_id, recipient).await?;

        self.notifier.push(notification).await?;

        tracing::debug!("Sent {:?} notice for order {}", recipient, order_id);

        Ok(())
    }

    async fn build(
        &self,
        order_id: OrderId,
        recipient: Recipient,
    ) -> Result<PushNotification, Error> {
        // Read again, the published value only carries the status
        let order: SubscriptionOrder = self
            .localstore
            .get_order(&order_id)
            .await
            .map_err(Error::OrderLookupFailed)?
            .ok_or(Error::UnknownOrder(order_id))?;

        let community: Community = self
            .directory
            .get_community(&order.community_id)
            .await?
            .ok_or_else(|| Error::CommunityNotFound(order.community_id.clone()))?;

        let subscriber = self.identity(&order.subscriber).await?;
        let amount = order.price.charge_amount();

        Ok(match recipient {
            Recipient::Subscriber => self.context.subscriber_paid(&subscriber, &community, amount),
            Recipient::Owner => {
                let owner = self.identity(&community.owner).await?;
                self.context.owner_received(&subscriber, &owner, amount)
            }
        })
    }

    async fn identity(&self, address: &str) -> Result<Identity, Error> {
        self.directory
            .get_identity(address)
            .await
            .map_err(|err| {
                tracing::warn!("Identity lookup for {} failed: {}", address, err);
                Error::IdentityLookupFailed(address.to_string())
            })?
            .ok_or_else(|| Error::IdentityLookupFailed(address.to_string()))
    }
}
