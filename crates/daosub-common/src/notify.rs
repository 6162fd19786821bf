//! User notifications

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::{Community, Identity};

/// Notification Error
#[derive(Debug, Error)]
pub enum Error {
    /// Gateway refused the notification
    #[error("Notification rejected: {0}")]
    Rejected(String),
    /// Could not reach the gateway
    #[error(transparent)]
    Transport(Box<dyn std::error::Error + Send + Sync>),
    /// Serde Error
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    /// Custom
    #[error("`{0}`")]
    Custom(String),
}

/// Who a notification is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSource {
    /// System generated
    Orange,
    /// Sent on behalf of a user
    User,
}

impl fmt::Display for NotificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationSource::Orange => f.write_str("orange"),
            NotificationSource::User => f.write_str("user"),
        }
    }
}

/// Push notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushNotification {
    /// Keep the notification in the recipient's inbox
    pub is_save: bool,
    /// Network id
    pub network_id: String,
    /// Region
    pub region: String,
    /// Title
    pub title: String,
    /// Content
    pub content: String,
    /// Sender
    pub from: String,
    /// Sender kind
    pub from_type: NotificationSource,
    /// Recipient identity id
    pub to: String,
}

/// Fields shared by the notifications sent after a subscription payment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContext {
    /// Network id
    pub network_id: String,
    /// Region
    pub region: String,
    /// Currency name used in the message text
    pub currency: String,
}

impl NotificationContext {
    fn transaction(&self, content: String, to: &str) -> PushNotification {
        PushNotification {
            is_save: true,
            network_id: self.network_id.clone(),
            region: self.region.clone(),
            title: "Transaction".to_string(),
            content,
            from: "transaction".to_string(),
            from_type: NotificationSource::Orange,
            to: to.to_string(),
        }
    }

    /// Tells the subscriber the payment went through
    pub fn subscriber_paid(
        &self,
        subscriber: &Identity,
        community: &Community,
        amount: f64,
    ) -> PushNotification {
        self.transaction(
            format!(
                "Subscribe to {} dao successfully, pay {:.6} {}",
                community.name, amount, self.currency
            ),
            &subscriber.id,
        )
    }

    /// Tells the community owner a payment was received
    pub fn owner_received(
        &self,
        subscriber: &Identity,
        owner: &Identity,
        amount: f64,
    ) -> PushNotification {
        self.transaction(
            format!(
                "{}({}) subscribed to your dao received {:.6} {}",
                subscriber.nickname, subscriber.address, amount, self.currency
            ),
            &owner.id,
        )
    }
}

/// Delivers push notifications to users
#[async_trait]
pub trait UserNotifier {
    /// Notification Error
    type Err: Into<Error> + From<Error>;

    /// Send a notification
    async fn push(&self, notification: PushNotification) -> Result<(), Self::Err>;
}

/// User notifier trait object
pub type DynUserNotifier = Arc<dyn UserNotifier<Err = Error> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CommunityId, Price};

    fn context() -> NotificationContext {
        NotificationContext {
            network_id: "net".to_string(),
            region: "eu".to_string(),
            currency: "FavT".to_string(),
        }
    }

    #[test]
    fn message_texts() {
        let community = Community {
            id: CommunityId::from("c1"),
            name: "rustaceans".to_string(),
            owner: "owner-address".to_string(),
            price: Price::from_milli(10_000),
        };
        let subscriber = Identity {
            id: "u1".to_string(),
            address: "alice".to_string(),
            nickname: "Alice".to_string(),
        };
        let owner = Identity {
            id: "u2".to_string(),
            address: "owner-address".to_string(),
            nickname: "Owner".to_string(),
        };

        let paid = context().subscriber_paid(&subscriber, &community, 10.0);
        assert_eq!(
            paid.content,
            "Subscribe to rustaceans dao successfully, pay 10.000000 FavT"
        );
        assert_eq!(paid.to, "u1");
        assert_eq!(paid.title, "Transaction");
        assert_eq!(paid.from_type, NotificationSource::Orange);
        assert!(paid.is_save);

        let received = context().owner_received(&subscriber, &owner, 1.5);
        assert_eq!(
            received.content,
            "Alice(alice) subscribed to your dao received 1.500000 FavT"
        );
        assert_eq!(received.to, "u2");
    }

    #[test]
    fn source_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&NotificationSource::Orange).unwrap(),
            "\"orange\""
        );
    }
}
