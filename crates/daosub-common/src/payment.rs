//! Payment initiation

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::OrderId;

/// Payment channel tag the processor uses to route completion callbacks
pub const SUBSCRIPTION_CHANNEL: &str = "sub_dao";

/// Payment Error
#[derive(Debug, Error)]
pub enum Error {
    /// Processor refused the payment
    #[error("Payment rejected: {0}")]
    Rejected(String),
    /// Processor answered without a transaction id
    #[error("Processor returned no transaction id")]
    MissingTxId,
    /// Could not reach the processor
    #[error(transparent)]
    Transport(Box<dyn std::error::Error + Send + Sync>),
    /// Serde Error
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    /// Custom
    #[error("`{0}`")]
    Custom(String),
}

/// Request sent to the payment processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Paying account address
    pub from_object: String,
    /// Receiving account address
    pub to_subject: String,
    /// Charged amount
    pub amount: f64,
    /// Free form comment
    #[serde(default)]
    pub comment: String,
    /// Routing channel
    pub channel: String,
    /// Callback the processor hits once the payment settles
    pub return_uri: String,
    /// Order bound to the payment
    pub bind_order: OrderId,
}

impl PaymentRequest {
    /// Build the request for a subscription order
    pub fn for_order(
        order_id: OrderId,
        from_object: &str,
        to_subject: &str,
        amount: f64,
        channel: &str,
        callback_url: &str,
    ) -> Self {
        Self {
            from_object: from_object.to_string(),
            to_subject: to_subject.to_string(),
            amount,
            comment: String::new(),
            channel: channel.to_string(),
            return_uri: return_uri(callback_url, channel, &order_id),
            bind_order: order_id,
        }
    }
}

/// Completion callback address for an order
pub fn return_uri(callback_url: &str, channel: &str, order_id: &OrderId) -> String {
    format!(
        "{}/pay/notify?method={}&order_id={}",
        callback_url.trim_end_matches('/'),
        channel,
        order_id
    )
}

/// Starts payments at an external processor
#[async_trait]
pub trait PaymentInitiator {
    /// Payment Error
    type Err: Into<Error> + From<Error>;

    /// Start a payment and return the processor transaction id
    async fn initiate_payment(&self, request: PaymentRequest) -> Result<String, Self::Err>;
}

/// Payment initiator trait object
pub type DynPaymentInitiator = Arc<dyn PaymentInitiator<Err = Error> + Send + Sync>;
