//! Fake payment processor and notifier
//!
//! Used for testing and for running the daemon without a real processor. Payments get a
//! random transaction id and, when auto settlement is configured, settle by themselves
//! after a delay.

#![doc = include_str!("../README.md")]

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use daosub_common::payment::{self, PaymentInitiator, PaymentRequest};
use daosub_common::{OrderId, OrderStatus};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

pub mod error;
mod notifier;

pub use error::Error;
pub use notifier::FakeNotifier;

/// Buffered settlements before the processor starts dropping them
const SETTLEMENT_CHANNEL_SIZE: usize = 8_192;

/// Completion the fake processor would report through its callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Order bound to the payment
    pub order_id: OrderId,
    /// Transaction id handed out on initiation
    pub tx_id: String,
    /// Terminal status
    pub status: OrderStatus,
}

/// Auto settlement behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSettle {
    /// Time between initiation and settlement
    pub delay: Duration,
    /// Status every payment settles with
    pub status: OrderStatus,
}

/// Fake Payment Processor
#[derive(Debug, Clone)]
pub struct FakePaymentProcessor {
    sender: tokio::sync::mpsc::Sender<Settlement>,
    receiver: Arc<Mutex<Option<tokio::sync::mpsc::Receiver<Settlement>>>>,
    requests: Arc<Mutex<Vec<PaymentRequest>>>,
    fail: Arc<AtomicBool>,
    initiation_delay: Duration,
    auto_settle: Option<AutoSettle>,
    cancel_token: CancellationToken,
}

impl Default for FakePaymentProcessor {
    fn default() -> Self {
        Self::new(Duration::ZERO, None)
    }
}

impl FakePaymentProcessor {
    /// Create new [`FakePaymentProcessor`]
    pub fn new(initiation_delay: Duration, auto_settle: Option<AutoSettle>) -> Self {
        let (sender, receiver) = tokio::sync::mpsc::channel(SETTLEMENT_CHANNEL_SIZE);

        Self {
            sender,
            receiver: Arc::new(Mutex::new(Some(receiver))),
            requests: Arc::new(Mutex::new(Vec::new())),
            fail: Arc::new(AtomicBool::new(false)),
            initiation_delay,
            auto_settle,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Make every following initiation fail, or succeed again
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Requests received so far, including refused ones
    pub async fn requests(&self) -> Vec<PaymentRequest> {
        self.requests.lock().await.clone()
    }

    /// Stream of auto settlements
    ///
    /// Can only be taken once.
    pub async fn wait_settlements(
        &self,
    ) -> Result<Pin<Box<dyn Stream<Item = Settlement> + Send>>, Error> {
        tracing::info!("Starting stream for fake settlements");
        let receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or(Error::NoReceiver)?;

        Ok(Box::pin(ReceiverStream::new(receiver)))
    }

    /// Stop pending auto settlements
    pub fn cancel_settlements(&self) {
        self.cancel_token.cancel();
    }

    fn schedule_settlement(&self, settle: AutoSettle, order_id: OrderId, tx_id: String) {
        let sender = self.sender.clone();
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    tracing::debug!("Settlement of {} cancelled", tx_id);
                }
                _ = time::sleep(settle.delay) => {
                    let settlement = Settlement {
                        order_id,
                        tx_id,
                        status: settle.status,
                    };

                    if let Err(err) = sender.send(settlement).await {
                        tracing::error!("Could not send fake settlement: {}", err);
                    }
                }
            }
        });
    }
}

#[async_trait]
impl PaymentInitiator for FakePaymentProcessor {
    type Err = payment::Error;

    #[instrument(skip_all, fields(order_id = %request.bind_order))]
    async fn initiate_payment(&self, request: PaymentRequest) -> Result<String, Self::Err> {
        let order_id = request.bind_order;
        self.requests.lock().await.push(request);

        if !self.initiation_delay.is_zero() {
            time::sleep(self.initiation_delay).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::PaymentRefused.into());
        }

        let tx_id = format!("fake-{}", Uuid::new_v4());

        if let Some(settle) = self.auto_settle {
            self.schedule_settlement(settle, order_id, tx_id.clone());
        }

        Ok(tx_id)
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn request() -> PaymentRequest {
        PaymentRequest::for_order(
            OrderId::new(),
            "alice",
            "owner",
            10.0,
            "sub_dao",
            "http://localhost:8085",
        )
    }

    #[tokio::test]
    async fn records_requests_and_hands_out_tx_ids() {
        let processor = FakePaymentProcessor::default();

        let first = processor.initiate_payment(request()).await.unwrap();
        let second = processor.initiate_payment(request()).await.unwrap();

        assert!(first.starts_with("fake-"));
        assert_ne!(first, second);
        assert_eq!(processor.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn fail_switch() {
        let processor = FakePaymentProcessor::default();
        processor.set_fail(true);

        assert!(matches!(
            processor.initiate_payment(request()).await,
            Err(payment::Error::Rejected(_))
        ));
        assert_eq!(processor.requests().await.len(), 1);

        processor.set_fail(false);
        assert!(processor.initiate_payment(request()).await.is_ok());
    }

    #[tokio::test]
    async fn auto_settles() {
        let processor = FakePaymentProcessor::new(
            Duration::ZERO,
            Some(AutoSettle {
                delay: Duration::from_millis(10),
                status: OrderStatus::Success,
            }),
        );
        let mut settlements = processor.wait_settlements().await.unwrap();

        let request = request();
        let order_id = request.bind_order;
        let tx_id = processor.initiate_payment(request).await.unwrap();

        let settlement = settlements.next().await.unwrap();
        assert_eq!(settlement.order_id, order_id);
        assert_eq!(settlement.tx_id, tx_id);
        assert_eq!(settlement.status, OrderStatus::Success);

        assert!(matches!(
            processor.wait_settlements().await,
            Err(Error::NoReceiver)
        ));
    }
}
