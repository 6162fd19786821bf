//! Fake notifier

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use daosub_common::notify::{self, PushNotification, UserNotifier};
use tokio::sync::Mutex;

use crate::Error;

/// Fake User Notifier
///
/// Keeps every notification instead of delivering it.
#[derive(Debug, Clone, Default)]
pub struct FakeNotifier {
    sent: Arc<Mutex<Vec<PushNotification>>>,
    fail: Arc<AtomicBool>,
}

impl FakeNotifier {
    /// Make every following push fail, or succeed again
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Notifications pushed so far
    pub async fn sent(&self) -> Vec<PushNotification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl UserNotifier for FakeNotifier {
    type Err = notify::Error;

    async fn push(&self, notification: PushNotification) -> Result<(), Self::Err> {
        if self.fail.load(Ordering::SeqCst) {
            tracing::debug!("Refusing notification to {}", notification.to);
            return Err(Error::NotificationRefused.into());
        }

        tracing::debug!("Fake push to {}: {}", notification.to, notification.content);
        self.sent.lock().await.push(notification);

        Ok(())
    }
}
