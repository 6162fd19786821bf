//! Push notification clients

use async_trait::async_trait;
use daosub_common::notify::{self, PushNotification, UserNotifier};
use url::Url;

/// Sends notifications to the push gateway over HTTP
#[derive(Debug, Clone)]
pub struct GatewayNotifier {
    client: reqwest::Client,
    push_url: Url,
}

impl GatewayNotifier {
    /// Create new [`GatewayNotifier`]
    pub fn new(gateway_url: &str) -> anyhow::Result<Self> {
        let push_url = Url::parse(gateway_url)?.join("push")?;

        Ok(Self {
            client: reqwest::Client::new(),
            push_url,
        })
    }
}

#[async_trait]
impl UserNotifier for GatewayNotifier {
    type Err = notify::Error;

    async fn push(&self, notification: PushNotification) -> Result<(), Self::Err> {
        let response = self
            .client
            .post(self.push_url.clone())
            .json(&notification)
            .send()
            .await
            .map_err(|err| notify::Error::Transport(Box::new(err)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(notify::Error::Rejected(format!("{}: {}", status, message)));
        }

        Ok(())
    }
}

/// Logs notifications when no push gateway is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl UserNotifier for LogNotifier {
    type Err = notify::Error;

    async fn push(&self, notification: PushNotification) -> Result<(), Self::Err> {
        tracing::info!(
            to = %notification.to,
            title = %notification.title,
            "{}",
            notification.content
        );

        Ok(())
    }
}
