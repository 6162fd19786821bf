//! Point system payment client

use async_trait::async_trait;
use daosub_common::payment::{self, PaymentInitiator, PaymentRequest};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

const APP_KEY_HEADER: &str = "X-App-Key";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PayResponse {
    #[serde(default)]
    tx_id: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

/// Initiates payments on the point system over HTTP
#[derive(Debug, Clone)]
pub struct PointClient {
    client: reqwest::Client,
    pay_url: Url,
    app_key: String,
}

impl PointClient {
    /// Create new [`PointClient`]
    pub fn new(api_url: &str, app_key: String) -> anyhow::Result<Self> {
        let pay_url = Url::parse(api_url)?.join("pay")?;

        Ok(Self {
            client: reqwest::Client::new(),
            pay_url,
            app_key,
        })
    }
}

#[async_trait]
impl PaymentInitiator for PointClient {
    type Err = payment::Error;

    #[instrument(skip_all, fields(order_id = %request.bind_order))]
    async fn initiate_payment(&self, request: PaymentRequest) -> Result<String, Self::Err> {
        let response = self
            .client
            .post(self.pay_url.clone())
            .header(APP_KEY_HEADER, &self.app_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| payment::Error::Transport(Box::new(err)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| payment::Error::Transport(Box::new(err)))?;

        if !status.is_success() {
            tracing::warn!("Point system refused payment with {}: {}", status, body);
            return Err(payment::Error::Rejected(body));
        }

        let pay: PayResponse = serde_json::from_str(&body)?;

        match pay.tx_id.filter(|tx_id| !tx_id.is_empty()) {
            Some(tx_id) => Ok(tx_id),
            None => {
                if let Some(msg) = pay.msg {
                    tracing::warn!("Point system answered without tx id: {}", msg);
                }
                Err(payment::Error::MissingTxId)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pay_url_is_joined() {
        let client = PointClient::new("https://point.example.com/api/", "key".into()).unwrap();
        assert_eq!(client.pay_url.as_str(), "https://point.example.com/api/pay");
    }

    #[test]
    fn rejects_invalid_url() {
        assert!(PointClient::new("not a url", "key".into()).is_err());
    }
}
