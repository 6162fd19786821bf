//! Environment variable overrides
//!
//! Every setting of the config file can be replaced by a `DAOSUB_*` variable, which
//! is how the daemon is usually configured inside containers.

use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Result};

use crate::config::{
    Coordinator, Database, DatabaseEngine, FakeProcessor, Info, LoggingConfig, LoggingOutput,
    Notify, Payment, PaymentBackend, Point, Settings,
};

// Info
pub const ENV_LISTEN_HOST: &str = "DAOSUB_LISTEN_HOST";
pub const ENV_LISTEN_PORT: &str = "DAOSUB_LISTEN_PORT";
pub const ENV_CALLBACK_URL: &str = "DAOSUB_CALLBACK_URL";
pub const ENV_SUBSCRIBE_TIMEOUT: &str = "DAOSUB_SUBSCRIBE_TIMEOUT";
// Coordinator
pub const ENV_PAYMENT_CHANNEL: &str = "DAOSUB_PAYMENT_CHANNEL";
pub const ENV_CURRENCY: &str = "DAOSUB_CURRENCY";
pub const ENV_NETWORK_ID: &str = "DAOSUB_NETWORK_ID";
pub const ENV_REGION: &str = "DAOSUB_REGION";
// Payment
pub const ENV_PAYMENT_BACKEND: &str = "DAOSUB_PAYMENT_BACKEND";
pub const ENV_POINT_API_URL: &str = "DAOSUB_POINT_API_URL";
pub const ENV_POINT_APP_KEY: &str = "DAOSUB_POINT_APP_KEY";
pub const ENV_FAKE_SETTLE_DELAY: &str = "DAOSUB_FAKE_SETTLE_DELAY";
pub const ENV_FAKE_SETTLE_STATUS: &str = "DAOSUB_FAKE_SETTLE_STATUS";
// Notify
pub const ENV_NOTIFY_GATEWAY_URL: &str = "DAOSUB_NOTIFY_GATEWAY_URL";
// Database
pub const DATABASE_ENV_VAR: &str = "DAOSUB_DATABASE";
// Logging
pub const ENV_LOGGING_OUTPUT: &str = "DAOSUB_LOGGING_OUTPUT";
pub const ENV_LOGGING_CONSOLE_LEVEL: &str = "DAOSUB_LOGGING_CONSOLE_LEVEL";
pub const ENV_LOGGING_FILE_LEVEL: &str = "DAOSUB_LOGGING_FILE_LEVEL";

impl Settings {
    pub fn from_env(mut self) -> Result<Self> {
        if let Ok(database) = env::var(DATABASE_ENV_VAR) {
            let engine = DatabaseEngine::from_str(&database).map_err(|err| anyhow!(err))?;
            self.database = Database { engine };
        }

        self.info = self.info.from_env();
        self.coordinator = self.coordinator.from_env();
        self.payment = self.payment.from_env()?;
        self.notify = self.notify.from_env();
        self.logging = self.logging.from_env();

        Ok(self)
    }
}

impl Info {
    pub fn from_env(mut self) -> Self {
        if let Ok(host) = env::var(ENV_LISTEN_HOST) {
            self.listen_host = host;
        }

        if let Ok(port_str) = env::var(ENV_LISTEN_PORT) {
            if let Ok(port) = port_str.parse() {
                self.listen_port = port;
            }
        }

        if let Ok(callback_url) = env::var(ENV_CALLBACK_URL) {
            self.callback_url = callback_url;
        }

        if let Ok(timeout_str) = env::var(ENV_SUBSCRIBE_TIMEOUT) {
            if let Ok(timeout) = timeout_str.parse() {
                self.subscribe_timeout = timeout;
            }
        }

        self
    }
}

impl Coordinator {
    pub fn from_env(mut self) -> Self {
        if let Ok(channel) = env::var(ENV_PAYMENT_CHANNEL) {
            self.payment_channel = channel;
        }

        if let Ok(currency) = env::var(ENV_CURRENCY) {
            self.currency = currency;
        }

        if let Ok(network_id) = env::var(ENV_NETWORK_ID) {
            self.network_id = network_id;
        }

        if let Ok(region) = env::var(ENV_REGION) {
            self.region = region;
        }

        self
    }
}

impl Payment {
    pub fn from_env(mut self) -> Result<Self> {
        if let Ok(backend) = env::var(ENV_PAYMENT_BACKEND) {
            self.backend = PaymentBackend::from_str(&backend).map_err(|err| anyhow!(err))?;
        }

        match self.backend {
            PaymentBackend::Point => {
                self.point = Some(self.point.unwrap_or_default().from_env());
            }
            PaymentBackend::Fake => {
                self.fake_processor = Some(self.fake_processor.unwrap_or_default().from_env()?);
            }
        }

        Ok(self)
    }
}

impl Point {
    pub fn from_env(mut self) -> Self {
        if let Ok(api_url) = env::var(ENV_POINT_API_URL) {
            self.api_url = api_url;
        }

        if let Ok(app_key) = env::var(ENV_POINT_APP_KEY) {
            self.app_key = app_key;
        }

        self
    }
}

impl FakeProcessor {
    pub fn from_env(mut self) -> Result<Self> {
        if let Ok(delay_str) = env::var(ENV_FAKE_SETTLE_DELAY) {
            if let Ok(delay) = delay_str.parse() {
                self.settle_delay = delay;
            }
        }

        if let Ok(status) = env::var(ENV_FAKE_SETTLE_STATUS) {
            self.settle_status = match status.to_lowercase().as_str() {
                "" | "none" => None,
                status => Some(status.parse().map_err(|err: String| anyhow!(err))?),
            };
        }

        Ok(self)
    }
}

impl Notify {
    pub fn from_env(mut self) -> Self {
        if let Ok(gateway_url) = env::var(ENV_NOTIFY_GATEWAY_URL) {
            self.gateway_url = Some(gateway_url).filter(|url| !url.is_empty());
        }

        self
    }
}

impl LoggingConfig {
    pub fn from_env(mut self) -> Self {
        if let Ok(output_str) = env::var(ENV_LOGGING_OUTPUT) {
            if let Ok(output) = LoggingOutput::from_str(&output_str) {
                self.output = output;
            } else {
                tracing::warn!(
                    "Invalid logging output '{}' in environment variable. Valid options: stderr, file, both",
                    output_str
                );
            }
        }

        if let Ok(console_level) = env::var(ENV_LOGGING_CONSOLE_LEVEL) {
            self.console_level = console_level;
        }

        if let Ok(file_level) = env::var(ENV_LOGGING_FILE_LEVEL) {
            self.file_level = file_level;
        }

        self
    }
}
