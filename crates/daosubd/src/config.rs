use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, File};
use daosub::{CoordinatorSettings, OrderStatus};
use daosub_common::notify::NotificationContext;
use daosub_common::payment::SUBSCRIPTION_CHANNEL;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Info {
    pub listen_host: String,
    pub listen_port: u16,
    /// Public base url the payment processor calls back on
    pub callback_url: String,
    /// Seconds a subscribe request waits for the payment to settle
    pub subscribe_timeout: u64,
}

impl Default for Info {
    fn default() -> Self {
        Self {
            listen_host: "127.0.0.1".to_string(),
            listen_port: 8085,
            callback_url: "http://127.0.0.1:8085".to_string(),
            subscribe_timeout: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coordinator {
    pub payment_channel: String,
    /// Currency name used in notification texts
    pub currency: String,
    pub network_id: String,
    pub region: String,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self {
            payment_channel: SUBSCRIPTION_CHANNEL.to_string(),
            currency: "FavT".to_string(),
            network_id: String::new(),
            region: String::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentBackend {
    #[default]
    Fake,
    Point,
}

impl std::str::FromStr for PaymentBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fake" | "fakeprocessor" => Ok(PaymentBackend::Fake),
            "point" => Ok(PaymentBackend::Point),
            _ => Err(format!("Unknown payment backend: {}", s)),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Default)]
pub struct Point {
    pub api_url: String,
    pub app_key: String,
}

impl std::fmt::Debug for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Point")
            .field("api_url", &self.api_url)
            .field("app_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FakeProcessor {
    /// Seconds before an initiated payment settles
    #[serde(default = "default_settle_delay")]
    pub settle_delay: u64,
    /// Status every payment settles with, `None` leaves payments submitted
    #[serde(default = "default_settle_status")]
    pub settle_status: Option<OrderStatus>,
}

fn default_settle_delay() -> u64 {
    3
}

fn default_settle_status() -> Option<OrderStatus> {
    Some(OrderStatus::Success)
}

impl Default for FakeProcessor {
    fn default() -> Self {
        Self {
            settle_delay: default_settle_delay(),
            settle_status: default_settle_status(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Payment {
    pub backend: PaymentBackend,
    pub point: Option<Point>,
    pub fake_processor: Option<FakeProcessor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Notify {
    /// Push gateway, notifications are only logged when unset
    pub gateway_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    Memory,
    #[default]
    Redb,
}

impl std::str::FromStr for DatabaseEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(DatabaseEngine::Memory),
            "redb" => Ok(DatabaseEngine::Redb),
            _ => Err(format!("Unknown database engine: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Database {
    pub engine: DatabaseEngine,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoggingOutput {
    Stderr,
    File,
    #[default]
    Both,
}

impl std::str::FromStr for LoggingOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stderr" => Ok(LoggingOutput::Stderr),
            "file" => Ok(LoggingOutput::File),
            "both" => Ok(LoggingOutput::Both),
            _ => Err(format!("Unknown logging output: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub output: LoggingOutput,
    pub console_level: String,
    pub file_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            output: LoggingOutput::default(),
            console_level: "info".to_string(),
            file_level: "debug".to_string(),
        }
    }
}

/// Daemon settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub info: Info,
    #[serde(default)]
    pub coordinator: Coordinator,
    #[serde(default)]
    pub payment: Payment,
    #[serde(default)]
    pub notify: Notify,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    #[must_use]
    pub fn new<P>(config_file_name: Option<P>) -> Self
    where
        P: Into<PathBuf>,
    {
        let default_settings = Self::default();
        // attempt to construct settings with file
        let from_file = Self::new_from_default(&default_settings, config_file_name);
        match from_file {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(
                    "Error reading config file, falling back to defaults. Error: {e:?}"
                );
                default_settings
            }
        }
    }

    fn new_from_default<P>(
        default: &Settings,
        config_file_name: Option<P>,
    ) -> Result<Self, ConfigError>
    where
        P: Into<PathBuf>,
    {
        let mut default_config_file_name = home::home_dir()
            .ok_or(ConfigError::NotFound("Config Path".to_string()))?
            .join(".daosubd");

        default_config_file_name.push("config.toml");
        let config: String = match config_file_name {
            Some(value) => value.into().to_string_lossy().to_string(),
            None => default_config_file_name.to_string_lossy().to_string(),
        };
        let builder = Config::builder();
        let config: Config = builder
            // use defaults
            .add_source(Config::try_from(default)?)
            // override with file contents
            .add_source(File::with_name(&config))
            .build()?;

        config.try_deserialize()
    }

    /// Check that the selected backends are usable
    pub fn validate(&self) -> Result<(), String> {
        if self.info.callback_url.is_empty() {
            return Err("info.callback_url must be set".to_string());
        }

        match self.payment.backend {
            PaymentBackend::Point => {
                let point = self
                    .payment
                    .point
                    .as_ref()
                    .ok_or("Point backend requires a [payment.point] section")?;
                if point.api_url.is_empty() {
                    return Err("payment.point.api_url must be set".to_string());
                }
            }
            PaymentBackend::Fake => {
                if cfg!(not(feature = "fake-processor")) {
                    return Err("daosubd was built without the fake-processor feature".to_string());
                }
            }
        }

        if self.database.engine == DatabaseEngine::Redb && cfg!(not(feature = "redb")) {
            return Err("daosubd was built without the redb feature".to_string());
        }

        Ok(())
    }

    /// Settings handed to the coordinator builder
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            callback_url: self.info.callback_url.clone(),
            payment_channel: self.coordinator.payment_channel.clone(),
            notification: NotificationContext {
                network_id: self.coordinator.network_id.clone(),
                region: self.coordinator.region.clone(),
                currency: self.coordinator.currency.clone(),
            },
        }
    }

    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_secs(self.info.subscribe_timeout)
    }
}
