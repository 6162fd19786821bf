//! Fake Processor Error

use thiserror::Error;

/// Fake Processor Error
#[derive(Debug, Error)]
pub enum Error {
    /// Configured to refuse payments
    #[error("Payment refused by fake processor")]
    PaymentRefused,
    /// Configured to refuse notifications
    #[error("Notification refused by fake notifier")]
    NotificationRefused,
    /// No channel receiver
    #[error("No channel receiver")]
    NoReceiver,
    /// Serde Error
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl From<Error> for daosub_common::payment::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::PaymentRefused => Self::Rejected(e.to_string()),
            e => Self::Transport(Box::new(e)),
        }
    }
}

impl From<Error> for daosub_common::notify::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::NotificationRefused => Self::Rejected(e.to_string()),
            e => Self::Transport(Box::new(e)),
        }
    }
}
