//! Errors

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::common::CommunityId;
use crate::order::{OrderId, OrderStatus, StateError};
use crate::{database, notify, payment, pub_sub};

/// Coordinator Error
#[derive(Debug, Error)]
pub enum Error {
    /// Community is not known
    #[error("Community not found: `{0}`")]
    CommunityNotFound(CommunityId),
    /// Identity is not known
    #[error("Identity not found: `{0}`")]
    IdentityNotFound(String),
    /// Order lookup failed
    #[error("Order lookup failed: {0}")]
    OrderLookupFailed(#[source] database::Error),
    /// Pair already has an open order
    #[error("An open order already exists for this subscriber and community")]
    DuplicateOrder,
    /// Order is not known
    #[error("Unknown order `{0}`")]
    UnknownOrder(OrderId),
    /// Payment processor refused or failed to start the payment
    #[error("Payment initiation failed: {0}")]
    PaymentInitiationFailed(#[source] payment::Error),
    /// Caller cancelled while waiting for completion
    #[error("Subscription wait cancelled")]
    Cancelled,
    /// Identity lookup failed while dispatching notifications
    #[error("Identity lookup failed for `{0}`")]
    IdentityLookupFailed(String),
    /// Notification channel closed before a completion was delivered
    #[error("Notification channel closed before completion")]
    NotificationChannelClosed,
    /// Completion reported with a non terminal status
    #[error("Completion must carry a terminal status, got {0}")]
    NonTerminalCompletion(OrderStatus),
    /// Invalid state transition
    #[error(transparent)]
    State(#[from] StateError),
    /// Database Error
    #[error(transparent)]
    Database(database::Error),
    /// Notification Error
    #[error(transparent)]
    Notify(#[from] notify::Error),
    /// Pubsub Error
    #[error(transparent)]
    PubSub(#[from] pub_sub::Error),
    /// Custom Error
    #[error("`{0}`")]
    Custom(String),
}

impl From<database::Error> for Error {
    fn from(err: database::Error) -> Self {
        match err {
            database::Error::DuplicateOrder => Error::DuplicateOrder,
            database::Error::UnknownOrder(id) => Error::UnknownOrder(id),
            database::Error::InvalidStateTransition(state) => Error::State(state),
            err => Error::Database(err),
        }
    }
}

impl From<payment::Error> for Error {
    fn from(err: payment::Error) -> Self {
        Error::PaymentInitiationFailed(err)
    }
}

/// Error Response
///
/// Body returned by the HTTP surface on failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error Code
    pub code: ErrorCode,
    /// Human readable description
    #[serde(default)]
    pub detail: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code: {}, detail: {}", self.code, self.detail)
    }
}

impl ErrorResponse {
    /// Create new [`ErrorResponse`]
    pub fn new(code: ErrorCode, detail: String) -> Self {
        Self { code, detail }
    }

    /// Error response from json
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(json)?;

        Self::from_value(value)
    }

    /// Error response from json Value
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match serde_json::from_value::<ErrorResponse>(value.clone()) {
            Ok(res) => Ok(res),
            Err(_) => Ok(Self {
                code: ErrorCode::Unknown(999),
                detail: value.to_string(),
            }),
        }
    }
}

impl From<Error> for ErrorResponse {
    fn from(err: Error) -> ErrorResponse {
        let code = match &err {
            Error::CommunityNotFound(_) => ErrorCode::CommunityNotFound,
            Error::IdentityNotFound(_) | Error::IdentityLookupFailed(_) => {
                ErrorCode::IdentityNotFound
            }
            Error::UnknownOrder(_) => ErrorCode::OrderNotFound,
            Error::DuplicateOrder => ErrorCode::DuplicateOrder,
            Error::State(StateError::TxIdMismatch { .. }) => ErrorCode::TxIdMismatch,
            Error::State(_) => ErrorCode::InvalidTransition,
            Error::NonTerminalCompletion(_) => ErrorCode::NonTerminalCompletion,
            Error::PaymentInitiationFailed(_) => ErrorCode::PaymentInitiationFailed,
            Error::Cancelled => ErrorCode::Cancelled,
            _ => ErrorCode::Internal,
        };

        ErrorResponse {
            code,
            detail: err.to_string(),
        }
    }
}

/// Possible Error Codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // 20xxx - Lookup errors
    /// Community not found (20001)
    CommunityNotFound,
    /// Identity not found (20002)
    IdentityNotFound,
    /// Order not found (20003)
    OrderNotFound,

    // 21xxx - Order state errors
    /// Open order already exists (21001)
    DuplicateOrder,
    /// Invalid status transition (21002)
    InvalidTransition,
    /// Transaction id can not be reassigned (21003)
    TxIdMismatch,
    /// Completion without terminal status (21004)
    NonTerminalCompletion,

    // 22xxx - Payment errors
    /// Payment initiation failed (22001)
    PaymentInitiationFailed,

    // 23xxx - Wait errors
    /// Wait cancelled (23001)
    Cancelled,

    /// Internal error (29999)
    Internal,
    /// Unknown error code
    Unknown(u16),
}

impl ErrorCode {
    /// Error code from u16
    pub fn from_code(code: u16) -> Self {
        match code {
            20001 => Self::CommunityNotFound,
            20002 => Self::IdentityNotFound,
            20003 => Self::OrderNotFound,
            21001 => Self::DuplicateOrder,
            21002 => Self::InvalidTransition,
            21003 => Self::TxIdMismatch,
            21004 => Self::NonTerminalCompletion,
            22001 => Self::PaymentInitiationFailed,
            23001 => Self::Cancelled,
            29999 => Self::Internal,
            _ => Self::Unknown(code),
        }
    }

    /// Error code to u16
    pub fn to_code(&self) -> u16 {
        match self {
            Self::CommunityNotFound => 20001,
            Self::IdentityNotFound => 20002,
            Self::OrderNotFound => 20003,
            Self::DuplicateOrder => 21001,
            Self::InvalidTransition => 21002,
            Self::TxIdMismatch => 21003,
            Self::NonTerminalCompletion => 21004,
            Self::PaymentInitiationFailed => 22001,
            Self::Cancelled => 23001,
            Self::Internal => 29999,
            Self::Unknown(code) => *code,
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u16(self.to_code())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = u16::deserialize(deserializer)?;

        Ok(ErrorCode::from_code(code))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_codes() {
        let response: ErrorResponse = Error::Cancelled.into();
        assert_eq!(response.code, ErrorCode::Cancelled);

        let response: ErrorResponse = Error::from(database::Error::DuplicateOrder).into();
        assert_eq!(response.code, ErrorCode::DuplicateOrder);

        let response: ErrorResponse = Error::State(StateError::TxIdMismatch {
            current: "a".to_string(),
            proposed: "b".to_string(),
        })
        .into();
        assert_eq!(response.code, ErrorCode::TxIdMismatch);
    }

    #[test]
    fn error_response_json() {
        let json = r#"{"code":21001,"detail":"duplicate"}"#;
        let response = ErrorResponse::from_json(json).unwrap();
        assert_eq!(response.code, ErrorCode::DuplicateOrder);

        let response = ErrorResponse::from_json(r#"{"message":"nope"}"#).unwrap();
        assert_eq!(response.code, ErrorCode::Unknown(999));
    }
}
