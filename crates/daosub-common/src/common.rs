//! Directory records shared by the coordinator and its collaborators

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Scale between a configured price and the charged amount
pub const PRICE_SCALE: u64 = 1000;

/// Price applied to communities that never configured one
pub const DEFAULT_PRICE: Price = Price(10_000);

/// Community identifier
#[derive(Debug, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommunityId(String);

impl CommunityId {
    /// Create new [`CommunityId`]
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Identifier as str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommunityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CommunityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Price error
#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    /// Not a non-negative integer
    #[error("Invalid price `{0}`")]
    Invalid(String),
}

/// Community price in milli-units
///
/// The charged amount is the price divided by [`PRICE_SCALE`].
#[derive(Debug, Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Price(u64);

impl Price {
    /// Create a new [`Price`] from milli-units
    pub const fn from_milli(milli: u64) -> Self {
        Self(milli)
    }

    /// Raw milli-units
    pub fn milli(&self) -> u64 {
        self.0
    }

    /// Amount charged to a subscriber
    pub fn charge_amount(&self) -> f64 {
        self.0 as f64 / PRICE_SCALE as f64
    }
}

impl From<u64> for Price {
    fn from(milli: u64) -> Self {
        Self(milli)
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(DEFAULT_PRICE);
        }
        trimmed
            .parse::<u64>()
            .map(Self)
            .map_err(|_| PriceError::Invalid(s.to_string()))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// The rest of the backend stores prices as decimal strings
impl Serialize for Price {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Num(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Str(s) => Price::from_str(&s).map_err(serde::de::Error::custom),
            Raw::Num(n) => Ok(Price(n)),
        }
    }
}

/// Community a user can subscribe to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    /// Community id
    pub id: CommunityId,
    /// Display name
    pub name: String,
    /// Address of the owner, receives the subscription payment
    pub owner: String,
    /// Subscription price
    #[serde(default = "default_price")]
    pub price: Price,
}

fn default_price() -> Price {
    DEFAULT_PRICE
}

/// User identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Identity id, used as push notification recipient
    pub id: String,
    /// Account address
    pub address: String,
    /// Nickname
    #[serde(default)]
    pub nickname: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_amount_is_scaled() {
        assert_eq!(Price::from_milli(10_000).charge_amount(), 10.0);
        assert_eq!(Price::from_milli(1_500).charge_amount(), 1.5);
    }

    #[test]
    fn empty_price_uses_default() {
        assert_eq!(Price::from_str("").unwrap(), DEFAULT_PRICE);
        assert!(Price::from_str("12a").is_err());
    }

    #[test]
    fn price_accepts_string_and_number() {
        let community: Community =
            serde_json::from_str(r#"{"id":"c1","name":"n","owner":"o","price":"2500"}"#).unwrap();
        assert_eq!(community.price, Price::from_milli(2500));

        let community: Community =
            serde_json::from_str(r#"{"id":"c1","name":"n","owner":"o","price":42}"#).unwrap();
        assert_eq!(community.price, Price::from_milli(42));

        let community: Community =
            serde_json::from_str(r#"{"id":"c1","name":"n","owner":"o"}"#).unwrap();
        assert_eq!(community.price, DEFAULT_PRICE);
    }
}
