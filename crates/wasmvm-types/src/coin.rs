use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// An amount of a single denomination.
///
/// Amounts are encoded as decimal strings on the wire so that values above
/// 2^53 survive JSON parsers that use floating point numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    #[serde(with = "amount_string")]
    pub amount: u128,
}

impl Coin {
    pub fn new(amount: u128, denom: impl Into<String>) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Shorthand for a single-coin vector.
pub fn coins(amount: u128, denom: impl Into<String>) -> Vec<Coin> {
    vec![Coin::new(amount, denom)]
}

mod amount_string {
    use super::*;

    pub fn serialize<S>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        amount.to_string().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<u128>()
            .map_err(|e| serde::de::Error::custom(format!("invalid amount '{}': {}", s, e)))
    }
}
