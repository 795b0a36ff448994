//! Tolerant serialisation of chain-facing scalar types.
//!
//! Chain RPCs and blob payloads are inconsistent about numeric encoding:
//! amounts and sequence numbers arrive as JSON strings or as integers
//! depending on the producer. The types here accept both and always emit
//! strings, which survive every JSON implementation regardless of integer
//! width.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::AmountSpec;

#[cfg(test)]
mod tests;

/// An unsigned token amount.
///
/// Amounts are compared and summed as unsigned 128-bit integers; decimal
/// normalisation happens only inside the limit-price calculation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(pub u128);

/// A signed token amount, as reported by simulation balance changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignedAmount(pub i128);

impl From<u128> for Amount {
    fn from(v: u128) -> Self {
        Amount(v)
    }
}

impl From<i128> for SignedAmount {
    fn from(v: i128) -> Self {
        SignedAmount(v)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for SignedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl Serialize for SignedAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an unsigned integer or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
        Ok(Amount(v as u128))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
        Ok(Amount(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
        u128::try_from(v)
            .map(Amount)
            .map_err(|_| E::custom("negative value for unsigned amount"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
        v.parse::<u128>()
            .map(Amount)
            .map_err(|_| E::custom(format!("invalid amount string {v:?}")))
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}

struct SignedAmountVisitor;

impl<'de> Visitor<'de> for SignedAmountVisitor {
    type Value = SignedAmount;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an integer or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<SignedAmount, E> {
        Ok(SignedAmount(v as i128))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<SignedAmount, E> {
        Ok(SignedAmount(v as i128))
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> Result<SignedAmount, E> {
        Ok(SignedAmount(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<SignedAmount, E> {
        v.parse::<i128>()
            .map(SignedAmount)
            .map_err(|_| E::custom(format!("invalid signed amount string {v:?}")))
    }
}

impl<'de> Deserialize<'de> for SignedAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SignedAmountVisitor)
    }
}

impl Serialize for AmountSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AmountSpec::Exact(amount) => amount.serialize(serializer),
            AmountSpec::Range { min, max } => {
                use serde::ser::SerializeStruct;
                let mut s = serializer.serialize_struct("Range", 2)?;
                s.serialize_field("min", min)?;
                s.serialize_field("max", max)?;
                s.end()
            }
            AmountSpec::All => serializer.serialize_str("all"),
        }
    }
}

impl<'de> Deserialize<'de> for AmountSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match &value {
            serde_json::Value::String(s) if s.eq_ignore_ascii_case("all") => {
                return Ok(AmountSpec::All)
            }
            serde_json::Value::Object(map) => {
                let min = map
                    .get("min")
                    .ok_or_else(|| de::Error::missing_field("min"))?;
                let max = map
                    .get("max")
                    .ok_or_else(|| de::Error::missing_field("max"))?;
                return Ok(AmountSpec::Range {
                    min: Amount::deserialize(min).map_err(de::Error::custom)?,
                    max: Amount::deserialize(max).map_err(de::Error::custom)?,
                });
            }
            _ => {}
        }
        Amount::deserialize(&value)
            .map(AmountSpec::Exact)
            .map_err(de::Error::custom)
    }
}

struct U64Visitor;

impl<'de> Visitor<'de> for U64Visitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an unsigned integer or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
        u64::try_from(v).map_err(|_| E::custom("negative value for unsigned field"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
        v.parse::<u64>()
            .map_err(|_| E::custom(format!("invalid integer string {v:?}")))
    }
}

/// Deserialize a `u64` from either a JSON integer or a decimal string.
pub fn u64_from_int_or_str<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    deserializer.deserialize_any(U64Visitor)
}

/// Deserialize an optional `u64` from a JSON integer, a decimal string or
/// null.
pub fn opt_u64_from_int_or_str<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => u64_from_int_or_str(&v).map(Some).map_err(de::Error::custom),
    }
}
