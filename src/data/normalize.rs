//! Lenient field deserializers applied at the storage and API read boundary
//!
//! Restaurant and review records have been served in several shapes over
//! time: flags as strings, ids as numeric strings, timestamps as epoch
//! milliseconds or RFC 3339 text. These helpers fold every known shape into
//! the canonical types.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

fn as_u64<E: de::Error>(value: &Value, field: &str) -> Result<u64, E> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .ok_or_else(|| E::custom(format!("{} must be a non-negative integer", field))),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| E::custom(format!("{} is not a number: '{}'", field, s))),
        other => Err(E::custom(format!("{} has unexpected type: {}", field, other))),
    }
}

/// Restaurant ids: number or numeric string
pub fn restaurant_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let id = as_u64::<D::Error>(&value, "restaurant id")?;
    u32::try_from(id).map_err(|_| de::Error::custom("restaurant id out of range"))
}

/// Review ids: number, numeric string, or null for "not yet assigned"
pub fn review_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(0);
    }
    as_u64::<D::Error>(&value, "review id")
}

/// Ratings: number or numeric string
pub fn rating<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let rating = as_u64::<D::Error>(&value, "rating")?;
    u8::try_from(rating).map_err(|_| de::Error::custom("rating out of range"))
}

/// Flags: boolean, `"true"`/`"false"`, or null (false)
pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            _ => Err(de::Error::custom(format!("invalid flag value: '{}'", s))),
        },
        other => Err(de::Error::custom(format!("invalid flag value: {}", other))),
    }
}

/// Optional text that older records sometimes stored as a number
pub fn optional_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(de::Error::custom(format!("expected text, found {}", other))),
    }
}

/// Timestamps: epoch milliseconds, RFC 3339 text, or null
pub fn timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => {
            let millis = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| de::Error::custom("timestamp out of range"))?;
            Utc.timestamp_millis_opt(millis)
                .single()
                .map(Some)
                .ok_or_else(|| de::Error::custom("timestamp out of range"))
        }
        Value::String(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| de::Error::custom(format!("invalid timestamp '{}': {}", s, e))),
        other => Err(de::Error::custom(format!("invalid timestamp: {}", other))),
    }
}
