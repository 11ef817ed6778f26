//! Custom serde serialization for time types
//!
//! Configuration files express durations as integer milliseconds, which
//! `std::time::Duration` does not support out of the box.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Serialize a Duration as whole milliseconds
pub fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    u64::try_from(duration.as_millis())
        .map_err(serde::ser::Error::custom)?
        .serialize(serializer)
}

/// Deserialize a Duration from whole milliseconds
pub fn deserialize_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Duration::from_millis(u64::deserialize(deserializer)?))
}

/// `#[serde(with = "duration_millis")]` adapter
pub mod duration_millis {
    pub use super::deserialize_millis as deserialize;
    pub use super::serialize_millis as serialize;
}
