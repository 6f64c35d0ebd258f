//! Serialization helper for `Duration` as whole seconds.
//!
//! Use with `#[serde(with = "eirenyx_core::duration_secs")]`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Serialize a duration as its whole seconds.
///
/// # Errors
///
/// Propagates serializer errors.
pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    duration.as_secs().serialize(serializer)
}

/// Deserialize a duration from whole seconds.
///
/// # Errors
///
/// Fails when the value is not an unsigned integer.
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}
