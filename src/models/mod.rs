pub mod circuit_breaker;
pub mod fcm;
pub mod health;
pub mod job;
pub mod notification;
pub mod response;
pub mod retry;
pub mod status;
pub mod template;
pub mod user;

use serde::{Deserialize, Deserializer};

/// Reads an explicit `null` as the field's default, like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
