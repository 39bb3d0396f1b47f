//! Serde adapter for `Duration` config fields.
//!
//! Serializes as whole milliseconds. Deserializes either a bare integer
//! (milliseconds) or a suffixed string such as `"500ms"`, `"30s"`, `"2m"`.

use serde::{self, Deserialize, Deserializer, Serializer};
use std::time::Duration;

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    serializer.serialize_u64(ms)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
        Raw::Text(s) => parse_duration_str(&s).map_err(serde::de::Error::custom),
    }
}

pub fn parse_duration_str(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let parse = |val: &str| -> Result<u64, String> {
        val.trim()
            .parse()
            .map_err(|e| format!("invalid duration '{}': {}", s, e))
    };
    if let Some(val) = s.strip_suffix("ms") {
        Ok(Duration::from_millis(parse(val)?))
    } else if let Some(val) = s.strip_suffix('s') {
        Ok(Duration::from_secs(parse(val)?))
    } else if let Some(val) = s.strip_suffix('m') {
        Ok(Duration::from_secs(parse(val)? * 60))
    } else {
        Ok(Duration::from_millis(parse(s)?))
    }
}
