// src/store/mod.rs
pub mod file;

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::model::Watermark;

pub use self::file::FileWatermarkStore;

/// Logical name of the single watermark a deployment keeps.
pub const LAST_SEEN_KEY: &str = "last_seen_pub_timestamp";

/// Durable scalar marker, one value per key.
///
/// `get` on a never-written key reports `Watermark::absent()`, not an error.
/// `set` is a single atomic write.
#[async_trait::async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Watermark>;
    async fn set(&self, key: &str, timestamp: DateTime<Utc>) -> Result<()>;
}

/// Decode a stored value. Accepts unix seconds (int or float) and RFC 3339 strings.
pub fn decode_watermark(value: Option<&Value>) -> Result<Watermark> {
    let ts = match value {
        None | Some(Value::Null) => return Ok(Watermark::absent()),
        Some(Value::Number(n)) => {
            let secs = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .ok_or_else(|| anyhow!("watermark number out of range: {n}"))?;
            DateTime::<Utc>::from_timestamp(secs, 0)
                .ok_or_else(|| anyhow!("watermark timestamp out of range: {secs}"))?
        }
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .map_err(|e| anyhow!("invalid watermark string {s:?}: {e}"))?
            .with_timezone(&Utc),
        Some(other) => bail!("unexpected type for watermark: {}", json_type(other)),
    };
    Ok(Watermark::at(ts))
}

pub fn encode_watermark(timestamp: DateTime<Utc>) -> Value {
    Value::String(timestamp.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true))
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Process-local store for dry runs and tests. Never moves a key backward.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    inner: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, timestamp: DateTime<Utc>) -> Self {
        let store = Self::new();
        if let Ok(mut m) = store.inner.lock() {
            m.insert(key.to_string(), timestamp);
        }
        store
    }
}

#[async_trait::async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn get(&self, key: &str) -> Result<Watermark> {
        let m = self
            .inner
            .lock()
            .map_err(|_| anyhow!("memory store mutex poisoned"))?;
        Ok(m.get(key).copied().map_or_else(Watermark::absent, Watermark::at))
    }

    async fn set(&self, key: &str, timestamp: DateTime<Utc>) -> Result<()> {
        let mut m = self
            .inner
            .lock()
            .map_err(|_| anyhow!("memory store mutex poisoned"))?;
        let slot = m.entry(key.to_string()).or_insert(timestamp);
        if timestamp > *slot {
            *slot = timestamp;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn missing_and_null_values_are_absent() {
        assert_eq!(decode_watermark(None).unwrap(), Watermark::absent());
        assert_eq!(decode_watermark(Some(&Value::Null)).unwrap(), Watermark::absent());
    }

    #[test]
    fn numeric_values_are_unix_seconds() {
        let want = Watermark::at(Utc.timestamp_opt(1_234_567_890, 0).unwrap());
        assert_eq!(decode_watermark(Some(&json!(1_234_567_890))).unwrap(), want);
        assert_eq!(decode_watermark(Some(&json!(1_234_567_890.0))).unwrap(), want);
    }

    #[test]
    fn string_values_are_rfc3339() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 18, 12, 0, 0).unwrap();
        let encoded = encode_watermark(ts);
        assert_eq!(encoded, json!("2026-02-18T12:00:00Z"));
        assert_eq!(decode_watermark(Some(&encoded)).unwrap(), Watermark::at(ts));
    }

    #[test]
    fn other_types_are_rejected() {
        let err = decode_watermark(Some(&json!(true))).unwrap_err();
        assert!(err.to_string().contains("unexpected type for watermark"));
        assert!(decode_watermark(Some(&json!("invalid"))).is_err());
    }

    #[tokio::test]
    async fn memory_store_keeps_the_maximum() {
        let store = MemoryWatermarkStore::new();
        assert!(!store.get(LAST_SEEN_KEY).await.unwrap().present);

        let t20 = Utc.timestamp_opt(20, 0).unwrap();
        let t10 = Utc.timestamp_opt(10, 0).unwrap();
        store.set(LAST_SEEN_KEY, t20).await.unwrap();
        store.set(LAST_SEEN_KEY, t10).await.unwrap();
        assert_eq!(store.get(LAST_SEEN_KEY).await.unwrap(), Watermark::at(t20));
    }
}
