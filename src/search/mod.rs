//! Contract of the hosted full-text search index.
//!
//! The index keeps its own denormalized copy of every document. Timestamps
//! come back as `{ "_seconds", "_nanoseconds" }` objects and must be turned
//! back into native timestamps before hits can be shown next to documents
//! loaded from the store.

use crate::core::{Collection, ListEntity, Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::warn;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

pub mod memory;

pub use memory::MemorySearchIndex;

/// Fields holding timestamps, at any nesting depth.
pub const TIMESTAMP_FIELDS: [&str; 2] = ["createdAt", "updatedAt"];

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn upsert(&self, collection: Collection, id: &str, fields: Value) -> Result<()>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<()>;

    /// Ranked hits for `query`.
    async fn search(&self, collection: Collection, query: &str) -> Result<Vec<SearchHit>>;
}

/// One ranked result as returned by the index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub object_id: String,
    pub fields: Value,
}

impl SearchHit {
    /// Rebuilds the entity, restoring native timestamps and the id.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let mut fields = self.fields.clone();
        decode_timestamps(&mut fields)?;
        if let Value::Object(map) = &mut fields {
            map.insert("id".to_string(), Value::String(self.object_id.clone()));
        }
        Ok(serde_json::from_value(fields)?)
    }
}

/// Runs `query` against the entity's collection and decodes the hits.
///
/// Hits that fail to decode are dropped; the rest of the result set is kept.
pub async fn search_entities<T, I>(index: &I, query: &str) -> Result<Vec<T>>
where
    T: ListEntity + DeserializeOwned,
    I: SearchIndex + ?Sized,
{
    let hits = index.search(T::COLLECTION, query).await?;
    Ok(reconstitute(hits))
}

pub fn reconstitute<T: DeserializeOwned>(hits: Vec<SearchHit>) -> Vec<T> {
    hits.into_iter()
        .filter_map(|hit| match hit.decode::<T>() {
            Ok(entity) => Some(entity),
            Err(err) => {
                warn!("dropping search hit '{}': {}", hit.object_id, err);
                None
            }
        })
        .collect()
}

pub fn to_search_timestamp(at: &DateTime<Utc>) -> Value {
    json!({
        "_seconds": at.timestamp(),
        "_nanoseconds": at.timestamp_subsec_nanos(),
    })
}

pub fn from_search_timestamp(value: &Value) -> Result<DateTime<Utc>> {
    let seconds = value
        .get("_seconds")
        .and_then(Value::as_i64)
        .ok_or_else(|| StoreError::InvalidTimestamp(format!("missing _seconds in {value}")))?;
    let nanos = match value.get("_nanoseconds") {
        None => 0,
        Some(raw) => raw
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| StoreError::InvalidTimestamp(format!("bad _nanoseconds in {value}")))?,
    };

    Utc.timestamp_opt(seconds, nanos)
        .single()
        .ok_or_else(|| StoreError::InvalidTimestamp(format!("out of range: {value}")))
}

/// Rewrites RFC 3339 timestamp strings into the index's epoch form.
pub fn encode_timestamps(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if TIMESTAMP_FIELDS.contains(&key.as_str()) {
                    if let Some(at) = field
                        .as_str()
                        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                    {
                        *field = to_search_timestamp(&at.with_timezone(&Utc));
                        continue;
                    }
                }
                encode_timestamps(field);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(encode_timestamps),
        _ => {}
    }
}

/// Inverse of [`encode_timestamps`]; fails on the first malformed value.
pub fn decode_timestamps(value: &mut Value) -> Result<()> {
    match value {
        Value::Object(map) => decode_object(map),
        Value::Array(items) => items.iter_mut().try_for_each(decode_timestamps),
        _ => Ok(()),
    }
}

fn decode_object(map: &mut Map<String, Value>) -> Result<()> {
    for (key, field) in map.iter_mut() {
        if TIMESTAMP_FIELDS.contains(&key.as_str()) && field.is_object() {
            let at = from_search_timestamp(field)?;
            *field = Value::String(at.to_rfc3339());
        } else {
            decode_timestamps(field)?;
        }
    }
    Ok(())
}
