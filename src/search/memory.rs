use super::{SearchHit, SearchIndex, encode_timestamps};
use crate::core::{Collection, Result, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

#[derive(Default)]
struct IndexInner {
    records: HashMap<Collection, Vec<(String, Value)>>,
    pending_failures: VecDeque<String>,
}

/// In-process search index.
///
/// A record matches when every whitespace-separated term of the query
/// occurs, case-insensitively, in one of its string fields. Records with
/// more matching fields rank first; ties keep insertion order.
pub struct MemorySearchIndex {
    inner: RwLock<IndexInner>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(IndexInner::default()),
        }
    }

    /// Makes the next search fail with a transport error.
    pub async fn fail_next_search(&self, message: impl Into<String>) {
        self.inner
            .write()
            .await
            .pending_failures
            .push_back(message.into());
    }

    pub async fn record_count(&self, collection: Collection) -> usize {
        let inner = self.inner.read().await;
        inner.records.get(&collection).map_or(0, Vec::len)
    }

    /// Stored copy of one record, as the index serialized it.
    pub async fn record(&self, collection: Collection, id: &str) -> Option<Value> {
        let inner = self.inner.read().await;
        inner
            .records
            .get(&collection)?
            .iter()
            .find(|(object_id, _)| object_id == id)
            .map(|(_, fields)| fields.clone())
    }
}

impl Default for MemorySearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, out)),
        Value::Object(map) => map.values().for_each(|field| collect_strings(field, out)),
        _ => {}
    }
}

fn score(fields: &Value, terms: &[String]) -> Option<usize> {
    let mut strings = Vec::new();
    collect_strings(fields, &mut strings);
    let lowered: Vec<String> = strings.iter().map(|s| s.to_lowercase()).collect();

    let all_terms_match = terms
        .iter()
        .all(|term| lowered.iter().any(|s| s.contains(term.as_str())));
    if !all_terms_match {
        return None;
    }

    Some(
        lowered
            .iter()
            .filter(|s| terms.iter().any(|term| s.contains(term.as_str())))
            .count(),
    )
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn upsert(&self, collection: Collection, id: &str, mut fields: Value) -> Result<()> {
        encode_timestamps(&mut fields);
        if let Value::Object(map) = &mut fields {
            map.remove("id");
        }

        let mut inner = self.inner.write().await;
        let records = inner.records.entry(collection).or_default();
        match records.iter_mut().find(|(object_id, _)| object_id == id) {
            Some((_, existing)) => *existing = fields,
            None => records.push((id.to_string(), fields)),
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(records) = inner.records.get_mut(&collection) {
            records.retain(|(object_id, _)| object_id != id);
        }
        Ok(())
    }

    async fn search(&self, collection: Collection, query: &str) -> Result<Vec<SearchHit>> {
        let mut inner = self.inner.write().await;
        if let Some(message) = inner.pending_failures.pop_front() {
            return Err(StoreError::Transport(message));
        }

        let terms: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        let mut ranked: Vec<(usize, SearchHit)> = inner
            .records
            .get(&collection)
            .into_iter()
            .flatten()
            .filter_map(|(object_id, fields)| {
                score(fields, &terms).map(|score| {
                    (
                        score,
                        SearchHit {
                            object_id: object_id.clone(),
                            fields: fields.clone(),
                        },
                    )
                })
            })
            .collect();
        // Stable sort keeps insertion order among equal scores.
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(ranked.into_iter().map(|(_, hit)| hit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_upsert_replaces_and_encodes() {
        let index = MemorySearchIndex::new();
        index
            .upsert(
                Collection::Products,
                "p1",
                json!({ "id": "p1", "title": "Red scarf", "createdAt": "2021-03-01T09:00:00Z" }),
            )
            .await
            .unwrap();
        index
            .upsert(
                Collection::Products,
                "p1",
                json!({ "title": "Blue scarf", "createdAt": "2021-03-01T09:00:00Z" }),
            )
            .await
            .unwrap();

        assert_eq!(index.record_count(Collection::Products).await, 1);
        let stored = index.record(Collection::Products, "p1").await.unwrap();
        assert_eq!(stored["title"], json!("Blue scarf"));
        assert!(stored["createdAt"]["_seconds"].is_i64());
        assert!(stored.get("id").is_none());
    }

    #[tokio::test]
    async fn test_search_matches_all_terms() {
        let index = MemorySearchIndex::new();
        for (id, title) in [("p1", "Leather watch"), ("p2", "Leather shoes"), ("p3", "Canvas shoes")] {
            index
                .upsert(Collection::Products, id, json!({ "title": title }))
                .await
                .unwrap();
        }

        let hits = index.search(Collection::Products, "leather SHOES").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].object_id, "p2");

        let all = index.search(Collection::Products, "").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_and_failure() {
        let index = MemorySearchIndex::new();
        index
            .upsert(Collection::Orders, "o1", json!({ "user": { "name": "Kim" } }))
            .await
            .unwrap();
        index.delete(Collection::Orders, "o1").await.unwrap();
        assert_eq!(index.record_count(Collection::Orders).await, 0);

        index.fail_next_search("index offline").await;
        let err = index.search(Collection::Orders, "kim").await.unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)));
    }
}
