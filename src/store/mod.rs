//! Contract of the hosted document database.
//!
//! The counter service and the live lists only see the database through
//! [`DocumentStore`]: ordered range queries with a start-after cursor, point
//! lookups, real-time query subscriptions, versioned counter documents
//! written with compare-and-swap, and the lifecycle feed that fires on every
//! document write. [`MemoryDocumentStore`] implements it in process.

use crate::context::Scope;
use crate::core::{Collection, Cursor, ListEntity, Result, StoreError};
use crate::counter::AggregateCount;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use uuid::Uuid;

pub mod memory;

pub use memory::MemoryDocumentStore;

/// A stored document. `data` holds the full entity, `id` and `createdAt`
/// included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub data: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>, mut data: Value) -> Self {
        let id = id.into();
        if let Value::Object(fields) = &mut data {
            fields.insert("id".to_string(), Value::String(id.clone()));
            fields.insert(
                "createdAt".to_string(),
                Value::String(created_at.to_rfc3339()),
            );
        }
        Self {
            id,
            created_at,
            data,
        }
    }

    /// Document under a freshly generated id, as the database assigns when
    /// a write names none.
    pub fn with_generated_id(created_at: DateTime<Utc>, data: Value) -> Self {
        Self::new(generate_id(), created_at, data)
    }

    pub fn from_entity<T>(entity: &T) -> Result<Self>
    where
        T: ListEntity + Serialize,
    {
        let data = serde_json::to_value(entity)?;
        Ok(Self::new(entity.id(), entity.created_at(), data))
    }

    /// Builds a document from raw fields, taking `createdAt` from the fields
    /// when present and stamping the current time otherwise.
    pub fn from_json(id: impl Into<String>, data: Value) -> Result<Self> {
        let created_at = match data.get("createdAt").and_then(Value::as_str) {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map_err(|e| StoreError::InvalidTimestamp(format!("{raw}: {e}")))?
                .with_timezone(&Utc),
            None => Utc::now(),
        };
        Ok(Self::new(id, created_at, data))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    /// Looks up a field by JSON pointer, e.g. `/user/id`.
    pub fn field(&self, pointer: &str) -> Option<&Value> {
        self.data.pointer(pointer)
    }

    /// String value of a top-level field.
    pub fn label(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.created_at, self.id.clone())
    }
}

pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Equality filter on one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub pointer: String,
    pub value: Value,
}

/// Bounded query ordered by creation time, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: Collection,
    pub filter: Option<FieldFilter>,
    pub limit: usize,
    pub start_after: Option<Cursor>,
}

impl Query {
    pub fn newest(collection: Collection, limit: usize) -> Self {
        Self {
            collection,
            filter: None,
            limit,
            start_after: None,
        }
    }

    /// Query for what `scope` may see, or `None` when nothing is visible.
    pub fn for_scope(collection: Collection, scope: &Scope, limit: usize) -> Option<Self> {
        match scope {
            Scope::All => Some(Self::newest(collection, limit)),
            Scope::Owner(user_id) => {
                let pointer = match collection {
                    Collection::Orders => "/user/id",
                    Collection::Users => "/id",
                    Collection::Products => "/creator",
                };
                Some(Self::newest(collection, limit).filter(pointer, Value::String(user_id.clone())))
            }
            Scope::Nothing => None,
        }
    }

    pub fn filter(mut self, pointer: impl Into<String>, value: Value) -> Self {
        self.filter = Some(FieldFilter {
            pointer: pointer.into(),
            value,
        });
        self
    }

    pub fn start_after(mut self, cursor: Cursor) -> Self {
        self.start_after = Some(cursor);
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        match &self.filter {
            Some(filter) => document.field(&filter.pointer) == Some(&filter.value),
            None => true,
        }
    }
}

/// A write observed on a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum LifecycleEvent {
    Created {
        collection: Collection,
        document: Document,
    },
    Updated {
        collection: Collection,
        before: Document,
        after: Document,
    },
    Deleted {
        collection: Collection,
        document: Document,
    },
}

impl LifecycleEvent {
    pub fn collection(&self) -> Collection {
        match self {
            LifecycleEvent::Created { collection, .. }
            | LifecycleEvent::Updated { collection, .. }
            | LifecycleEvent::Deleted { collection, .. } => *collection,
        }
    }
}

pub type LifecycleFeed = mpsc::UnboundedReceiver<LifecycleEvent>;

/// Aggregate count together with the version used for conditional writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedCount {
    pub version: u64,
    pub count: AggregateCount,
}

/// Live feed of values pushed by the store.
///
/// Dropping the subscription or calling [`Subscription::unsubscribe`]
/// releases the listener on the store side.
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<Result<T>>,
}

impl<T> Subscription<T> {
    pub fn new(receiver: mpsc::UnboundedReceiver<Result<T>>) -> Self {
        Self { receiver }
    }

    /// Next pushed value; `None` once the store closed the feed.
    pub async fn recv(&mut self) -> Option<Result<T>> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.receiver.close();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, collection: Collection, document: Document) -> Result<()>;

    /// Replaces an existing document.
    async fn update(&self, collection: Collection, document: Document) -> Result<()>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<()>;

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Emits the full result set of `query` on every change to its
    /// collection.
    async fn subscribe(&self, query: Query) -> Result<Subscription<Vec<Document>>>;

    async fn read_counter(&self, collection: Collection) -> Result<Option<VersionedCount>>;

    /// Writes the counter only if its version still equals
    /// `expected_version` (`None` = document absent). Returns the new version.
    async fn write_counter(
        &self,
        collection: Collection,
        expected_version: Option<u64>,
        count: AggregateCount,
    ) -> Result<u64>;

    /// Emits the counter document on every write.
    async fn subscribe_counter(&self, collection: Collection) -> Result<Subscription<AggregateCount>>;

    /// Feed of create/update/delete events across all collections.
    async fn lifecycle_events(&self) -> Result<LifecycleFeed>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_document_stamps_identity() {
        let at = Utc.with_ymd_and_hms(2021, 5, 4, 12, 0, 0).unwrap();
        let doc = Document::new("o1", at, json!({ "amount": 12.0 }));
        assert_eq!(doc.label("id"), Some("o1"));
        assert_eq!(doc.data["createdAt"], json!(at.to_rfc3339()));
    }

    #[test]
    fn test_from_json_reads_created_at() {
        let doc = Document::from_json(
            "u1",
            json!({ "username": "ann", "createdAt": "2021-01-02T03:04:05Z" }),
        )
        .unwrap();
        assert_eq!(doc.created_at, Utc.with_ymd_and_hms(2021, 1, 2, 3, 4, 5).unwrap());

        let bad = Document::from_json("u2", json!({ "createdAt": "yesterday" }));
        assert!(matches!(bad, Err(StoreError::InvalidTimestamp(_))));
    }

    #[test]
    fn test_owner_scope_filters_nested_field() {
        let query =
            Query::for_scope(Collection::Orders, &Scope::Owner("c1".into()), 20).unwrap();
        let at = Utc.timestamp_opt(10, 0).unwrap();
        let mine = Document::new("o1", at, json!({ "user": { "id": "c1", "name": "C" } }));
        let theirs = Document::new("o2", at, json!({ "user": { "id": "c2", "name": "D" } }));
        assert!(query.matches(&mine));
        assert!(!query.matches(&theirs));
        assert!(Query::for_scope(Collection::Orders, &Scope::Nothing, 20).is_none());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let at = Utc.timestamp_opt(10, 0).unwrap();
        let a = Document::with_generated_id(at, json!({}));
        let b = Document::with_generated_id(at, json!({}));
        assert_ne!(a.id, b.id);
        assert_eq!(a.label("id"), Some(a.id.as_str()));
    }

    #[test]
    fn test_subscription_stream_waits_for_push() {
        use futures::StreamExt;
        use tokio_test::{assert_pending, assert_ready, task};

        let (sender, receiver) = mpsc::unbounded_channel();
        let mut subscription: Subscription<u64> = Subscription::new(receiver);

        let mut next = task::spawn(subscription.next());
        assert_pending!(next.poll());

        sender.send(Ok(7)).unwrap();
        assert!(next.is_woken());
        let pushed = assert_ready!(next.poll());
        assert_eq!(pushed.map(|r| r.unwrap()), Some(7));
    }
}
