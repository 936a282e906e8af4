use super::{
    Document, DocumentStore, LifecycleEvent, LifecycleFeed, Query, Subscription, VersionedCount,
};
use crate::core::{Collection, Result, StoreError};
use crate::counter::AggregateCount;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, Semaphore, mpsc};

struct DocumentListener {
    query: Query,
    sender: mpsc::UnboundedSender<Result<Vec<Document>>>,
}

struct CounterListener {
    collection: Collection,
    sender: mpsc::UnboundedSender<Result<AggregateCount>>,
}

#[derive(Default)]
struct StoreInner {
    documents: HashMap<Collection, HashMap<String, Document>>,
    counters: HashMap<Collection, VersionedCount>,
    document_listeners: Vec<DocumentListener>,
    counter_listeners: Vec<CounterListener>,
    lifecycle_taps: Vec<mpsc::UnboundedSender<LifecycleEvent>>,
    pending_query_failures: VecDeque<String>,
    pending_update_failures: VecDeque<String>,
}

impl StoreInner {
    fn run_query(&self, query: &Query) -> Vec<Document> {
        let Some(documents) = self.documents.get(&query.collection) else {
            return Vec::new();
        };

        let mut matching: Vec<&Document> = documents
            .values()
            .filter(|doc| query.matches(doc))
            .collect();
        matching.sort_by(|a, b| a.cursor().newest_first(&b.cursor()));

        matching
            .into_iter()
            .filter(|doc| {
                query
                    .start_after
                    .as_ref()
                    .is_none_or(|cursor| doc.cursor().is_after(cursor))
            })
            .take(query.limit)
            .cloned()
            .collect()
    }

    /// Pushes fresh result sets to listeners of `collection` and drops the
    /// ones whose receiver is gone.
    fn notify_documents(&mut self, collection: Collection) {
        let mut listeners = std::mem::take(&mut self.document_listeners);
        listeners.retain(|listener| {
            if listener.query.collection != collection {
                return !listener.sender.is_closed();
            }
            let snapshot = self.run_query(&listener.query);
            listener.sender.send(Ok(snapshot)).is_ok()
        });
        self.document_listeners = listeners;
    }

    fn notify_counter(&mut self, collection: Collection, count: &AggregateCount) {
        self.counter_listeners.retain(|listener| {
            if listener.collection != collection {
                return !listener.sender.is_closed();
            }
            listener.sender.send(Ok(count.clone())).is_ok()
        });
    }

    fn emit(&mut self, event: LifecycleEvent) {
        self.lifecycle_taps
            .retain(|tap| tap.send(event.clone()).is_ok());
    }

    fn collection_mut(&mut self, collection: Collection) -> &mut HashMap<String, Document> {
        self.documents.entry(collection).or_default()
    }
}

/// In-process document database with real-time subscriptions.
///
/// Besides the [`DocumentStore`] contract it exposes a few controls for
/// exercising failure paths: queued query failures, forced subscription
/// errors and a gate that holds range queries until released.
pub struct MemoryDocumentStore {
    inner: RwLock<StoreInner>,
    query_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            query_gate: Mutex::new(None),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Makes the next range query fail with a transport error.
    pub async fn fail_next_query(&self, message: impl Into<String>) {
        let mut inner = self.inner.write().await;
        inner.pending_query_failures.push_back(message.into());
    }

    /// Makes the next document update fail with a transport error.
    pub async fn fail_next_update(&self, message: impl Into<String>) {
        let mut inner = self.inner.write().await;
        inner.pending_update_failures.push_back(message.into());
    }

    /// Pushes an error to every live subscription on `collection` and closes
    /// them.
    pub async fn fail_subscriptions(&self, collection: Collection, message: &str) {
        let mut inner = self.inner.write().await;
        inner.document_listeners.retain(|listener| {
            if listener.query.collection != collection {
                return true;
            }
            let _ = listener
                .sender
                .send(Err(StoreError::Subscription(message.to_string())));
            false
        });
    }

    /// Blocks range queries until [`release_queries`](Self::release_queries).
    ///
    /// Subscription pushes are not affected.
    pub async fn hold_queries(&self) {
        *self.query_gate.lock().await = Some(Arc::new(Semaphore::new(0)));
    }

    pub async fn release_queries(&self) {
        if let Some(gate) = self.query_gate.lock().await.take() {
            gate.close();
        }
    }

    pub async fn document_count(&self, collection: Collection) -> usize {
        let inner = self.inner.read().await;
        inner.documents.get(&collection).map_or(0, HashMap::len)
    }

    /// Number of document subscriptions on `collection` still attached.
    pub async fn listener_count(&self, collection: Collection) -> usize {
        let inner = self.inner.read().await;
        inner
            .document_listeners
            .iter()
            .filter(|l| l.query.collection == collection && !l.sender.is_closed())
            .count()
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, collection: Collection, document: Document) -> Result<()> {
        let mut inner = self.inner.write().await;
        let documents = inner.collection_mut(collection);
        if documents.contains_key(&document.id) {
            return Err(StoreError::AlreadyExists(format!(
                "{}/{}",
                collection, document.id
            )));
        }
        documents.insert(document.id.clone(), document.clone());

        inner.notify_documents(collection);
        inner.emit(LifecycleEvent::Created {
            collection,
            document,
        });
        Ok(())
    }

    async fn update(&self, collection: Collection, document: Document) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(message) = inner.pending_update_failures.pop_front() {
            return Err(StoreError::Transport(message));
        }
        let documents = inner.collection_mut(collection);
        let Some(before) = documents.insert(document.id.clone(), document.clone()) else {
            documents.remove(&document.id);
            return Err(StoreError::NotFound(format!("{}/{}", collection, document.id)));
        };

        inner.notify_documents(collection);
        inner.emit(LifecycleEvent::Updated {
            collection,
            before,
            after: document,
        });
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let document = inner
            .collection_mut(collection)
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(format!("{collection}/{id}")))?;

        inner.notify_documents(collection);
        inner.emit(LifecycleEvent::Deleted {
            collection,
            document,
        });
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
        let inner = self.inner.read().await;
        Ok(inner
            .documents
            .get(&collection)
            .and_then(|documents| documents.get(id))
            .cloned())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        let gate = self.query_gate.lock().await.clone();
        if let Some(gate) = gate {
            // A closed gate means the queries were released.
            let _ = gate.acquire().await;
        }

        let mut inner = self.inner.write().await;
        if let Some(message) = inner.pending_query_failures.pop_front() {
            return Err(StoreError::Transport(message));
        }
        Ok(inner.run_query(query))
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription<Vec<Document>>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.inner.write().await;
        inner
            .document_listeners
            .push(DocumentListener { query, sender });
        Ok(Subscription::new(receiver))
    }

    async fn read_counter(&self, collection: Collection) -> Result<Option<VersionedCount>> {
        let inner = self.inner.read().await;
        Ok(inner.counters.get(&collection).cloned())
    }

    async fn write_counter(
        &self,
        collection: Collection,
        expected_version: Option<u64>,
        count: AggregateCount,
    ) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let current = inner.counters.get(&collection).map(|c| c.version);
        if current != expected_version {
            return Err(StoreError::Conflict(format!(
                "{}: expected version {:?}, found {:?}",
                collection.counter_document(),
                expected_version,
                current
            )));
        }

        let version = current.map_or(1, |v| v + 1);
        inner.counters.insert(
            collection,
            VersionedCount {
                version,
                count: count.clone(),
            },
        );
        inner.notify_counter(collection, &count);
        Ok(version)
    }

    async fn subscribe_counter(&self, collection: Collection) -> Result<Subscription<AggregateCount>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.inner.write().await;
        inner
            .counter_listeners
            .push(CounterListener { collection, sender });
        Ok(Subscription::new(receiver))
    }

    async fn lifecycle_events(&self) -> Result<LifecycleFeed> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.inner.write().await;
        inner.lifecycle_taps.push(sender);
        Ok(receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn doc(id: &str, secs: i64) -> Document {
        Document::new(id, Utc.timestamp_opt(secs, 0).unwrap(), json!({ "title": id }))
    }

    #[tokio::test]
    async fn test_query_orders_newest_first_with_cursor() {
        let store = MemoryDocumentStore::new();
        for (id, secs) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
            store.insert(Collection::Products, doc(id, secs)).await.unwrap();
        }

        let first = store
            .query(&Query::newest(Collection::Products, 2))
            .await
            .unwrap();
        let ids: Vec<_> = first.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "c"]);

        let next = store
            .query(&Query::newest(Collection::Products, 2).start_after(first[1].cursor()))
            .await
            .unwrap();
        let ids: Vec<_> = next.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = MemoryDocumentStore::new();
        store.insert(Collection::Users, doc("u1", 1)).await.unwrap();
        let err = store.insert(Collection::Users, doc("u1", 2)).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_update_missing_document_fails() {
        let store = MemoryDocumentStore::new();
        let err = store.update(Collection::Users, doc("ghost", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.document_count(Collection::Users).await, 0);
    }

    #[tokio::test]
    async fn test_counter_compare_and_swap() {
        let store = MemoryDocumentStore::new();
        let v1 = store
            .write_counter(Collection::Users, None, AggregateCount::default())
            .await
            .unwrap();
        assert_eq!(v1, 1);

        let stale = store
            .write_counter(Collection::Users, None, AggregateCount::default())
            .await;
        assert!(stale.unwrap_err().is_conflict());

        let v2 = store
            .write_counter(Collection::Users, Some(1), AggregateCount::default())
            .await
            .unwrap();
        assert_eq!(v2, 2);
    }

    #[tokio::test]
    async fn test_subscription_pushes_and_releases() {
        let store = MemoryDocumentStore::new();
        let mut sub = store
            .subscribe(Query::newest(Collection::Orders, 10))
            .await
            .unwrap();
        assert_eq!(store.listener_count(Collection::Orders).await, 1);

        store.insert(Collection::Orders, doc("o1", 1)).await.unwrap();
        let snapshot = sub.recv().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);

        sub.unsubscribe();
        store.insert(Collection::Orders, doc("o2", 2)).await.unwrap();
        assert_eq!(store.listener_count(Collection::Orders).await, 0);
    }

    #[tokio::test]
    async fn test_lifecycle_feed_carries_before_and_after() {
        let store = MemoryDocumentStore::new();
        let mut feed = store.lifecycle_events().await.unwrap();

        store.insert(Collection::Products, doc("p1", 1)).await.unwrap();
        let mut changed = doc("p1", 1);
        changed.data["title"] = json!("renamed");
        store.update(Collection::Products, changed).await.unwrap();
        store.delete(Collection::Products, "p1").await.unwrap();

        assert!(matches!(feed.recv().await, Some(LifecycleEvent::Created { .. })));
        match feed.recv().await {
            Some(LifecycleEvent::Updated { before, after, .. }) => {
                assert_eq!(before.label("title"), Some("p1"));
                assert_eq!(after.label("title"), Some("renamed"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(feed.recv().await, Some(LifecycleEvent::Deleted { .. })));
    }

    #[tokio::test]
    async fn test_queued_query_failure() {
        let store = MemoryDocumentStore::new();
        store.fail_next_query("unavailable").await;
        let err = store
            .query(&Query::newest(Collection::Users, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)));
        assert!(store.query(&Query::newest(Collection::Users, 5)).await.is_ok());
    }
}
