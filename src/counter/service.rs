use super::AggregateCount;
use crate::config::CounterRetryPolicy;
use crate::core::{Collection, Result};
use crate::search::SearchIndex;
use crate::store::{Document, DocumentStore, LifecycleEvent, LifecycleFeed, VersionedCount};
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Keeps aggregate-count documents in step with collection writes and
/// mirrors every write into the search index.
///
/// Counter writes are compare-and-swap on the counter document's version
/// and are retried on conflict according to [`CounterRetryPolicy`].
pub struct CounterService<S: ?Sized, I: ?Sized> {
    store: Arc<S>,
    search: Arc<I>,
    retry: CounterRetryPolicy,
}

fn category_of(collection: Collection, document: &Document) -> Option<String> {
    collection
        .category_field()
        .and_then(|field| document.label(field))
        .map(str::to_string)
}

impl<S, I> CounterService<S, I>
where
    S: DocumentStore + ?Sized + 'static,
    I: SearchIndex + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, search: Arc<I>, retry: CounterRetryPolicy) -> Self {
        Self {
            store,
            search,
            retry,
        }
    }

    pub async fn handle(&self, event: &LifecycleEvent) -> Result<()> {
        match event {
            LifecycleEvent::Created {
                collection,
                document,
            } => self.on_entity_created(*collection, document).await,
            LifecycleEvent::Updated {
                collection,
                before,
                after,
            } => self.on_entity_updated(*collection, before, after).await,
            LifecycleEvent::Deleted {
                collection,
                document,
            } => self.on_entity_deleted(*collection, document).await,
        }
    }

    pub async fn on_entity_created(&self, collection: Collection, document: &Document) -> Result<()> {
        if collection == Collection::Orders {
            self.decrement_inventory(document).await;
        }

        let label = category_of(collection, document);
        self.update_counter(collection, true, |count| {
            count.record_created(label.as_deref());
            true
        })
        .await?;

        self.search
            .upsert(collection, &document.id, document.data.clone())
            .await
    }

    pub async fn on_entity_updated(
        &self,
        collection: Collection,
        before: &Document,
        after: &Document,
    ) -> Result<()> {
        let from = category_of(collection, before);
        let to = category_of(collection, after);
        if from != to {
            self.update_counter(collection, false, |count| {
                count.record_relabel(from.as_deref(), to.as_deref())
            })
            .await?;
        }

        self.search
            .upsert(collection, &after.id, after.data.clone())
            .await
    }

    pub async fn on_entity_deleted(&self, collection: Collection, document: &Document) -> Result<()> {
        let label = category_of(collection, document);
        self.update_counter(collection, false, |count| {
            count.record_deleted(label.as_deref());
            true
        })
        .await?;

        self.search.delete(collection, &document.id).await
    }

    /// Current counter; an absent document reads as zero.
    pub async fn counts(&self, collection: Collection) -> Result<AggregateCount> {
        Ok(self
            .store
            .read_counter(collection)
            .await?
            .map(|versioned| versioned.count)
            .unwrap_or_else(|| AggregateCount::empty(collection)))
    }

    /// Handles every event already queued on `feed`, including the ones
    /// produced while handling (inventory updates). Returns how many ran.
    pub async fn process_pending(&self, feed: &mut LifecycleFeed) -> Result<usize> {
        let mut handled = 0;
        while let Ok(event) = feed.try_recv() {
            self.handle(&event).await?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Runs the service until `feed` closes. Failures are logged and the
    /// next event is processed.
    pub fn spawn(self: Arc<Self>, mut feed: LifecycleFeed) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = feed.recv().await {
                if let Err(err) = self.handle(&event).await {
                    warn!(
                        "counter maintenance failed for {} event: {}",
                        event.collection(),
                        err
                    );
                }
            }
            debug!("lifecycle feed closed, counter maintenance stopped");
        })
    }

    /// Read-modify-write of the counter document.
    ///
    /// `mutate` returns `false` when nothing changed, which skips the write.
    /// Without `create_missing` an absent document is left absent.
    async fn update_counter<F>(&self, collection: Collection, create_missing: bool, mutate: F) -> Result<()>
    where
        F: Fn(&mut AggregateCount) -> bool + Send + Sync,
    {
        let mut attempt = 1usize;
        loop {
            let (expected_version, mut count) = match self.store.read_counter(collection).await? {
                Some(VersionedCount { version, count }) => (Some(version), count),
                None if create_missing => (None, AggregateCount::empty(collection)),
                None => {
                    debug!(
                        "{} absent, counter left untouched",
                        collection.counter_document()
                    );
                    return Ok(());
                }
            };

            if !mutate(&mut count) {
                return Ok(());
            }

            match self
                .store
                .write_counter(collection, expected_version, count)
                .await
            {
                Ok(_) => return Ok(()),
                Err(err) if err.is_conflict() && self.retry.allows_retry(attempt) => {
                    let backoff_ms = self.retry.backoff_ms(attempt);
                    warn!(
                        "counter write retry on conflict (attempt {} of {}): {} (backoff={}ms)",
                        attempt,
                        self.retry.max_attempts.max(1),
                        err,
                        backoff_ms
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Takes purchased quantities out of product inventory, stopping at zero.
    ///
    /// A line that cannot be applied is logged and skipped; the order is
    /// still counted and indexed.
    async fn decrement_inventory(&self, order: &Document) {
        let Some(lines) = order.field("/items").and_then(Value::as_array) else {
            return;
        };

        for line in lines {
            let product_id = line.pointer("/item/id").and_then(Value::as_str);
            let quantity = line.get("quantity").and_then(Value::as_u64);
            let (Some(product_id), Some(quantity)) = (product_id, quantity) else {
                continue;
            };

            if let Err(err) = self.take_inventory(product_id, quantity).await {
                warn!(
                    "order {}: inventory of product {} not updated: {}",
                    order.id, product_id, err
                );
            }
        }
    }

    async fn take_inventory(&self, product_id: &str, quantity: u64) -> Result<()> {
        let Some(mut product) = self.store.get(Collection::Products, product_id).await? else {
            debug!("product {} no longer exists", product_id);
            return Ok(());
        };

        let inventory = product
            .data
            .get("inventory")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if let Value::Object(fields) = &mut product.data {
            fields.insert(
                "inventory".to_string(),
                Value::from(inventory.saturating_sub(quantity)),
            );
        }
        self.store.update(Collection::Products, product).await
    }
}
