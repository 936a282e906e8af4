use super::pagination::{
    PageView, clamp_page, known_total, needs_more, search_page, total_pages, window_page,
};
use super::window::{AppendOutcome, EntityWindow};
use crate::config::{ListConfig, StorefrontConfig};
use crate::context::{Scope, ViewerContext};
use crate::core::{Collection, Filter, ListEntity, Result, StoreError};
use crate::counter::AggregateCount;
use crate::search::{SearchIndex, search_entities};
use crate::store::{Document, DocumentStore, Query, Subscription};
use im::Vector;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};

/// Lifecycle of the live subscription behind a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListStatus {
    Uninitialized,
    Subscribed,
    /// The live subscription broke; the window no longer tracks the store.
    Failed(String),
    Unsubscribed,
}

/// What observers of a list see after every change.
#[derive(Debug, Clone)]
pub struct WindowState<T: Clone> {
    pub status: ListStatus,
    pub items: Vector<T>,
    pub counts: AggregateCount,
    pub exhausted: bool,
    pub loading_more: bool,
    /// Last transient failure (load-more, search); cleared on success.
    pub error: Option<String>,
    pub generation: u64,
    pub searching: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMoreOutcome {
    /// Items appended to the window; duplicates are not counted.
    Appended(usize),
    /// A snapshot replaced the window while the fetch was in flight.
    Stale,
    /// Nothing was fetched: another fetch is running or nothing is left.
    Skipped,
}

struct ListState<T: Clone> {
    window: EntityWindow<T>,
    counts: AggregateCount,
    /// Whether `counts` describes exactly what the window lists. Scoped
    /// lists see part of the collection and page from what is loaded.
    counted: bool,
    status: ListStatus,
    /// Generation the running load-more was issued against.
    in_flight: Option<u64>,
    error: Option<String>,
    search_results: Option<Vec<T>>,
    active_filter: Filter,
    page: usize,
}

impl<T: ListEntity + Clone> ListState<T> {
    fn new(collection: Collection) -> Self {
        Self {
            window: EntityWindow::new(),
            counts: AggregateCount::empty(collection),
            counted: false,
            status: ListStatus::Uninitialized,
            in_flight: None,
            error: None,
            search_results: None,
            active_filter: Filter::All,
            page: 1,
        }
    }

    fn loading_more(&self) -> bool {
        self.in_flight == Some(self.window.generation())
    }

    fn snapshot(&self) -> WindowState<T> {
        WindowState {
            status: self.status.clone(),
            items: self.window.items().clone(),
            counts: self.counts.clone(),
            exhausted: self.window.is_exhausted(),
            loading_more: self.loading_more(),
            error: self.error.clone(),
            generation: self.window.generation(),
            searching: self.search_results.is_some(),
        }
    }

    fn paging_counts(&self) -> Option<&AggregateCount> {
        self.counted.then_some(&self.counts)
    }

    fn total_pages(&self, per_page: usize) -> usize {
        match &self.search_results {
            Some(results) => total_pages(results.len() as u64, per_page),
            None => total_pages(
                known_total(self.window.items(), self.paging_counts(), &self.active_filter),
                per_page,
            ),
        }
    }
}

type SharedState<T> = Arc<Mutex<ListState<T>>>;
type StateSender<T> = Arc<watch::Sender<WindowState<T>>>;

struct Listener {
    alive: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Listener {
    fn stop(self) {
        self.alive.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}

/// Live, paginated view over one collection.
///
/// The window holds the newest `window_limit` documents visible to the
/// viewer and is replaced wholesale whenever the store pushes a new
/// snapshot. Older documents are appended on demand by [`load_more`];
/// a fetch that completes after a replacement is discarded.
///
/// [`load_more`]: LiveListController::load_more
pub struct LiveListController<T: Clone, S: ?Sized> {
    collection: Collection,
    store: Arc<S>,
    config: ListConfig,
    context: ViewerContext,
    shared: SharedState<T>,
    state_tx: StateSender<T>,
    listener: Option<Listener>,
}

impl<T, S> LiveListController<T, S>
where
    T: ListEntity + DeserializeOwned + Clone + Send + Sync + 'static,
    S: DocumentStore + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, config: ListConfig, context: ViewerContext) -> Self {
        let collection = T::COLLECTION;
        let state = ListState::new(collection);
        let (state_tx, _) = watch::channel(state.snapshot());

        Self {
            collection,
            store,
            config,
            context,
            shared: Arc::new(Mutex::new(state)),
            state_tx: Arc::new(state_tx),
            listener: None,
        }
    }

    /// Uses the sizing configured for `T`'s collection.
    pub fn from_config(
        store: Arc<S>,
        config: &StorefrontConfig,
        context: ViewerContext,
    ) -> Result<Self> {
        config.validate().map_err(StoreError::InvalidConfig)?;
        Ok(Self::new(store, config.list(T::COLLECTION), context))
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn context(&self) -> &ViewerContext {
        &self.context
    }

    pub fn config(&self) -> ListConfig {
        self.config
    }

    /// Current state.
    pub fn state(&self) -> WindowState<T> {
        self.state_tx.borrow().clone()
    }

    /// Receiver notified after every state change.
    pub fn watch(&self) -> watch::Receiver<WindowState<T>> {
        self.state_tx.subscribe()
    }

    fn with_state<R>(&self, apply: impl FnOnce(&mut ListState<T>) -> R) -> Result<R> {
        let mut state = self.shared.lock()?;
        let out = apply(&mut state);
        self.state_tx.send_replace(state.snapshot());
        Ok(out)
    }

    fn scoped_query(&self) -> Option<Query> {
        let scope = self.context.scope_for(self.collection);
        Query::for_scope(self.collection, &scope, self.config.window_limit)
    }

    /// The collection counter only sizes lists that see the whole collection.
    fn sees_whole_collection(&self) -> bool {
        matches!(self.context.scope_for(self.collection), Scope::All)
    }

    /// Opens the live window and counter subscriptions.
    ///
    /// Re-subscribing tears the previous listener down first. A failure to
    /// establish either subscription leaves the list in
    /// [`ListStatus::Failed`].
    pub async fn subscribe(&mut self) -> Result<watch::Receiver<WindowState<T>>> {
        if let Some(listener) = self.listener.take() {
            listener.stop();
        }

        let Some(query) = self.scoped_query() else {
            debug!(collection = %self.collection, "nothing visible to viewer, window left empty");
            let collection = self.collection;
            self.with_state(|state| {
                state.window.close_empty();
                state.counts = AggregateCount::empty(collection);
                state.counted = false;
                state.status = ListStatus::Subscribed;
                state.in_flight = None;
                state.error = None;
            })?;
            return Ok(self.watch());
        };

        let opened = self.open(query).await;
        let (documents, counter, initial, counts) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                warn!(collection = %self.collection, error = %err, "live subscription could not be opened");
                let message = err.to_string();
                self.with_state(|state| state.status = ListStatus::Failed(message))?;
                return Err(err);
            }
        };

        let limit = self.config.window_limit;
        let counted = self.sees_whole_collection();
        let generation = self.with_state(|state| {
            state.counts = counts;
            state.counted = counted;
            state.status = ListStatus::Subscribed;
            state.in_flight = None;
            state.error = None;
            state.window.replace(initial, limit)
        })?;
        debug!(collection = %self.collection, generation, "live window opened");

        let alive = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(
            run_listener(
                Arc::clone(&self.shared),
                Arc::clone(&self.state_tx),
                Arc::clone(&alive),
                documents,
                counter,
                limit,
            )
            .instrument(info_span!("live_list", collection = %self.collection)),
        );
        self.listener = Some(Listener { alive, task });

        Ok(self.watch())
    }

    /// Listeners are registered before the initial reads so that no write
    /// can fall between the two.
    async fn open(
        &self,
        query: Query,
    ) -> Result<(
        Subscription<Vec<Document>>,
        Subscription<AggregateCount>,
        Vec<T>,
        AggregateCount,
    )> {
        let documents = self.store.subscribe(query.clone()).await?;
        let counter = self.store.subscribe_counter(self.collection).await?;
        let initial = self.store.query(&query).await?;
        let counts = self
            .store
            .read_counter(self.collection)
            .await?
            .map(|versioned| versioned.count)
            .unwrap_or_else(|| AggregateCount::empty(self.collection));
        Ok((documents, counter, decode_documents(&initial), counts))
    }

    /// Fetches the next batch of older documents after the window's cursor.
    ///
    /// At most one fetch runs per window generation. A failed fetch is
    /// recorded in [`WindowState::error`] and leaves the window untouched.
    pub async fn load_more(&self) -> Result<LoadMoreOutcome> {
        let (generation, cursor) = {
            let mut state = self.shared.lock()?;
            match &state.status {
                ListStatus::Subscribed => {}
                ListStatus::Failed(message) => {
                    return Err(StoreError::Subscription(message.clone()));
                }
                ListStatus::Uninitialized | ListStatus::Unsubscribed => {
                    return Err(StoreError::Closed(format!(
                        "{} list is not subscribed",
                        self.collection
                    )));
                }
            }
            if state.loading_more() || state.window.is_exhausted() {
                return Ok(LoadMoreOutcome::Skipped);
            }
            let Some(cursor) = state.window.cursor().cloned() else {
                return Ok(LoadMoreOutcome::Skipped);
            };

            let generation = state.window.generation();
            state.in_flight = Some(generation);
            self.state_tx.send_replace(state.snapshot());
            (generation, cursor)
        };

        let fetched = match self.scoped_query() {
            Some(query) => self.store.query(&query.start_after(cursor)).await,
            None => Ok(Vec::new()),
        };

        let mut state = self.shared.lock()?;
        if state.in_flight == Some(generation) {
            state.in_flight = None;
        }
        let outcome = match fetched {
            Ok(documents) => {
                let batch = decode_documents(&documents);
                match state.window.append(generation, batch, self.config.window_limit) {
                    AppendOutcome::Appended(added) => {
                        state.error = None;
                        Ok(LoadMoreOutcome::Appended(added))
                    }
                    AppendOutcome::Stale => {
                        debug!(
                            collection = %self.collection,
                            requested = generation,
                            current = state.window.generation(),
                            "discarding load-more batch for replaced window"
                        );
                        Ok(LoadMoreOutcome::Stale)
                    }
                }
            }
            Err(err) => {
                warn!(collection = %self.collection, error = %err, "load-more failed");
                state.error = Some(err.to_string());
                Err(err)
            }
        };
        self.state_tx.send_replace(state.snapshot());
        outcome
    }

    /// Renders `page` of `per_page` items matching `filter`.
    ///
    /// Extends the window as far as needed first. Search results, when set,
    /// take precedence and `filter` is ignored.
    pub async fn get_page(&self, page: usize, per_page: usize, filter: &Filter) -> Result<PageView<T>> {
        loop {
            {
                let state = self.shared.lock()?;
                if let Some(results) = &state.search_results {
                    return Ok(search_page(results, page, per_page));
                }
                let counts = state.paging_counts();
                let view = window_page(state.window.items(), counts, filter, page, per_page);
                // Without a counter the page count only grows as the window
                // does, so the requested page decides how far to load.
                let wanted = if counts.is_some() { view.page } else { page.max(1) };
                let wants_more = state.status == ListStatus::Subscribed
                    && needs_more(
                        state.window.items(),
                        counts,
                        filter,
                        wanted,
                        per_page,
                        state.window.is_exhausted(),
                    );
                if !wants_more {
                    return Ok(view);
                }
            }

            match self.load_more().await? {
                LoadMoreOutcome::Appended(added) if added > 0 => {}
                LoadMoreOutcome::Stale => {}
                LoadMoreOutcome::Appended(_) | LoadMoreOutcome::Skipped => {
                    return self.render(page, per_page, filter);
                }
            }
        }
    }

    fn render(&self, page: usize, per_page: usize, filter: &Filter) -> Result<PageView<T>> {
        let state = self.shared.lock()?;
        Ok(match &state.search_results {
            Some(results) => search_page(results, page, per_page),
            None => window_page(state.window.items(), state.paging_counts(), filter, page, per_page),
        })
    }

    /// The page the viewer is on, with the active filter and page size.
    pub async fn current_page(&self) -> Result<PageView<T>> {
        let (page, filter) = {
            let state = self.shared.lock()?;
            (state.page, state.active_filter.clone())
        };
        let view = self.get_page(page, self.config.page_size, &filter).await?;
        self.with_state(|state| state.page = view.page)?;
        Ok(view)
    }

    pub fn active_filter(&self) -> Result<Filter> {
        Ok(self.shared.lock()?.active_filter.clone())
    }

    pub fn page(&self) -> Result<usize> {
        Ok(self.shared.lock()?.page)
    }

    /// Switches the filter tab; a different tab starts back at page 1.
    pub fn set_active_filter(&self, filter: Filter) -> Result<()> {
        self.with_state(|state| {
            if state.active_filter != filter {
                state.active_filter = filter;
                state.page = 1;
            }
        })
    }

    /// Moves to `page`, clamped to the pages currently known. Returns the
    /// page actually selected.
    pub fn set_page(&self, page: usize) -> Result<usize> {
        let per_page = self.config.page_size;
        self.with_state(|state| {
            state.page = clamp_page(page, state.total_pages(per_page));
            state.page
        })
    }

    /// Installs (or with `None` clears) a search result set and returns to
    /// page 1.
    pub fn set_search_results(&self, results: Option<Vec<T>>) -> Result<()> {
        self.with_state(|state| {
            state.search_results = results;
            state.page = 1;
        })
    }

    /// Runs `query` against the search index and shows the hits.
    ///
    /// On failure the previous results stay in place.
    pub async fn search<I>(&self, index: &I, query: &str) -> Result<usize>
    where
        I: SearchIndex + ?Sized,
    {
        match search_entities::<T, I>(index, query).await {
            Ok(results) => {
                let found = results.len();
                self.with_state(|state| {
                    state.search_results = Some(results);
                    state.page = 1;
                    state.error = None;
                })?;
                Ok(found)
            }
            Err(err) => {
                warn!(collection = %self.collection, error = %err, "search failed");
                let message = err.to_string();
                self.with_state(|state| state.error = Some(message))?;
                Err(err)
            }
        }
    }

    pub fn clear_search(&self) -> Result<()> {
        self.set_search_results(None)
    }

    /// Rebuilds the list for another viewer. The previous window, counts,
    /// and search results are dropped before anything is fetched.
    pub async fn change_context(
        &mut self,
        context: ViewerContext,
    ) -> Result<watch::Receiver<WindowState<T>>> {
        if let Some(listener) = self.listener.take() {
            listener.stop();
        }
        let collection = self.collection;
        self.with_state(|state| {
            state.window.reset();
            state.counts = AggregateCount::empty(collection);
            state.counted = false;
            state.status = ListStatus::Uninitialized;
            state.in_flight = None;
            state.error = None;
            state.search_results = None;
            state.page = 1;
        })?;
        debug!(collection = %self.collection, user = ?context.user_id, "viewer changed");

        self.context = context;
        self.subscribe().await
    }

    /// Releases both live subscriptions. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.stop();
        }
        if let Ok(mut state) = self.shared.lock() {
            state.status = ListStatus::Unsubscribed;
            state.in_flight = None;
            self.state_tx.send_replace(state.snapshot());
        }
    }
}

impl<T: Clone, S: ?Sized> Drop for LiveListController<T, S> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.stop();
        }
    }
}

fn decode_documents<T: DeserializeOwned>(documents: &[Document]) -> Vec<T> {
    documents
        .iter()
        .filter_map(|document| match document.decode::<T>() {
            Ok(entity) => Some(entity),
            Err(err) => {
                warn!(id = %document.id, error = %err, "skipping undecodable document");
                None
            }
        })
        .collect()
}

enum Pushed<T> {
    Snapshot(Vec<T>),
    Counts(AggregateCount),
    Failed(StoreError),
}

/// Applies one pushed value. Returns `false` once the listener must stop.
fn apply<T: ListEntity + Clone>(
    shared: &SharedState<T>,
    state_tx: &StateSender<T>,
    alive: &AtomicBool,
    pushed: Pushed<T>,
    limit: usize,
) -> bool {
    if !alive.load(Ordering::SeqCst) {
        return false;
    }
    let Ok(mut state) = shared.lock() else {
        warn!("list state lock poisoned, live updates stopped");
        state_tx.send_modify(|published| {
            published.status = ListStatus::Failed("list state lock poisoned".to_string());
            published.loading_more = false;
        });
        return false;
    };

    let keep_going = match pushed {
        Pushed::Snapshot(items) => {
            let generation = state.window.replace(items, limit);
            debug!(generation, size = state.window.len(), "window replaced by live snapshot");
            true
        }
        Pushed::Counts(counts) => {
            state.counts = counts;
            true
        }
        Pushed::Failed(err) => {
            warn!(error = %err, "live subscription failed");
            state.status = ListStatus::Failed(err.to_string());
            state.in_flight = None;
            false
        }
    };
    state_tx.send_replace(state.snapshot());
    keep_going
}

async fn run_listener<T>(
    shared: SharedState<T>,
    state_tx: StateSender<T>,
    alive: Arc<AtomicBool>,
    mut documents: Subscription<Vec<Document>>,
    mut counter: Subscription<AggregateCount>,
    limit: usize,
) where
    T: ListEntity + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let mut counter_open = true;
    loop {
        let pushed = tokio::select! {
            next = documents.recv() => match next {
                Some(Ok(snapshot)) => Pushed::Snapshot(decode_documents(&snapshot)),
                Some(Err(err)) => Pushed::Failed(err),
                None => {
                    debug!("document feed closed");
                    break;
                }
            },
            next = counter.recv(), if counter_open => match next {
                Some(Ok(counts)) => Pushed::Counts(counts),
                Some(Err(err)) => Pushed::Failed(err),
                None => {
                    counter_open = false;
                    continue;
                }
            },
        };

        if !apply(&shared, &state_tx, &alive, pushed, limit) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::UserInfo;

    #[test]
    fn test_poisoned_state_marks_list_failed() {
        let state = ListState::<UserInfo>::new(Collection::Users);
        let (tx, rx) = watch::channel(state.snapshot());
        let shared: SharedState<UserInfo> = Arc::new(Mutex::new(state));
        let state_tx: StateSender<UserInfo> = Arc::new(tx);

        let poisoner = Arc::clone(&shared);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();
        assert!(shared.is_poisoned());

        let alive = AtomicBool::new(true);
        let pushed = Pushed::Counts(AggregateCount::empty(Collection::Users));
        assert!(!apply(&shared, &state_tx, &alive, pushed, 20));

        assert!(matches!(rx.borrow().status, ListStatus::Failed(_)));
    }
}
