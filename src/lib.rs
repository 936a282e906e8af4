// ============================================================================
// Storefront Core Library
// ============================================================================
//
// Denormalized aggregate counters kept in step with document lifecycle
// events, and live paginated lists over a real-time document store.
//
// ============================================================================

pub mod address_cache;
pub mod config;
pub mod context;
pub mod core;
pub mod counter;
pub mod live_list;
pub mod search;
pub mod store;

// Re-export main types for convenience
pub use crate::core::{
    Address, Collection, Cursor, Filter, ListEntity, Order, PaymentStatus, Product,
    ProductCategory, PurchasedItem, Result, Role, ShipmentStatus, StoreError, UserInfo,
};
pub use address_cache::{KeyValueStore, MemoryKeyValueStore, ShippingAddressCache};
pub use config::{CounterRetryPolicy, ListConfig, StorefrontConfig};
pub use context::{Scope, ViewerContext};
pub use counter::{AggregateCount, CounterService};
pub use live_list::{
    EntityWindow, ListStatus, LiveListController, LoadMoreOutcome, PageView, WindowState,
};
pub use search::{MemorySearchIndex, SearchHit, SearchIndex};
pub use store::{
    Document, DocumentStore, FieldFilter, LifecycleEvent, MemoryDocumentStore, Query,
    Subscription,
};
