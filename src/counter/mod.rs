// ============================================================================
// Counter Maintenance
// ============================================================================
//
// Aggregate-count documents (one per tracked collection) are owned by the
// counter service; every other component only reads them.
//
// ============================================================================

pub mod aggregate;
pub mod service;

pub use aggregate::AggregateCount;
pub use service::CounterService;
