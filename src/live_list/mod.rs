// ============================================================================
// Live Lists
// ============================================================================
//
// A window of the newest documents kept current by a store subscription,
// extended on demand with older documents, and cut into pages sized by the
// collection's aggregate counter.
//
// ============================================================================

pub mod controller;
pub mod pagination;
pub mod window;

pub use controller::{ListStatus, LiveListController, LoadMoreOutcome, WindowState};
pub use pagination::PageView;
pub use window::{AppendOutcome, EntityWindow};
