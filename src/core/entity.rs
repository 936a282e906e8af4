use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Collections whose sizes are tracked by an aggregate-count document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Users,
    Products,
    Orders,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Users, Collection::Products, Collection::Orders];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Products => "products",
            Collection::Orders => "orders",
        }
    }

    /// Path of the singleton aggregate-count document.
    pub fn counter_document(&self) -> &'static str {
        match self {
            Collection::Users => "user-counts/counts",
            Collection::Products => "product-counts/counts",
            Collection::Orders => "order-counts/counts",
        }
    }

    /// Document field whose value feeds the per-category breakdown.
    ///
    /// Only products keep a breakdown; users and orders track `total` alone.
    pub fn category_field(&self) -> Option<&'static str> {
        match self {
            Collection::Products => Some("category"),
            Collection::Users | Collection::Orders => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Position of a document in a creation-time-descending result set.
///
/// Ties on `created_at` are broken by id so the order is total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: String,
}

impl Cursor {
    pub fn new(created_at: DateTime<Utc>, id: impl Into<String>) -> Self {
        Self {
            created_at,
            id: id.into(),
        }
    }

    /// Ordering of two positions in newest-first order.
    pub fn newest_first(&self, other: &Cursor) -> Ordering {
        other
            .created_at
            .cmp(&self.created_at)
            .then_with(|| other.id.cmp(&self.id))
    }

    /// `true` when `self` sorts strictly after `other` in newest-first order.
    pub fn is_after(&self, other: &Cursor) -> bool {
        self.newest_first(other) == Ordering::Greater
    }
}

/// Tab filter applied on top of a window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Filter {
    #[default]
    All,
    Label(String),
}

impl Filter {
    pub fn label(label: impl Into<String>) -> Self {
        Filter::Label(label.into())
    }

    /// Parses a tab name; "All" maps to [`Filter::All`].
    pub fn parse(tab: &str) -> Self {
        if tab == "All" {
            Filter::All
        } else {
            Filter::Label(tab.to_string())
        }
    }

    pub fn matches(&self, label: Option<&str>) -> bool {
        match self {
            Filter::All => true,
            Filter::Label(expected) => label == Some(expected.as_str()),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All => f.write_str("All"),
            Filter::Label(label) => f.write_str(label),
        }
    }
}

/// An entity that can be listed in a live window.
pub trait ListEntity {
    const COLLECTION: Collection;

    fn id(&self) -> &str;

    fn created_at(&self) -> DateTime<Utc>;

    /// Value matched by filter tabs (category, shipment status).
    fn label(&self) -> Option<&str> {
        None
    }

    fn cursor(&self) -> Cursor {
        Cursor::new(self.created_at(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cursor_order_is_newest_first() {
        let older = Cursor::new(Utc.timestamp_opt(100, 0).unwrap(), "a");
        let newer = Cursor::new(Utc.timestamp_opt(200, 0).unwrap(), "b");
        assert!(older.is_after(&newer));
        assert!(!newer.is_after(&older));
        assert!(!newer.is_after(&newer));
    }

    #[test]
    fn test_cursor_ties_break_on_id() {
        let at = Utc.timestamp_opt(100, 0).unwrap();
        let a = Cursor::new(at, "a");
        let b = Cursor::new(at, "b");
        assert!(a.is_after(&b));
    }

    #[test]
    fn test_filter_parse_and_match() {
        assert_eq!(Filter::parse("All"), Filter::All);
        let shoes = Filter::parse("Shoes");
        assert!(shoes.matches(Some("Shoes")));
        assert!(!shoes.matches(Some("Watches")));
        assert!(!shoes.matches(None));
        assert!(Filter::All.matches(None));
    }
}
