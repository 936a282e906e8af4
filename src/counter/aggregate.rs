use crate::core::{Collection, Filter, ProductCategory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Precomputed size of a collection.
///
/// Every decrement saturates at zero, so a counter that drifted from its
/// collection never shows a negative value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateCount {
    pub total: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_category: BTreeMap<String, u64>,
}

impl AggregateCount {
    /// Zeroed counter; products start with every category present.
    pub fn empty(collection: Collection) -> Self {
        let mut count = Self::default();
        if collection.category_field().is_some() {
            for category in ProductCategory::ALL {
                count.by_category.insert(category.as_str().to_string(), 0);
            }
        }
        count
    }

    pub fn record_created(&mut self, label: Option<&str>) {
        self.total += 1;
        if let Some(label) = label {
            *self.by_category.entry(label.to_string()).or_insert(0) += 1;
        }
    }

    /// Moves one document from `before` to `after`. `total` is untouched.
    ///
    /// Returns `false` when the label did not change.
    pub fn record_relabel(&mut self, before: Option<&str>, after: Option<&str>) -> bool {
        if before == after {
            return false;
        }
        if let Some(before) = before {
            self.decrement_category(before);
        }
        if let Some(after) = after {
            *self.by_category.entry(after.to_string()).or_insert(0) += 1;
        }
        true
    }

    pub fn record_deleted(&mut self, label: Option<&str>) {
        self.total = self.total.saturating_sub(1);
        if let Some(label) = label {
            self.decrement_category(label);
        }
    }

    fn decrement_category(&mut self, label: &str) {
        let slot = self.by_category.entry(label.to_string()).or_insert(0);
        *slot = slot.saturating_sub(1);
    }

    /// Known size of the subset selected by `filter`.
    ///
    /// `None` when the counter keeps no breakdown for that label.
    pub fn count_for(&self, filter: &Filter) -> Option<u64> {
        match filter {
            Filter::All => Some(self.total),
            Filter::Label(label) => self.by_category.get(label).copied(),
        }
    }

    pub fn category_sum(&self) -> u64 {
        self.by_category.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_products_have_all_categories() {
        let count = AggregateCount::empty(Collection::Products);
        assert_eq!(count.total, 0);
        assert_eq!(count.by_category.len(), 4);
        assert_eq!(count.count_for(&Filter::label("Watches")), Some(0));

        let users = AggregateCount::empty(Collection::Users);
        assert!(users.by_category.is_empty());
    }

    #[test]
    fn test_create_and_delete_keep_sum() {
        let mut count = AggregateCount::empty(Collection::Products);
        count.record_created(Some("Shoes"));
        count.record_created(Some("Shoes"));
        count.record_created(Some("Watches"));
        assert_eq!(count.total, 3);
        assert_eq!(count.category_sum(), 3);

        count.record_deleted(Some("Shoes"));
        assert_eq!(count.total, 2);
        assert_eq!(count.count_for(&Filter::label("Shoes")), Some(1));
        assert_eq!(count.category_sum(), count.total);
    }

    #[test]
    fn test_delete_from_zero_stays_zero() {
        let mut count = AggregateCount::empty(Collection::Products);
        count.record_deleted(Some("Clothing"));
        assert_eq!(count.total, 0);
        assert_eq!(count.count_for(&Filter::label("Clothing")), Some(0));

        let mut orders = AggregateCount::default();
        orders.record_deleted(None);
        assert_eq!(orders.total, 0);
    }

    #[test]
    fn test_relabel_moves_one_document() {
        let mut count = AggregateCount::empty(Collection::Products);
        count.record_created(Some("Clothing"));
        count.record_created(Some("Clothing"));

        assert!(count.record_relabel(Some("Clothing"), Some("Accessories")));
        assert_eq!(count.total, 2);
        assert_eq!(count.count_for(&Filter::label("Clothing")), Some(1));
        assert_eq!(count.count_for(&Filter::label("Accessories")), Some(1));

        assert!(!count.record_relabel(Some("Clothing"), Some("Clothing")));
        assert_eq!(count.category_sum(), 2);
    }

    #[test]
    fn test_unknown_label_has_no_count() {
        let count = AggregateCount::default();
        assert_eq!(count.count_for(&Filter::label("Shipped")), None);
        assert_eq!(count.count_for(&Filter::All), Some(0));
    }

    #[test]
    fn test_wire_shape() {
        let mut count = AggregateCount::default();
        count.record_created(None);
        let json = serde_json::to_value(&count).unwrap();
        assert_eq!(json, serde_json::json!({ "total": 1 }));
    }
}
