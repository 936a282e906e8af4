use crate::core::{Filter, ListEntity};
use crate::counter::AggregateCount;
use im::Vector;

/// One rendered page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageView<T> {
    pub items: Vec<T>,
    /// Page actually shown, after clamping.
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
    /// `true` when the page was cut from search results, not the window.
    pub from_search: bool,
}

pub fn total_pages(total: u64, per_page: usize) -> usize {
    if per_page == 0 {
        return 0;
    }
    usize::try_from(total.div_ceil(per_page as u64)).unwrap_or(usize::MAX)
}

/// Clamps a 1-based page number into `[1, max(1, total_pages)]`.
pub fn clamp_page(page: usize, total_pages: usize) -> usize {
    page.clamp(1, total_pages.max(1))
}

fn slice<'a, T: Clone + 'a>(
    items: impl Iterator<Item = &'a T>,
    page: usize,
    per_page: usize,
) -> Vec<T> {
    items
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .cloned()
        .collect()
}

/// Page of a finite search result set. Filters do not apply.
pub fn search_page<T: Clone>(results: &[T], page: usize, per_page: usize) -> PageView<T> {
    let per_page = per_page.max(1);
    let total_pages = total_pages(results.len() as u64, per_page);
    let page = clamp_page(page, total_pages);

    PageView {
        items: slice(results.iter(), page, per_page),
        page,
        per_page,
        total_pages,
        from_search: true,
    }
}

/// Size the pager should assume for `filter`.
///
/// The counter wins when given. Without one, or without a breakdown for the
/// label, what is loaded is all that is known.
pub fn known_total<T: ListEntity + Clone>(
    items: &Vector<T>,
    counts: Option<&AggregateCount>,
    filter: &Filter,
) -> u64 {
    let loaded = matching(items, filter).count() as u64;
    counts
        .and_then(|counts| counts.count_for(filter))
        .unwrap_or(0)
        .max(loaded)
}

/// Page of the window restricted to `filter`.
///
/// `counts` is the aggregate counter when it describes exactly what the
/// window lists, `None` for a list restricted to part of the collection.
/// May come back short when the window does not yet reach that far; see
/// [`needs_more`].
pub fn window_page<T: ListEntity + Clone>(
    items: &Vector<T>,
    counts: Option<&AggregateCount>,
    filter: &Filter,
    page: usize,
    per_page: usize,
) -> PageView<T> {
    let per_page = per_page.max(1);
    let total_pages = total_pages(known_total(items, counts, filter), per_page);
    let page = clamp_page(page, total_pages);

    PageView {
        items: slice(matching(items, filter), page, per_page),
        page,
        per_page,
        total_pages,
        from_search: false,
    }
}

/// Whether rendering `page` requires extending the window first.
///
/// Without a counter only the window's own `exhausted` flag says whether
/// older documents remain.
pub fn needs_more<T: ListEntity + Clone>(
    items: &Vector<T>,
    counts: Option<&AggregateCount>,
    filter: &Filter,
    page: usize,
    per_page: usize,
    exhausted: bool,
) -> bool {
    if exhausted {
        return false;
    }

    let wanted = page.max(1).saturating_mul(per_page.max(1));
    let loaded = matching(items, filter).count();
    if loaded >= wanted {
        return false;
    }

    let Some(counts) = counts else {
        return true;
    };
    match counts.count_for(filter) {
        Some(total) => (loaded as u64) < total,
        None => (items.len() as u64) < counts.total,
    }
}

fn matching<'a, T: ListEntity + Clone>(
    items: &'a Vector<T>,
    filter: &'a Filter,
) -> impl Iterator<Item = &'a T> + 'a {
    items.iter().filter(move |item| filter.matches(item.label()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Collection, Cursor};
    use chrono::{DateTime, TimeZone, Utc};

    #[derive(Debug, Clone, PartialEq)]
    struct Tagged {
        id: String,
        tag: &'static str,
        at: DateTime<Utc>,
    }

    impl ListEntity for Tagged {
        const COLLECTION: Collection = Collection::Products;

        fn id(&self) -> &str {
            &self.id
        }

        fn created_at(&self) -> DateTime<Utc> {
            self.at
        }

        fn label(&self) -> Option<&str> {
            Some(self.tag)
        }
    }

    fn window(tags: &[&'static str]) -> Vector<Tagged> {
        tags.iter()
            .enumerate()
            .map(|(n, tag)| Tagged {
                id: format!("p{n}"),
                tag: *tag,
                at: Utc.timestamp_opt(1_000 - n as i64, 0).unwrap(),
            })
            .collect()
    }

    fn counts(total: u64, breakdown: &[(&str, u64)]) -> AggregateCount {
        AggregateCount {
            total,
            by_category: breakdown
                .iter()
                .map(|(label, n)| (label.to_string(), *n))
                .collect(),
        }
    }

    #[test]
    fn test_total_pages_rounds_up() {
        assert_eq!(total_pages(0, 6), 0);
        assert_eq!(total_pages(9, 6), 2);
        assert_eq!(total_pages(12, 6), 2);
        assert_eq!(total_pages(13, 6), 3);
        assert_eq!(total_pages(5, 0), 0);
    }

    #[test]
    fn test_clamp_page() {
        assert_eq!(clamp_page(0, 3), 1);
        assert_eq!(clamp_page(7, 3), 3);
        assert_eq!(clamp_page(4, 0), 1);
    }

    #[test]
    fn test_search_page_slices_and_clamps() {
        let results: Vec<u32> = (1..=13).collect();
        let last = search_page(&results, 3, 6);
        assert_eq!(last.items, vec![13]);
        assert_eq!(last.total_pages, 3);
        assert!(last.from_search);

        let clamped = search_page(&results, 10, 6);
        assert_eq!(clamped.page, 3);

        let empty = search_page::<u32>(&[], 2, 6);
        assert_eq!(empty.page, 1);
        assert!(empty.items.is_empty());
    }

    #[test]
    fn test_window_page_uses_counter_for_page_count() {
        let items = window(&["Shoes"; 6]);
        let view = window_page(&items, Some(&counts(9, &[("Shoes", 9)])), &Filter::All, 2, 6);
        assert_eq!(view.total_pages, 2);
        assert_eq!(view.page, 2);
        assert!(view.items.is_empty());

        assert!(needs_more(&items, Some(&counts(9, &[])), &Filter::All, 2, 6, false));
        assert!(!needs_more(&items, Some(&counts(9, &[])), &Filter::All, 2, 6, true));
        assert!(!needs_more(&items, Some(&counts(9, &[])), &Filter::All, 1, 6, false));
    }

    #[test]
    fn test_filtered_page() {
        let items = window(&["Shoes", "Watches", "Shoes", "Clothing", "Shoes"]);
        let shoes = Filter::label("Shoes");
        let view = window_page(&items, Some(&counts(5, &[("Shoes", 3)])), &shoes, 1, 2);
        assert_eq!(view.total_pages, 2);
        assert_eq!(
            view.items.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            vec!["p0", "p2"]
        );

        let second = window_page(&items, Some(&counts(5, &[("Shoes", 3)])), &shoes, 2, 2);
        assert_eq!(second.items.len(), 1);
        assert!(!needs_more(&items, Some(&counts(5, &[("Shoes", 3)])), &shoes, 2, 2, false));
    }

    #[test]
    fn test_unknown_label_falls_back_to_loaded() {
        let items = window(&["New", "Shipped", "New"]);
        let new = Filter::label("New");
        let no_breakdown = counts(10, &[]);

        let view = window_page(&items, Some(&no_breakdown), &new, 1, 6);
        assert_eq!(view.total_pages, 1);
        assert_eq!(view.items.len(), 2);
        assert!(needs_more(&items, Some(&no_breakdown), &new, 1, 6, false));
        assert!(!needs_more(&items, Some(&counts(3, &[])), &new, 1, 6, false));
    }

    #[test]
    fn test_uncounted_window_pages_from_loaded_items() {
        let items = window(&["Shoes", "Shoes"]);

        let view = window_page(&items, None, &Filter::All, 3, 20);
        assert_eq!(view.total_pages, 1);
        assert_eq!(view.page, 1);
        assert_eq!(view.items.len(), 2);

        assert!(needs_more(&items, None, &Filter::All, 1, 20, false));
        assert!(!needs_more(&items, None, &Filter::All, 1, 20, true));
        assert!(!needs_more(&items, None, &Filter::All, 1, 2, false));
        assert_eq!(known_total(&items, None, &Filter::label("Watches")), 0);
    }

    #[test]
    fn test_items_keep_window_order() {
        let items = window(&["Shoes", "Shoes"]);
        let view = window_page(&items, Some(&counts(2, &[])), &Filter::All, 1, 6);
        assert_eq!(view.items[0].cursor(), Cursor::new(view.items[0].at, "p0"));
        assert!(view.items[0].at > view.items[1].at);
    }
}
