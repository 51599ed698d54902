//! Page slicing bounded by messaging-platform limits.

/// Prev and next affordances reserved on every paged message.
pub const NAV_BUTTONS: usize = 2;

/// One page of an ordered list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    /// 1-based page number after clamping.
    pub page: usize,
    pub total_pages: usize,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Slice `items` into the requested page.
///
/// The page number is clamped into `[1, total_pages]`, so stale or forged
/// page numbers never fail. An empty list has exactly one, empty, page.
pub fn paginate<T: Clone>(items: &[T], page_size: usize, requested: i64) -> Page<T> {
    let page_size = page_size.max(1);
    let total_pages = items.len().div_ceil(page_size).max(1);
    let page = requested.clamp(1, total_pages as i64) as usize;
    let start = (page - 1) * page_size;
    let end = (start + page_size).min(items.len());
    Page {
        page,
        total_pages,
        items: items.get(start..end).map(<[T]>::to_vec).unwrap_or_default(),
    }
}

/// Largest page size that still fits `limit` once the prev/next affordances
/// and `fixed_buttons` are added.
///
/// Zero when the affordances alone fill `limit`.
pub fn page_size_with_headroom(limit: usize, fixed_buttons: usize) -> usize {
    limit.saturating_sub(NAV_BUTTONS + fixed_buttons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_three_pages_of_23() {
        let items: Vec<u32> = (0..23).collect();
        let p = paginate(&items, 10, 1);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.items.len(), 10);
        assert!(!p.has_prev());
        assert!(p.has_next());

        let last = paginate(&items, 10, 3);
        assert_eq!(last.items, vec![20, 21, 22]);
        assert!(last.has_prev());
        assert!(!last.has_next());
    }

    #[test]
    fn test_clamps_out_of_range() {
        let items: Vec<u32> = (0..23).collect();
        assert_eq!(paginate(&items, 10, 5).page, 3);
        assert_eq!(paginate(&items, 10, 0).page, 1);
        assert_eq!(paginate(&items, 10, -7).page, 1);
        assert_eq!(paginate(&items, 10, i64::MAX).page, 3);
    }

    #[test]
    fn test_empty_list_has_one_page() {
        let items: Vec<u32> = Vec::new();
        let p = paginate(&items, 10, 4);
        assert_eq!(p.page, 1);
        assert_eq!(p.total_pages, 1);
        assert!(p.items.is_empty());
        assert!(!p.has_prev());
        assert!(!p.has_next());
    }

    #[test]
    fn test_zero_page_size_treated_as_one() {
        let items = vec!['a', 'b'];
        let p = paginate(&items, 0, 2);
        assert_eq!(p.total_pages, 2);
        assert_eq!(p.items, vec!['b']);
    }

    #[test]
    fn test_exact_multiple() {
        let items: Vec<u32> = (0..20).collect();
        let p = paginate(&items, 10, 2);
        assert_eq!(p.total_pages, 2);
        assert_eq!(p.items.len(), 10);
    }

    #[test]
    fn test_page_size_with_headroom() {
        // 13 quick replies: 10 sizes + prev + next + "not sure"
        assert_eq!(page_size_with_headroom(13, 1), 10);
        assert_eq!(page_size_with_headroom(10, 0), 8);
        assert_eq!(page_size_with_headroom(4, 1), 1);
        assert_eq!(page_size_with_headroom(3, 1), 0);
        assert_eq!(page_size_with_headroom(2, 5), 0);
    }

    proptest! {
        #[test]
        fn prop_page_always_in_bounds(len in 0usize..200, size in 1usize..20, req in any::<i64>()) {
            let items: Vec<usize> = (0..len).collect();
            let p = paginate(&items, size, req);
            prop_assert!(p.page >= 1 && p.page <= p.total_pages);
            prop_assert!(p.items.len() <= size);
            if len > 0 {
                prop_assert!(!p.items.is_empty());
            }
        }
    }
}
