//! Virtual window calculation.
//!
//! Maps a scroll position onto the contiguous range of card indices that
//! should be materialized and the single active index. Every card shares one
//! extent (the full viewport), so the mapping is plain arithmetic and holds no
//! state between calls: callers pass the current geometry every time.

/// Scroll geometry in presentation units (terminal rows for the TUI).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportGeometry {
    pub scroll_offset: f64,
    pub viewport_extent: f64,
    pub item_extent: f64,
}

impl ViewportGeometry {
    pub fn new(viewport_extent: f64) -> Self {
        Self {
            scroll_offset: 0.0,
            viewport_extent,
            item_extent: viewport_extent,
        }
    }

    /// Scroll offset that puts `index` at the top of the viewport.
    pub fn offset_for_index(&self, index: usize) -> f64 {
        index as f64 * self.item_extent.max(0.0)
    }

    /// Total scrollable extent for `item_count` cards.
    pub fn total_extent(&self, item_count: usize) -> f64 {
        self.offset_for_index(item_count)
    }
}

/// Inclusive index range to keep materialized, plus the active index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub end: usize,
    pub active: usize,
}

impl Window {
    pub fn contains(&self, index: usize) -> bool {
        (self.start..=self.end).contains(&index)
    }

    /// Number of indices in the window. Never zero.
    pub fn count(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Computes the window for the given geometry. Returns `None` when there are no items.
pub fn compute(geometry: &ViewportGeometry, item_count: usize, buffer: usize) -> Option<Window> {
    if item_count == 0 {
        return None;
    }
    let last = item_count - 1;
    let offset = sanitize(geometry.scroll_offset);
    let viewport = sanitize(geometry.viewport_extent);

    let active = index_at(offset, geometry.item_extent).min(last);
    let start = active.saturating_sub(buffer);
    let visible_end = index_at(offset + viewport, geometry.item_extent);
    let end = visible_end.saturating_add(buffer).min(last).max(active);

    Some(Window { start, end, active })
}

fn index_at(offset: f64, item_extent: f64) -> usize {
    if item_extent <= 0.0 || !item_extent.is_finite() {
        return 0;
    }
    let index = (offset / item_extent).floor();
    if index >= usize::MAX as f64 {
        usize::MAX
    } else {
        index as usize
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn geometry(offset: f64, viewport: f64) -> ViewportGeometry {
        ViewportGeometry {
            scroll_offset: offset,
            viewport_extent: viewport,
            item_extent: viewport,
        }
    }

    #[test]
    fn empty_feed_has_no_window() {
        assert_eq!(compute(&geometry(0.0, 40.0), 0, 3), None);
        assert_eq!(compute(&geometry(400.0, 40.0), 0, 0), None);
    }

    #[test]
    fn top_of_feed() {
        let window = compute(&geometry(0.0, 40.0), 50, 3).unwrap();
        // the viewport's bottom edge touches card 1, so it counts as visible
        assert_eq!(window, Window { start: 0, end: 4, active: 0 });
    }

    #[test]
    fn middle_of_feed_with_partial_scroll() {
        let window = compute(&geometry(4.5 * 40.0, 40.0), 50, 2).unwrap();
        assert_eq!(window, Window { start: 2, end: 7, active: 4 });
        assert!(window.contains(4));
        assert!(!window.contains(8));
        assert_eq!(window.count(), 6);
    }

    #[test]
    fn clamps_past_the_end() {
        let window = compute(&geometry(10_000.0, 40.0), 5, 2).unwrap();
        assert_eq!(window, Window { start: 2, end: 4, active: 4 });
    }

    #[test]
    fn extent_change_is_not_cached() {
        let before = compute(&geometry(120.0, 40.0), 20, 1).unwrap();
        assert_eq!(before.active, 3);
        let after = compute(&geometry(120.0, 60.0), 20, 1).unwrap();
        assert_eq!(after.active, 2);
    }

    #[test]
    fn degenerate_geometry_stays_total() {
        let zero_extent = ViewportGeometry {
            scroll_offset: 500.0,
            viewport_extent: 0.0,
            item_extent: 0.0,
        };
        assert_eq!(
            compute(&zero_extent, 10, 2),
            Some(Window { start: 0, end: 2, active: 0 })
        );
        let nan = geometry(f64::NAN, 40.0);
        assert_eq!(compute(&nan, 10, 0).unwrap().active, 0);
    }

    #[test]
    fn offsets_round_trip_to_indices() {
        let geo = geometry(0.0, 37.0);
        for index in [0usize, 1, 9, 123] {
            let at = ViewportGeometry {
                scroll_offset: geo.offset_for_index(index),
                ..geo
            };
            assert_eq!(compute(&at, 500, 0).unwrap().active, index);
        }
        assert_eq!(geo.total_extent(3), 111.0);
    }

    proptest! {
        #[test]
        fn active_is_inside_window(
            offset in 0.0f64..1.0e6,
            viewport in 1.0f64..500.0,
            item_count in 1usize..10_000,
            buffer in 0usize..8,
        ) {
            let window = compute(&geometry(offset, viewport), item_count, buffer).unwrap();
            prop_assert!(window.start <= window.active);
            prop_assert!(window.active <= window.end);
            prop_assert!(window.end < item_count);
            prop_assert!(window.active - window.start <= buffer);
        }
    }
}
