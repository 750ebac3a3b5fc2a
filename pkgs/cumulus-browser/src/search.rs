//! Search results overlay
//!
//! While a query is active its results replace the directory listing in the
//! visible content, but the directory pagination underneath is left alone.
//! Query changes are debounced through a single cancellable timer.

use cumulus_fs::{ApiError, NodeId, Search, SearchPage};
use std::collections::HashSet;
use tracing::debug;

use crate::ids::{RequestId, TimerId};
use crate::paginator::{PageWindow, PagedContent};

/// Timers to cancel and start after a query change
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimerChange {
    pub cancel: Option<TimerId>,
    pub start: Option<TimerId>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOverlay {
    search: Option<Search>,
    results: PagedContent,
    pending_timer: Option<TimerId>,
}

impl SearchOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(&self) -> Option<&Search> {
        self.search.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.search.is_some()
    }

    /// A query change is waiting for its debounce timer
    pub fn is_debouncing(&self) -> bool {
        self.pending_timer.is_some()
    }

    pub fn pending_timer(&self) -> Option<TimerId> {
        self.pending_timer
    }

    pub fn results(&self) -> &PagedContent {
        &self.results
    }

    /// Replace the search descriptor. A blank query deactivates the overlay.
    ///
    /// Any change drops the accumulated results and restarts the debounce
    /// with `timer`; setting the same descriptor again changes nothing.
    pub fn set_query(&mut self, search: Option<Search>, timer: TimerId) -> TimerChange {
        let search = search.filter(|s| !s.query.trim().is_empty());
        if search == self.search {
            debug!("Search unchanged, nothing to do");
            return TimerChange::default();
        }

        let cancel = self.pending_timer.take();
        self.results.reset();
        self.search = search;

        let start = self.search.as_ref().map(|_| timer);
        self.pending_timer = start;
        TimerChange { cancel, start }
    }

    /// Returns true when `timer` is the latest debounce timer, which means
    /// the first page of results should now be requested.
    pub fn timer_fired(&mut self, timer: TimerId) -> bool {
        if self.pending_timer == Some(timer) {
            self.pending_timer = None;
            true
        } else {
            debug!("Ignoring superseded search timer {}", timer);
            false
        }
    }

    pub fn begin_next_page(&mut self, request: RequestId, page_size: usize) -> Option<PageWindow> {
        if self.search.is_none() || self.pending_timer.is_some() {
            return None;
        }
        self.results.begin_next_page(request, page_size)
    }

    pub fn apply_page(&mut self, request: RequestId, page: SearchPage) -> bool {
        self.results
            .apply_open_ended_page(request, page.items, page.has_more)
    }

    pub fn apply_error(&mut self, request: RequestId, error: ApiError) -> bool {
        self.results.apply_error(request, error)
    }

    pub fn remove(&mut self, removed: &HashSet<NodeId>) -> usize {
        self.results.remove(removed)
    }

    /// Deactivate the overlay, returning the debounce timer to cancel
    pub fn clear(&mut self) -> Option<TimerId> {
        self.search = None;
        self.results.reset();
        self.pending_timer.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulus_fs::{File, Node, NodeTypeFilter};

    fn page(paths: &[&str], has_more: bool) -> SearchPage {
        SearchPage {
            items: paths
                .iter()
                .map(|p| Node::from(File::new(p, "alice", 1)))
                .collect(),
            has_more,
        }
    }

    #[test]
    fn test_new_query_cancels_previous_timer() {
        let mut overlay = SearchOverlay::new();
        let first = overlay.set_query(Some(Search::new("rep")), TimerId(1));
        assert_eq!(first, TimerChange { cancel: None, start: Some(TimerId(1)) });

        let second = overlay.set_query(Some(Search::new("report")), TimerId(2));
        assert_eq!(second.cancel, Some(TimerId(1)));
        assert_eq!(second.start, Some(TimerId(2)));

        assert!(!overlay.timer_fired(TimerId(1)));
        assert!(overlay.is_debouncing());
        assert!(overlay.timer_fired(TimerId(2)));
        assert!(!overlay.is_debouncing());
    }

    #[test]
    fn test_clearing_before_timer_fires_issues_nothing() {
        let mut overlay = SearchOverlay::new();
        overlay.set_query(Some(Search::new("report")), TimerId(1));
        let change = overlay.set_query(None, TimerId(2));
        assert_eq!(change, TimerChange { cancel: Some(TimerId(1)), start: None });

        assert!(!overlay.timer_fired(TimerId(1)));
        assert!(overlay.begin_next_page(RequestId(3), 50).is_none());
        assert!(!overlay.is_active());
    }

    #[test]
    fn test_no_page_while_debouncing() {
        let mut overlay = SearchOverlay::new();
        overlay.set_query(Some(Search::new("report")), TimerId(1));
        assert!(overlay.begin_next_page(RequestId(2), 50).is_none());
        overlay.timer_fired(TimerId(1));
        assert!(overlay.begin_next_page(RequestId(3), 50).is_some());
    }

    #[test]
    fn test_parameter_change_resets_results() {
        let mut overlay = SearchOverlay::new();
        overlay.set_query(Some(Search::new("report")), TimerId(1));
        overlay.timer_fired(TimerId(1));
        overlay.begin_next_page(RequestId(2), 2);
        overlay.apply_page(RequestId(2), page(&["/a/report1", "/a/report2"], true));
        assert_eq!(overlay.results().len(), 2);
        assert_eq!(overlay.results().content_size(), Some(3));

        let files_only = Search::new("report").with_node_type(NodeTypeFilter::File);
        overlay.set_query(Some(files_only), TimerId(3));
        assert!(overlay.results().is_empty());
        assert!(!overlay.apply_page(RequestId(2), page(&["/a/report3"], false)));
    }

    #[test]
    fn test_same_query_is_noop_and_blank_query_deactivates() {
        let mut overlay = SearchOverlay::new();
        overlay.set_query(Some(Search::new("report")), TimerId(1));
        let change = overlay.set_query(Some(Search::new("report")), TimerId(2));
        assert_eq!(change, TimerChange::default());
        assert_eq!(overlay.pending_timer(), Some(TimerId(1)));

        overlay.set_query(Some(Search::new("   ")), TimerId(3));
        assert!(!overlay.is_active());
    }
}
