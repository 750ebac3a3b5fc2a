//! Offset-based incremental loading of an ordered node list
//!
//! The same structure backs both the directory listing and the search
//! results. Content only grows by appending fetched pages (or by spliced
//! single nodes), never by reordering.
//!
//! The next page offset counts what the server has delivered, not what is
//! shown. A spliced node lives past the server's window until a page
//! delivers it, so it never shifts the offset.

use cumulus_fs::{ApiError, Node, NodeId};
use std::collections::HashSet;
use tracing::debug;

use crate::ids::RequestId;

/// Offset and limit of the next page to request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PagedContent {
    items: Vec<Node>,
    ids: HashSet<NodeId>,
    /// Spliced nodes no page has delivered yet
    spliced: HashSet<NodeId>,
    /// Server position of the next page
    fetched: usize,
    exhausted: bool,
    content_size: Option<usize>,
    in_flight: Option<RequestId>,
    error: Option<ApiError>,
}

impl PagedContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Node] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of items, `None` until the first page arrives
    pub fn content_size(&self) -> Option<usize> {
        self.content_size
    }

    pub fn is_loading_more(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<RequestId> {
        self.in_flight
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    /// Whether the server has no further pages
    pub fn is_complete(&self) -> bool {
        self.exhausted
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        if !self.ids.contains(id) {
            return None;
        }
        self.items.iter().find(|node| node.id() == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|node| node.id())
    }

    /// Claim the next page for `request`.
    ///
    /// Returns `None` (and changes nothing) when a page is already in flight
    /// or every item is loaded.
    pub fn begin_next_page(&mut self, request: RequestId, page_size: usize) -> Option<PageWindow> {
        if let Some(pending) = self.in_flight {
            debug!("Page {} already in flight, ignoring load request", pending);
            return None;
        }
        if self.is_complete() {
            debug!("All {} items loaded, nothing to fetch", self.items.len());
            return None;
        }

        self.in_flight = Some(request);
        self.error = None;
        Some(PageWindow {
            offset: self.fetched,
            limit: page_size,
        })
    }

    fn accepts(&self, request: RequestId) -> bool {
        if self.in_flight == Some(request) {
            true
        } else {
            debug!("Discarding stale page response {}", request);
            false
        }
    }

    /// Apply a page whose response carried the total item count
    pub fn apply_page(&mut self, request: RequestId, items: Vec<Node>, total_count: usize) -> bool {
        if !self.accepts(request) {
            return false;
        }
        self.in_flight = None;
        let delivered = items.len();
        let added = self.extend(items);
        self.exhausted = added == 0 || self.fetched >= total_count;
        if self.exhausted && delivered > 0 && self.fetched < total_count {
            debug!(
                "Page at {} brought nothing new, treating the list as complete",
                self.fetched - delivered
            );
        }
        self.settle_size(total_count);
        true
    }

    /// Apply a page whose response only says whether more items exist.
    ///
    /// The size becomes `loaded + 1` while more exist, so the list stays
    /// incomplete exactly until the last page. A page that adds nothing
    /// new also ends the list.
    pub fn apply_open_ended_page(
        &mut self,
        request: RequestId,
        items: Vec<Node>,
        has_more: bool,
    ) -> bool {
        if !self.accepts(request) {
            return false;
        }
        self.in_flight = None;
        let added = self.extend(items);
        self.exhausted = added == 0 || !has_more;
        self.settle_size(self.items.len() + 1);
        true
    }

    /// Record a failed page. Already loaded items are kept.
    pub fn apply_error(&mut self, request: RequestId, error: ApiError) -> bool {
        if !self.accepts(request) {
            return false;
        }
        self.in_flight = None;
        self.error = Some(error);
        true
    }

    /// Splice a single new node at the end of the list.
    ///
    /// The server offset stays put. When a later page delivers the same
    /// node it is counted there and not shown twice.
    pub fn append(&mut self, node: Node) -> bool {
        if self.ids.contains(node.id()) {
            return false;
        }
        self.ids.insert(node.id().to_string());
        if !self.exhausted {
            self.spliced.insert(node.id().to_string());
        }
        self.items.push(node);
        if let Some(size) = self.content_size.as_mut() {
            *size += 1;
        }
        true
    }

    /// Splice out nodes, returning how many were present
    pub fn remove(&mut self, removed: &HashSet<NodeId>) -> usize {
        let before = self.items.len();
        self.items.retain(|node| !removed.contains(node.id()));
        self.ids.retain(|id| !removed.contains(id));
        let count = before - self.items.len();

        // Delivered nodes leave the server's list too, pulling later ones back
        let undelivered = removed
            .iter()
            .filter(|id| self.spliced.remove(id.as_str()))
            .count();
        self.fetched = self
            .fetched
            .saturating_sub(count.saturating_sub(undelivered));

        if let Some(size) = self.content_size.as_mut() {
            *size = size.saturating_sub(count);
        }
        count
    }

    /// Forget everything, including any page in flight
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Append a delivered page, returning how many nodes were new
    fn extend(&mut self, items: Vec<Node>) -> usize {
        self.fetched += items.len();
        let before = self.items.len();
        for node in items {
            if self.spliced.remove(node.id()) {
                continue;
            }
            if self.ids.insert(node.id().to_string()) {
                self.items.push(node);
            } else {
                debug!("Skipping duplicate node {}", node.id());
            }
        }
        self.items.len() - before
    }

    fn settle_size(&mut self, reported: usize) {
        let loaded = self.items.len();
        self.content_size = Some(if self.exhausted {
            loaded
        } else {
            reported.max(loaded + 1)
        });
    }
}

/// Whether the rows visible on screen are close enough to the end of the
/// loaded list to warrant fetching the next page.
pub fn should_load_more(
    visible_stop_index: usize,
    loaded: usize,
    total: Option<usize>,
    threshold: f64,
) -> bool {
    let has_more = total.map_or(true, |total| loaded < total);
    has_more && visible_stop_index as f64 > loaded as f64 * threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulus_fs::File;

    fn nodes(range: std::ops::Range<usize>) -> Vec<Node> {
        range
            .map(|i| Node::from(File::new(&format!("/docs/f{:03}", i), "alice", 1)))
            .collect()
    }

    #[test]
    fn test_pages_append_in_order() {
        let mut content = PagedContent::new();
        let all = nodes(0..120);

        let window = content.begin_next_page(RequestId(1), 50).unwrap();
        assert_eq!(window, PageWindow { offset: 0, limit: 50 });
        assert!(content.is_loading_more());
        assert!(content.apply_page(RequestId(1), all[0..50].to_vec(), 120));

        let window = content.begin_next_page(RequestId(2), 50).unwrap();
        assert_eq!(window.offset, 50);
        assert!(content.apply_page(RequestId(2), all[50..100].to_vec(), 120));

        assert_eq!(content.items(), &all[0..100]);
        assert_eq!(content.content_size(), Some(120));
        assert!(!content.is_loading_more());
    }

    #[test]
    fn test_second_load_while_in_flight_is_noop() {
        let mut content = PagedContent::new();
        assert!(content.begin_next_page(RequestId(1), 50).is_some());
        assert!(content.begin_next_page(RequestId(2), 50).is_none());
        assert_eq!(content.in_flight(), Some(RequestId(1)));
    }

    #[test]
    fn test_complete_list_never_loads() {
        let mut content = PagedContent::new();
        content.begin_next_page(RequestId(1), 50);
        content.apply_page(RequestId(1), nodes(0..3), 3);
        assert!(content.is_complete());
        assert!(content.begin_next_page(RequestId(2), 50).is_none());
        assert!(!content.is_loading_more());
    }

    #[test]
    fn test_error_keeps_loaded_items() {
        let mut content = PagedContent::new();
        content.begin_next_page(RequestId(1), 2);
        content.apply_page(RequestId(1), nodes(0..2), 4);
        content.begin_next_page(RequestId(2), 2);
        assert!(content.apply_error(RequestId(2), ApiError::transport("offline")));

        assert_eq!(content.len(), 2);
        assert!(content.error().is_some());
        assert!(content.begin_next_page(RequestId(3), 2).is_some());
        assert!(content.error().is_none());
    }

    #[test]
    fn test_response_after_reset_is_stale() {
        let mut content = PagedContent::new();
        content.begin_next_page(RequestId(1), 50);
        content.reset();
        assert!(!content.apply_page(RequestId(1), nodes(0..5), 5));
        assert!(content.is_empty());
        assert_eq!(content.content_size(), None);
    }

    #[test]
    fn test_duplicates_are_skipped() {
        let mut content = PagedContent::new();
        let page = nodes(0..3);
        content.begin_next_page(RequestId(1), 3);
        content.apply_page(RequestId(1), page.clone(), 6);
        content.begin_next_page(RequestId(2), 3);
        content.apply_page(RequestId(2), vec![page[2].clone()], 6);
        assert_eq!(content.len(), 3);

        // Nothing new came back, so there is nothing left to ask for
        assert!(content.is_complete());
        assert_eq!(content.content_size(), Some(3));
        assert!(content.begin_next_page(RequestId(3), 3).is_none());
    }

    #[test]
    fn test_empty_page_completes() {
        let mut content = PagedContent::new();
        content.begin_next_page(RequestId(1), 5);
        content.apply_page(RequestId(1), nodes(0..5), 8);
        content.begin_next_page(RequestId(2), 5);
        content.apply_page(RequestId(2), Vec::new(), 8);

        assert!(content.is_complete());
        assert_eq!(content.content_size(), Some(5));
    }

    #[test]
    fn test_splice_into_partial_list_keeps_offset() {
        let mut content = PagedContent::new();
        let all = nodes(0..121);
        let uploaded = all[120].clone();

        content.begin_next_page(RequestId(1), 50);
        content.apply_page(RequestId(1), all[0..50].to_vec(), 120);
        assert!(content.append(uploaded.clone()));
        assert_eq!(content.content_size(), Some(121));

        let window = content.begin_next_page(RequestId(2), 50).unwrap();
        assert_eq!(window.offset, 50);
        content.apply_page(RequestId(2), all[50..100].to_vec(), 121);

        let window = content.begin_next_page(RequestId(3), 50).unwrap();
        assert_eq!(window.offset, 100);
        content.apply_page(RequestId(3), all[100..121].to_vec(), 121);

        assert_eq!(content.len(), 121);
        assert!(content.is_complete());
        assert_eq!(content.content_size(), Some(121));
        assert!(content.contains(all[50].id()));
        assert_eq!(content.items().iter().filter(|n| n.id() == uploaded.id()).count(), 1);
        assert!(content.begin_next_page(RequestId(4), 50).is_none());
    }

    #[test]
    fn test_splice_inside_loaded_window_still_completes() {
        let mut content = PagedContent::new();
        let mut all = nodes(0..10);
        let uploaded = Node::from(File::new("/docs/f001b", "alice", 1));

        content.begin_next_page(RequestId(1), 4);
        content.apply_page(RequestId(1), all[0..4].to_vec(), 10);
        content.append(uploaded.clone());

        // The server now sorts the new node inside the first page
        all.insert(2, uploaded);
        content.begin_next_page(RequestId(2), 4);
        content.apply_page(RequestId(2), all[4..8].to_vec(), 11);
        content.begin_next_page(RequestId(3), 4);
        content.apply_page(RequestId(3), all[8..11].to_vec(), 11);

        assert_eq!(content.len(), 11);
        assert!(content.is_complete());
        assert!(all.iter().all(|node| content.contains(node.id())));
    }

    #[test]
    fn test_removal_pulls_offset_back() {
        let mut content = PagedContent::new();
        let mut all = nodes(0..6);

        content.begin_next_page(RequestId(1), 3);
        content.apply_page(RequestId(1), all[0..3].to_vec(), 6);
        let gone = all.remove(1);
        content.remove(&HashSet::from([gone.id().to_string()]));

        let window = content.begin_next_page(RequestId(2), 3).unwrap();
        assert_eq!(window.offset, 2);
        content.apply_page(RequestId(2), all[2..5].to_vec(), 5);

        assert_eq!(content.items(), &all[..]);
        assert!(content.is_complete());
    }

    #[test]
    fn test_open_ended_size() {
        let mut content = PagedContent::new();
        content.begin_next_page(RequestId(1), 2);
        content.apply_open_ended_page(RequestId(1), nodes(0..2), true);
        assert_eq!(content.content_size(), Some(3));
        assert!(!content.is_complete());

        content.begin_next_page(RequestId(2), 2);
        content.apply_open_ended_page(RequestId(2), nodes(2..3), false);
        assert_eq!(content.content_size(), Some(3));
        assert!(content.is_complete());
    }

    #[test]
    fn test_splice_adjusts_size() {
        let mut content = PagedContent::new();
        let page = nodes(0..3);
        content.begin_next_page(RequestId(1), 3);
        content.apply_page(RequestId(1), page.clone(), 3);

        assert!(content.append(nodes(10..11).remove(0)));
        assert!(!content.append(page[0].clone()));
        assert_eq!(content.content_size(), Some(4));

        let removed = HashSet::from([page[0].id().to_string(), page[1].id().to_string()]);
        assert_eq!(content.remove(&removed), 2);
        assert_eq!(content.content_size(), Some(2));
        assert!(!content.contains(page[0].id()));
    }

    #[test]
    fn test_should_load_more() {
        assert!(!should_load_more(10, 50, Some(120), 0.7));
        assert!(!should_load_more(35, 50, Some(120), 0.7));
        assert!(should_load_more(36, 50, Some(120), 0.7));
        assert!(!should_load_more(49, 120, Some(120), 0.7));
        assert!(should_load_more(1, 0, None, 0.7));
    }
}
