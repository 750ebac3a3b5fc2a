//! Tri-state selection over node ids

use cumulus_fs::{Node, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// `All` covers every node of the directory, including pages that are not
/// loaded yet. `Some` is never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "ids")]
pub enum Selection {
    #[default]
    None,
    All,
    Some(BTreeSet<NodeId>),
}

impl Selection {
    pub fn select(&mut self, id: &str) {
        match self {
            Selection::None => *self = Selection::Some(BTreeSet::from([id.to_string()])),
            Selection::Some(ids) => {
                ids.insert(id.to_string());
            }
            Selection::All => {}
        }
    }

    /// Deselect one id. Leaving `All` materializes the complement against
    /// `known_ids`, the ids currently loaded.
    pub fn deselect<'a, I>(&mut self, id: &str, known_ids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        match self {
            Selection::None => {}
            Selection::All => {
                let rest: BTreeSet<NodeId> = known_ids
                    .into_iter()
                    .filter(|known| *known != id)
                    .map(str::to_string)
                    .collect();
                *self = Self::from_ids(rest);
            }
            Selection::Some(ids) => {
                ids.remove(id);
                if ids.is_empty() {
                    *self = Selection::None;
                }
            }
        }
    }

    pub fn select_all(&mut self) {
        *self = Selection::All;
    }

    pub fn deselect_all(&mut self) {
        *self = Selection::None;
    }

    /// Behaviour of the header checkbox: a partial selection promotes to `All`
    pub fn toggle_all(&mut self) {
        if *self == Selection::All {
            self.deselect_all();
        } else {
            self.select_all();
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        match self {
            Selection::None => false,
            Selection::All => true,
            Selection::Some(ids) => ids.contains(id),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Selection::None
    }

    /// Drop ids of nodes that no longer exist
    pub fn prune(&mut self, removed: &HashSet<NodeId>) {
        if let Selection::Some(ids) = self {
            ids.retain(|id| !removed.contains(id));
            if ids.is_empty() {
                *self = Selection::None;
            }
        }
    }

    fn from_ids(ids: BTreeSet<NodeId>) -> Self {
        if ids.is_empty() {
            Selection::None
        } else {
            Selection::Some(ids)
        }
    }
}

/// Loaded nodes covered by `selection`, in content order
pub fn selected_nodes(content: &[Node], selection: &Selection) -> Vec<Node> {
    content
        .iter()
        .filter(|node| selection.is_selected(node.id()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulus_fs::File;

    fn ids(values: &[&str]) -> BTreeSet<NodeId> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_select_and_deselect_round_trip() {
        let mut selection = Selection::None;
        selection.select("a");
        assert_eq!(selection, Selection::Some(ids(&["a"])));
        selection.deselect("a", []);
        assert_eq!(selection, Selection::None);

        let mut selection = Selection::Some(ids(&["a", "b"]));
        let before = selection.clone();
        selection.select("c");
        selection.deselect("c", []);
        assert_eq!(selection, before);
    }

    #[test]
    fn test_select_on_all_is_noop() {
        let mut selection = Selection::All;
        selection.select("x");
        assert_eq!(selection, Selection::All);
        assert!(selection.is_selected("never-loaded"));
    }

    #[test]
    fn test_deselect_from_all_materializes_complement() {
        let mut selection = Selection::All;
        selection.deselect("7", ["5", "6", "7", "8"]);
        assert_eq!(selection, Selection::Some(ids(&["5", "6", "8"])));

        let mut selection = Selection::All;
        selection.deselect("only", ["only"]);
        assert_eq!(selection, Selection::None);
    }

    #[test]
    fn test_toggle_all() {
        let mut selection = Selection::Some(ids(&["a"]));
        selection.toggle_all();
        assert_eq!(selection, Selection::All);
        selection.toggle_all();
        assert_eq!(selection, Selection::None);
        selection.toggle_all();
        assert_eq!(selection, Selection::All);
    }

    #[test]
    fn test_prune_collapses_to_none() {
        let mut selection = Selection::Some(ids(&["a", "b"]));
        selection.prune(&HashSet::from(["a".to_string(), "b".to_string()]));
        assert!(selection.is_empty());

        let mut selection = Selection::All;
        selection.prune(&HashSet::from(["a".to_string()]));
        assert_eq!(selection, Selection::All);
    }

    #[test]
    fn test_selected_nodes_keeps_content_order() {
        let content: Vec<Node> = ["/a", "/b", "/c"]
            .iter()
            .map(|p| Node::from(File::new(p, "alice", 1)))
            .collect();
        let selection = Selection::Some(ids(&[content[2].id(), content[0].id()]));

        let picked = selected_nodes(&content, &selection);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].path(), "/a");
        assert_eq!(picked[1].path(), "/c");
        assert_eq!(selected_nodes(&content, &Selection::All).len(), 3);
    }
}
