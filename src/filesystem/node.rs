use std::collections::BTreeMap;

use crate::filesystem::entry::{OPAQUE_WHITEOUT, WHITEOUT_PREFIX};
use crate::filesystem::{ChangeStatus, Entry};

/// A single element of a [`LayerTree`](crate::filesystem::LayerTree).
///
/// Children are keyed by their raw name, so iteration is always alphabetical.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Node {
    name: String,
    entry: Option<Entry>,
    status: ChangeStatus,
    layer: Option<usize>,
    children: BTreeMap<String, Node>,
}

impl Node {
    pub(crate) fn root() -> Self {
        Node::default()
    }

    pub(crate) fn new(name: impl Into<String>) -> Self {
        Node {
            name: name.into(),
            ..Node::default()
        }
    }

    /// Raw name, including any whiteout prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name with the whiteout prefix stripped.
    pub fn display_name(&self) -> &str {
        strip_whiteout(&self.name)
    }

    pub fn entry(&self) -> Option<&Entry> {
        self.entry.as_ref()
    }

    pub(crate) fn set_entry(&mut self, entry: Entry) {
        self.entry = Some(entry);
    }

    pub fn status(&self) -> ChangeStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: ChangeStatus) {
        self.status = status;
    }

    /// Layer that last wrote this node. Only composite trees record it.
    pub fn layer(&self) -> Option<usize> {
        self.layer
    }

    pub(crate) fn set_layer(&mut self, layer: usize) {
        self.layer = Some(layer);
    }

    pub fn children(&self) -> impl ExactSizeIterator<Item = &Node> {
        self.children.values()
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.get(name)
    }

    pub(crate) fn children_mut(&mut self) -> &mut BTreeMap<String, Node> {
        &mut self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_whiteout(&self) -> bool {
        is_whiteout(&self.name)
    }

    pub fn is_opaque_whiteout(&self) -> bool {
        self.name == OPAQUE_WHITEOUT
    }

    /// Nodes without a payload are directories implied by their descendants.
    pub fn is_dir(&self) -> bool {
        self.entry.as_ref().is_none_or(Entry::is_dir)
    }

    /// Number of nodes in this subtree, this node included.
    pub fn subtree_len(&self) -> usize {
        1 + self.children().map(Node::subtree_len).sum::<usize>()
    }

    /// Bytes held by this node and every descendant.
    pub fn total_size(&self) -> u64 {
        let own = self.entry.as_ref().map_or(0, Entry::size);
        self.children()
            .map(Node::total_size)
            .fold(own, u64::saturating_add)
    }

    pub(crate) fn descend(&self, segments: &[&str]) -> Option<&Node> {
        segments
            .iter()
            .try_fold(self, |node, segment| node.children.get(*segment))
    }

    pub(crate) fn descend_mut(&mut self, segments: &[&str]) -> Option<&mut Node> {
        segments
            .iter()
            .try_fold(self, |node, segment| node.children.get_mut(*segment))
    }

    pub(crate) fn reset_status(&mut self) {
        self.status = ChangeStatus::Unchanged;
        for child in self.children.values_mut() {
            child.reset_status();
        }
    }
}

/// True iff the raw name carries the deletion-marker prefix.
pub fn is_whiteout(name: &str) -> bool {
    name.starts_with(WHITEOUT_PREFIX)
}

pub fn strip_whiteout(name: &str) -> &str {
    name.strip_prefix(WHITEOUT_PREFIX).unwrap_or(name)
}

pub(crate) fn join_path(parent: &str, name: &str) -> String {
    format!("{parent}/{name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::{Fingerprint, LayerTree};
    use rstest::rstest;

    #[rstest]
    #[case(".wh.hosts", true)]
    #[case(".wh..wh..opq", true)]
    #[case(".whatever", false)]
    #[case("hosts.wh.", false)]
    fn whiteout_names(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_whiteout(name), expected);
    }

    #[test]
    fn display_name_strips_marker_prefix() {
        let node = Node::new(".wh.hosts");
        assert_eq!(node.name(), ".wh.hosts");
        assert_eq!(node.display_name(), "hosts");
        assert!(node.is_whiteout());
        assert!(!node.is_opaque_whiteout());
        assert!(Node::new(OPAQUE_WHITEOUT).is_opaque_whiteout());
    }

    #[test]
    fn subtree_counts_and_sizes() {
        let mut tree = LayerTree::new();
        tree.insert_path("/a/x", Entry::file("/a/x", Fingerprint::of(b"x"), 10))
            .unwrap();
        tree.insert_path("/a/y", Entry::file("/a/y", Fingerprint::of(b"y"), 5))
            .unwrap();

        let a = tree.get_node("/a").unwrap();
        assert_eq!(a.subtree_len(), 3);
        assert_eq!(a.total_size(), 15);
        assert!(a.is_dir());
        assert!(!tree.get_node("/a/x").unwrap().is_dir());
    }

    #[test]
    fn total_size_saturates() {
        let mut tree = LayerTree::new();
        for path in ["/big/one", "/big/two"] {
            tree.insert_path(path, Entry::file(path, Fingerprint::of(b"b"), u64::MAX / 2 + 1))
                .unwrap();
        }
        assert_eq!(tree.get_node("/big").unwrap().total_size(), u64::MAX);
    }
}
