use std::collections::BTreeSet;

use snafu::Snafu;

use crate::filesystem::node::join_path;
use crate::filesystem::{Entry, Node};

/// Path-indexed hierarchy of nodes describing one layer, or the composite of several.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerTree {
    root: Node,
    size: usize,
}

impl LayerTree {
    pub fn new() -> Self {
        LayerTree {
            root: Node::root(),
            size: 0,
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> Result<Self, TreeError> {
        let mut tree = LayerTree::new();
        for entry in entries {
            let path = entry.path().to_string();
            tree.insert_path(&path, entry)?;
        }
        Ok(tree)
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Number of nodes below the root.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Attaches `entry` at `path`, creating implied directories on the way.
    ///
    /// An existing node keeps its children and only has its payload replaced.
    pub fn insert_path(&mut self, path: &str, entry: Entry) -> Result<&mut Node, TreeError> {
        let segments = path_segments(path)?;
        let node = self.ensure_segments(&segments);
        node.set_entry(entry);
        Ok(node)
    }

    /// Detaches the subtree at `path` and returns it.
    pub fn remove_path(&mut self, path: &str) -> Result<Node, TreeError> {
        let segments = path_segments(path)?;
        self.remove_segments(&segments)
            .ok_or_else(|| TreeError::PathNotFound {
                path: path.to_string(),
            })
    }

    /// Looks up `path`; `/` resolves to the root.
    pub fn get_node(&self, path: &str) -> Option<&Node> {
        self.root.descend(&split_path(path))
    }

    pub fn get_node_mut(&mut self, path: &str) -> Option<&mut Node> {
        self.root.descend_mut(&split_path(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get_node(path).is_some()
    }

    /// Deep, fully independent clone.
    pub fn copy(&self) -> LayerTree {
        self.clone()
    }

    /// Sum of the payload sizes of every node.
    pub fn total_size(&self) -> u64 {
        self.root.total_size()
    }

    pub(crate) fn get_segments(&self, segments: &[&str]) -> Option<&Node> {
        self.root.descend(segments)
    }

    pub(crate) fn get_segments_mut(&mut self, segments: &[&str]) -> Option<&mut Node> {
        self.root.descend_mut(segments)
    }

    pub(crate) fn ensure_segments(&mut self, segments: &[&str]) -> &mut Node {
        let mut created = 0;
        let mut current = &mut self.root;
        for segment in segments {
            current = current
                .children_mut()
                .entry((*segment).to_string())
                .or_insert_with(|| {
                    created += 1;
                    Node::new(*segment)
                });
        }
        self.size += created;
        current
    }

    pub(crate) fn remove_segments(&mut self, segments: &[&str]) -> Option<Node> {
        let (name, parent) = segments.split_last()?;
        let removed = self
            .root
            .descend_mut(parent)?
            .children_mut()
            .remove(*name)?;
        self.size -= removed.subtree_len();
        Some(removed)
    }

    pub(crate) fn reset_status(&mut self) {
        self.root.reset_status();
    }

    /// Post-order traversal: children (alphabetical) before their parent.
    ///
    /// The root is never visited. The first visitor error stops the walk.
    pub fn visit_depth_child_first<E>(
        &self,
        mut visitor: impl FnMut(&str, &Node) -> Result<(), E>,
    ) -> Result<(), E> {
        fn walk<E>(
            parent: &str,
            node: &Node,
            visitor: &mut impl FnMut(&str, &Node) -> Result<(), E>,
        ) -> Result<(), E> {
            for child in node.children() {
                let path = join_path(parent, child.display_name());
                walk(&path, child, visitor)?;
                visitor(&path, child)?;
            }
            Ok(())
        }

        walk("", &self.root, &mut visitor)
    }

    /// Pre-order traversal: a parent before its children (alphabetical).
    ///
    /// `descend` decides whether the children of a visited node are walked;
    /// the node itself is always visited.
    pub fn visit_depth_parent_first<E>(
        &self,
        mut visitor: impl FnMut(&str, &Node) -> Result<(), E>,
        descend: impl Fn(&str, &Node) -> bool,
    ) -> Result<(), E> {
        fn walk<E>(
            parent: &str,
            node: &Node,
            visitor: &mut impl FnMut(&str, &Node) -> Result<(), E>,
            descend: &impl Fn(&str, &Node) -> bool,
        ) -> Result<(), E> {
            for child in node.children() {
                let path = join_path(parent, child.display_name());
                visitor(&path, child)?;
                if descend(&path, child) {
                    walk(&path, child, visitor, descend)?;
                }
            }
            Ok(())
        }

        walk("", &self.root, &mut visitor, &descend)
    }

    /// Rows a view shows when every path in `collapsed` is folded.
    pub fn visible_len(&self, collapsed: &BTreeSet<String>) -> usize {
        let mut count = 0;
        let _ = self.visit_depth_parent_first(
            |_, _| {
                count += 1;
                Ok::<_, std::convert::Infallible>(())
            },
            |path, _| !collapsed.contains(path),
        );
        count
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum TreeError {
    #[snafu(display("Path '{path}' has no segments"))]
    InvalidPath { path: String },
    #[snafu(display("Path '{path}' does not exist in the tree"))]
    PathNotFound { path: String },
}

/// Splits a slash path into segments. Empty and `.` segments are dropped and
/// `..` pops the previous one.
pub(crate) fn split_path(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments
}

pub(crate) fn path_segments(path: &str) -> Result<Vec<&str>, TreeError> {
    let segments = split_path(path);
    if segments.is_empty() {
        return Err(TreeError::InvalidPath {
            path: path.to_string(),
        });
    }
    Ok(segments)
}
