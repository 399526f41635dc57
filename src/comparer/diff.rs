use std::collections::BTreeMap;

use derive_more::Display;

use crate::filesystem::{ChangeStatus, LayerTree, Node, StackError, compare_nodes};

/// Which pair of composites a per-layer view compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum DiffMode {
    /// Layer `i - 1` against layer `i`.
    #[default]
    #[display("layer")]
    Layer,
    /// Layer `0` against layer `i`.
    #[display("aggregated")]
    Aggregated,
}

/// Status of every path present in either of two trees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    statuses: BTreeMap<String, ChangeStatus>,
}

impl Diff {
    /// Compares `upper` against `lower`; a missing `lower` is an empty tree.
    pub fn between(lower: Option<&LayerTree>, upper: &LayerTree) -> Result<Self, StackError> {
        let mut statuses = BTreeMap::new();
        let lower_root = lower.map(LayerTree::root);
        walk_children("", lower_root, Some(upper.root()), &mut statuses)?;
        Ok(Diff { statuses })
    }

    pub fn status(&self, path: &str) -> Option<ChangeStatus> {
        self.statuses.get(path).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ChangeStatus)> {
        self.statuses
            .iter()
            .map(|(path, status)| (path.as_str(), *status))
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn count(&self, status: ChangeStatus) -> usize {
        self.statuses.values().filter(|s| **s == status).count()
    }

    /// Paths whose status is anything but Unchanged.
    pub fn changed(&self) -> impl Iterator<Item = (&str, ChangeStatus)> {
        self.iter()
            .filter(|(_, status)| *status != ChangeStatus::Unchanged)
    }
}

fn walk_children(
    parent: &str,
    lower: Option<&Node>,
    upper: Option<&Node>,
    statuses: &mut BTreeMap<String, ChangeStatus>,
) -> Result<Vec<ChangeStatus>, StackError> {
    let mut names: Vec<&str> = lower
        .into_iter()
        .chain(upper)
        .flat_map(Node::children)
        .map(Node::name)
        .collect();
    names.sort_unstable();
    names.dedup();

    let mut children = Vec::with_capacity(names.len());
    for name in names {
        let lower_child = lower.and_then(|node| node.child(name));
        let upper_child = upper.and_then(|node| node.child(name));
        let path = format!("{parent}/{name}");

        let own = compare_nodes(lower_child, upper_child)?;
        let nested = walk_children(&path, lower_child, upper_child, statuses)?;
        let status = own.fold(nested);

        statuses.insert(path, status);
        children.push(status);
    }
    Ok(children)
}
