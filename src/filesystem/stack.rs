use std::collections::{BTreeMap, BTreeSet};

use derive_more::Display;
use snafu::Snafu;
use tracing::{debug, trace, warn};

use crate::filesystem::{ChangeStatus, LayerTree, Node, TreeError, compare_nodes};

/// What to do when a whiteout names a path the lower layers never had.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum MissingTargetPolicy {
    #[display("ignore")]
    Ignore,
    #[default]
    #[display("report")]
    Report,
}

impl MissingTargetPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ignore" => Some(MissingTargetPolicy::Ignore),
            "report" => Some(MissingTargetPolicy::Report),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FileAction {
    #[display("add")]
    Add,
    #[display("remove")]
    Remove,
}

/// A path deleted by a whiteout, with the bytes its subtree held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedPath {
    pub path: String,
    pub size: u64,
}

/// Result of overlaying one layer onto a composite.
#[derive(Debug, Clone)]
pub struct StackOutcome {
    pub tree: LayerTree,
    pub removed: Vec<RemovedPath>,
    pub errors: Vec<PathConsistencyError>,
}

/// Overlays layer trees onto composites, honoring whiteout deletion.
#[derive(Debug, Clone, Copy, Default)]
pub struct StackEngine {
    missing_target: MissingTargetPolicy,
}

impl StackEngine {
    pub fn new(missing_target: MissingTargetPolicy) -> Self {
        StackEngine { missing_target }
    }

    pub fn missing_target(&self) -> MissingTargetPolicy {
        self.missing_target
    }

    /// Produces the composite of `lower` with `upper` (written by `layer`) on top.
    ///
    /// Statuses of the result describe what `upper` changed relative to `lower`.
    pub fn stack(
        &self,
        lower: &LayerTree,
        upper: &LayerTree,
        layer: usize,
    ) -> Result<StackOutcome, StackError> {
        let mut tree = lower.copy();
        tree.reset_status();

        let mut pass = Pass {
            engine: self,
            lower,
            layer,
            tree,
            removed: Vec::new(),
            errors: Vec::new(),
            own: BTreeMap::new(),
            lost_child: BTreeSet::new(),
        };
        pass.overlay(&mut Vec::new(), upper.root())?;
        pass.refold();

        debug!(
            layer,
            nodes = pass.tree.len(),
            removed = pass.removed.len(),
            errors = pass.errors.len(),
            "Stacked layer"
        );
        Ok(StackOutcome {
            tree: pass.tree,
            removed: pass.removed,
            errors: pass.errors,
        })
    }
}

struct Pass<'a> {
    engine: &'a StackEngine,
    lower: &'a LayerTree,
    layer: usize,
    tree: LayerTree,
    removed: Vec<RemovedPath>,
    errors: Vec<PathConsistencyError>,
    /// Leaf-style status of every path the upper layer wrote.
    own: BTreeMap<Vec<String>, ChangeStatus>,
    lost_child: BTreeSet<Vec<String>>,
}

impl Pass<'_> {
    fn overlay(&mut self, dir: &mut Vec<String>, upper: &Node) -> Result<(), StackError> {
        let mut children: Vec<&Node> = upper.children().collect();
        children.sort_by_key(|child| apply_rank(child));

        for child in children {
            if child.is_opaque_whiteout() {
                self.clear_directory(dir);
            } else if child.is_whiteout() {
                self.apply_whiteout(dir, child.display_name());
            } else {
                dir.push(child.name().to_string());
                self.write(dir, child)?;
                self.overlay(dir, child)?;
                dir.pop();
            }
        }
        Ok(())
    }

    fn write(&mut self, segments: &[String], upper: &Node) -> Result<(), StackError> {
        let keys = as_keys(segments);
        let status = compare_nodes(self.lower.get_segments(&keys), Some(upper))?;
        let existed = self.tree.get_segments(&keys).is_some();

        let node = self.tree.ensure_segments(&keys);
        if let Some(entry) = upper.entry() {
            node.set_entry(entry.clone());
        }
        if upper.entry().is_some() || !existed {
            node.set_layer(self.layer);
        }
        node.set_status(status);

        trace!(layer = self.layer, path = %logical_path(segments), %status, "Wrote path");
        self.own.insert(segments.to_vec(), status);
        Ok(())
    }

    fn apply_whiteout(&mut self, dir: &mut Vec<String>, target: &str) {
        dir.push(target.to_string());
        let path = logical_path(dir);
        let removed = self.tree.remove_segments(&as_keys(dir));
        dir.pop();

        match removed {
            Some(node) => {
                debug!(layer = self.layer, path = %path, "Whiteout removed path");
                self.removed.push(RemovedPath {
                    path,
                    size: node.total_size(),
                });
                self.lost_child.insert(dir.clone());
            }
            None if self.engine.missing_target == MissingTargetPolicy::Ignore => {
                debug!(layer = self.layer, path = %path, "Whiteout target missing, ignored");
            }
            None => {
                warn!(layer = self.layer, path = %path, "Whiteout target missing");
                self.errors.push(PathConsistencyError {
                    layer: self.layer,
                    path: path.clone(),
                    action: FileAction::Remove,
                    source: TreeError::PathNotFound { path },
                });
            }
        }
    }

    fn clear_directory(&mut self, dir: &mut Vec<String>) {
        let names: Vec<String> = match self.tree.get_segments(&as_keys(dir)) {
            Some(node) => node.children().map(|child| child.name().to_string()).collect(),
            None => return,
        };
        if names.is_empty() {
            return;
        }
        debug!(
            layer = self.layer,
            dir = %logical_path(dir),
            count = names.len(),
            "Opaque whiteout cleared directory"
        );
        for name in names {
            self.apply_whiteout(dir, &name);
        }
    }

    /// Re-folds every directory on the way from a touched path to the root,
    /// deepest first, so parents see their children's final status.
    fn refold(&mut self) {
        let mut dirs: BTreeSet<Vec<String>> = BTreeSet::new();
        for segments in self.own.keys().chain(self.lost_child.iter()) {
            for depth in 1..=segments.len() {
                dirs.insert(segments[..depth].to_vec());
            }
        }

        let mut ordered: Vec<Vec<String>> = dirs.into_iter().collect();
        ordered.sort_by(|a, b| b.len().cmp(&a.len()));

        for segments in ordered {
            let keys = as_keys(&segments);
            let own = self.own.get(&segments).copied().unwrap_or_else(|| {
                match self.lower.get_segments(&keys) {
                    Some(_) => ChangeStatus::Unchanged,
                    None => ChangeStatus::Added,
                }
            });
            let lost_child =
                self.lost_child.contains(&segments) || self.lost_lower_child(&keys);
            let Some(node) = self.tree.get_segments_mut(&keys) else {
                continue;
            };

            let mut status = own.fold(node.children().map(Node::status));
            if lost_child {
                status = status.merge(ChangeStatus::Removed);
            }
            node.set_status(status);
        }
    }

    /// A directory whited out and partly recreated in this layer lacks
    /// some of the children the lower composite had at the same path.
    fn lost_lower_child(&self, keys: &[&str]) -> bool {
        let (Some(lower), Some(current)) =
            (self.lower.get_segments(keys), self.tree.get_segments(keys))
        else {
            return false;
        };
        lower
            .children()
            .any(|child| current.child(child.name()).is_none())
    }
}

/// Opaque marker first, then whiteouts, then everything else.
fn apply_rank(node: &Node) -> u8 {
    if node.is_opaque_whiteout() {
        0
    } else if node.is_whiteout() {
        1
    } else {
        2
    }
}

fn as_keys(segments: &[String]) -> Vec<&str> {
    segments.iter().map(String::as_str).collect()
}

fn logical_path(segments: &[String]) -> String {
    format!("/{}", segments.join("/"))
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum StackError {
    #[snafu(display("Cannot compare node '{lower}' with node '{upper}'"))]
    MismatchedComparison { lower: String, upper: String },
}

/// A non-fatal structural problem found while stacking one layer.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("Layer {layer}: could not {action} '{path}'"))]
pub struct PathConsistencyError {
    pub layer: usize,
    pub path: String,
    pub action: FileAction,
    pub source: TreeError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::ChangeStatus::*;
    use crate::filesystem::{Entry, EntryKind, Fingerprint};

    fn file(path: &str, content: &[u8]) -> Entry {
        Entry::file(path, Fingerprint::of(content), content.len() as u64)
    }

    fn layer(entries: Vec<Entry>) -> LayerTree {
        LayerTree::from_entries(entries).unwrap()
    }

    fn status(tree: &LayerTree, path: &str) -> ChangeStatus {
        tree.get_node(path).unwrap().status()
    }

    fn stack_all(engine: &StackEngine, layers: &[LayerTree]) -> Vec<StackOutcome> {
        let mut outcomes: Vec<StackOutcome> = Vec::new();
        for (idx, upper) in layers.iter().enumerate() {
            let empty = LayerTree::new();
            let lower = outcomes.last().map_or(&empty, |outcome| &outcome.tree);
            let outcome = engine.stack(lower, upper, idx).unwrap();
            outcomes.push(outcome);
        }
        outcomes
    }

    fn assert_directories_fold(tree: &LayerTree) {
        tree.visit_depth_child_first(|path, node| {
            if !node.is_leaf() {
                let folded = node.status().fold(node.children().map(Node::status));
                assert_eq!(folded, node.status(), "{path}");
            }
            Ok::<_, ()>(())
        })
        .unwrap();
    }

    fn three_layers() -> Vec<LayerTree> {
        vec![
            layer(vec![file("/etc/hosts", b"H1"), Entry::directory("/usr/bin")]),
            layer(vec![file("/etc/hosts", b"H2")]),
            layer(vec![
                Entry::whiteout("/etc/hosts"),
                file("/usr/bin/bash", b"bash"),
            ]),
        ]
    }

    #[test]
    fn first_layer_is_all_added() {
        let outcomes = stack_all(&StackEngine::default(), &three_layers()[..1]);
        let tree = &outcomes[0].tree;
        for path in ["/etc", "/etc/hosts", "/usr", "/usr/bin"] {
            assert_eq!(status(tree, path), Added, "{path}");
            assert_eq!(tree.get_node(path).unwrap().layer(), Some(0));
        }
    }

    #[test]
    fn three_layer_scenario() {
        let outcomes = stack_all(&StackEngine::default(), &three_layers());

        let second = &outcomes[1].tree;
        assert_eq!(status(second, "/etc/hosts"), Changed);
        assert_eq!(status(second, "/etc"), Changed);
        assert_eq!(status(second, "/usr/bin"), Unchanged);
        assert_eq!(second.get_node("/etc/hosts").unwrap().layer(), Some(1));
        assert_eq!(second.get_node("/usr/bin").unwrap().layer(), Some(0));

        let third = &outcomes[2].tree;
        assert!(!third.contains("/etc/hosts"));
        assert!(!third.contains("/etc/.wh.hosts"));
        assert_eq!(status(third, "/etc"), Changed);
        assert_eq!(status(third, "/usr/bin"), Changed);
        assert_eq!(status(third, "/usr/bin/bash"), Added);
        assert_eq!(
            outcomes[2].removed,
            [RemovedPath {
                path: "/etc/hosts".to_string(),
                size: 2
            }]
        );
        assert!(outcomes[2].errors.is_empty());

        for outcome in &outcomes {
            assert_directories_fold(&outcome.tree);
        }
    }

    #[test]
    fn stacking_leaves_inputs_untouched() {
        let layers = three_layers();
        let outcomes = stack_all(&StackEngine::default(), &layers);
        assert!(outcomes[1].tree.contains("/etc/hosts"));
        assert_eq!(layers[2].len(), 5);
    }

    #[test]
    fn stacking_is_order_sensitive() {
        let engine = StackEngine::default();
        let a = layer(vec![file("/f", b"a")]);
        let b = layer(vec![file("/f", b"b")]);

        let ab = engine.stack(&engine.stack(&LayerTree::new(), &a, 0).unwrap().tree, &b, 1);
        let ba = engine.stack(&engine.stack(&LayerTree::new(), &b, 0).unwrap().tree, &a, 1);
        let fingerprint = |tree: &LayerTree| tree.get_node("/f").unwrap().entry().unwrap().fingerprint();

        assert_eq!(fingerprint(&ab.unwrap().tree), Fingerprint::of(b"b"));
        assert_eq!(fingerprint(&ba.unwrap().tree), Fingerprint::of(b"a"));
    }

    #[test]
    fn whiteout_order_decides_survival() {
        let engine = StackEngine::default();
        let write = layer(vec![file("/f", b"f")]);
        let delete = layer(vec![Entry::whiteout("/f")]);

        let write_then_delete = stack_all(&engine, &[write.clone(), delete.clone()]);
        assert!(!write_then_delete[1].tree.contains("/f"));
        assert!(write_then_delete.iter().all(|outcome| outcome.errors.is_empty()));

        let delete_then_write = stack_all(&engine, &[delete, write]);
        assert!(delete_then_write[1].tree.contains("/f"));
        assert_eq!(delete_then_write[0].errors.len(), 1);
        assert_eq!(delete_then_write[0].errors[0].path, "/f");
        assert!(delete_then_write[1].errors.is_empty());
    }

    #[test]
    fn untouched_siblings_stay_unchanged() {
        let layers = vec![
            layer(vec![file("/a/x", b"x"), file("/b/y", b"y")]),
            layer(vec![file("/a/z", b"z")]),
        ];
        let outcomes = stack_all(&StackEngine::default(), &layers);
        let tree = &outcomes[1].tree;
        assert_eq!(status(tree, "/b"), Unchanged);
        assert_eq!(status(tree, "/b/y"), Unchanged);
        assert_eq!(status(tree, "/a/x"), Unchanged);
        assert_eq!(status(tree, "/a/z"), Added);
        assert_eq!(status(tree, "/a"), Changed);
    }

    #[test]
    fn implied_upper_directory_keeps_payload() {
        let layers = vec![
            layer(vec![Entry::directory("/opt")]),
            layer(vec![file("/opt/tool", b"t")]),
        ];
        let outcomes = stack_all(&StackEngine::default(), &layers);
        let opt = outcomes[1].tree.get_node("/opt").unwrap();
        assert_eq!(opt.entry(), Some(&Entry::directory("/opt")));
        assert_eq!(opt.layer(), Some(0));
    }

    #[test]
    fn whiteout_then_recreate_in_same_layer() {
        let layers = vec![
            layer(vec![file("/app/config", b"old"), file("/app/zz", b"z")]),
            layer(vec![Entry::whiteout("/app/zz"), file("/app/zz/inner", b"new")]),
        ];
        let outcomes = stack_all(&StackEngine::default(), &layers);
        let tree = &outcomes[1].tree;
        assert!(tree.contains("/app/zz/inner"));
        assert_eq!(tree.get_node("/app/zz").unwrap().entry(), None);
        assert_eq!(status(tree, "/app"), Changed);
    }

    #[test]
    fn whited_out_directory_partly_recreated_is_changed() {
        let layers = vec![
            layer(vec![file("/d/a", b"a"), file("/d/b", b"b")]),
            layer(vec![Entry::whiteout("/d"), file("/d/a", b"a")]),
        ];
        let outcomes = stack_all(&StackEngine::default(), &layers);
        let tree = &outcomes[1].tree;

        assert!(!tree.contains("/d/b"));
        assert_eq!(status(tree, "/d/a"), Unchanged);
        assert_eq!(status(tree, "/d"), Changed);
        assert_directories_fold(tree);

        let diff = crate::comparer::Diff::between(Some(&outcomes[0].tree), tree).unwrap();
        assert_eq!(diff.status("/d"), Some(status(tree, "/d")));
        assert_eq!(diff.status("/d/b"), Some(Removed));
    }

    #[test]
    fn opaque_whiteout_clears_lower_directory() {
        let layers = vec![
            layer(vec![
                file("/var/cache/a", b"aa"),
                file("/var/cache/b", b"bbb"),
                file("/var/log", b"l"),
            ]),
            layer(vec![
                Entry::new("/var/cache/.wh..wh..opq", EntryKind::Whiteout, Fingerprint::ZERO),
                file("/var/cache/c", b"c"),
            ]),
        ];
        let outcomes = stack_all(&StackEngine::default(), &layers);
        let tree = &outcomes[1].tree;

        assert!(!tree.contains("/var/cache/a"));
        assert!(!tree.contains("/var/cache/b"));
        assert!(tree.contains("/var/cache/c"));
        assert!(tree.contains("/var/log"));
        assert_eq!(outcomes[1].removed.iter().map(|r| r.size).sum::<u64>(), 5);
        assert_eq!(status(tree, "/var/cache"), Changed);
        assert_directories_fold(tree);
    }

    #[test]
    fn directory_emptied_by_whiteout_is_changed() {
        let layers = vec![
            layer(vec![file("/tmp/junk", b"j")]),
            layer(vec![Entry::whiteout("/tmp/junk")]),
        ];
        let outcomes = stack_all(&StackEngine::default(), &layers);
        let tmp = outcomes[1].tree.get_node("/tmp").unwrap();
        assert!(tmp.is_leaf());
        assert_eq!(tmp.status(), Changed);
    }

    #[test]
    fn missing_target_is_reported_by_default() {
        let layers = vec![
            layer(vec![file("/etc/hosts", b"h")]),
            layer(vec![Entry::whiteout("/etc/motd")]),
        ];
        let outcomes = stack_all(&StackEngine::default(), &layers);
        assert_eq!(
            outcomes[1].errors,
            [PathConsistencyError {
                layer: 1,
                path: "/etc/motd".to_string(),
                action: FileAction::Remove,
                source: TreeError::PathNotFound {
                    path: "/etc/motd".to_string()
                },
            }]
        );
        assert!(outcomes[1].removed.is_empty());
    }

    #[test]
    fn missing_target_can_be_ignored() {
        let layers = vec![
            layer(vec![file("/etc/hosts", b"h")]),
            layer(vec![Entry::whiteout("/etc/motd")]),
        ];
        let outcomes = stack_all(&StackEngine::new(MissingTargetPolicy::Ignore), &layers);
        assert!(outcomes[1].errors.is_empty());
        assert_eq!(status(&outcomes[1].tree, "/etc/hosts"), Unchanged);
    }

    #[test]
    fn policy_parsing() {
        assert_eq!(MissingTargetPolicy::parse(" Ignore "), Some(MissingTargetPolicy::Ignore));
        assert_eq!(MissingTargetPolicy::parse("report"), Some(MissingTargetPolicy::Report));
        assert_eq!(MissingTargetPolicy::parse("panic"), None);
    }
}
