use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use snafu::Snafu;
use tracing::{debug, info};

use crate::comparer::{Diff, DiffMode};
use crate::filesystem::{
    ChangeStatus, EntryKind, Fingerprint, LayerTree, PathConsistencyError, RemovedPath,
    StackEngine, StackError,
};

/// One write of a path by one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathWrite {
    pub layer: usize,
    pub status: ChangeStatus,
    pub kind: EntryKind,
    pub fingerprint: Fingerprint,
    pub size: u64,
}

#[derive(Debug)]
struct ComparerCache {
    composites: Vec<LayerTree>,
    removed: Vec<Vec<RemovedPath>>,
    layer_diffs: Vec<Diff>,
    aggregated_diffs: Vec<Diff>,
    errors: Vec<PathConsistencyError>,
}

/// Stacks an ordered sequence of layer trees once and serves cross-layer queries.
#[derive(Debug)]
pub struct Comparer {
    layers: Vec<LayerTree>,
    engine: StackEngine,
    cache: OnceLock<Result<ComparerCache, StackError>>,
}

impl Comparer {
    pub fn new(layers: Vec<LayerTree>, engine: StackEngine) -> Self {
        Comparer {
            layers,
            engine,
            cache: OnceLock::new(),
        }
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> &[LayerTree] {
        &self.layers
    }

    /// Builds every composite and both diff families on first call.
    ///
    /// Later and concurrent callers observe the same outcome. The returned list
    /// holds the non-fatal structural errors of every layer.
    pub fn build_cache(&self) -> Result<&[PathConsistencyError], ComparerError> {
        Ok(&self.cache()?.errors)
    }

    /// Composite of layers `0..=index`.
    pub fn tree_at(&self, index: usize) -> Result<&LayerTree, ComparerError> {
        self.check_index(index)?;
        Ok(&self.cache()?.composites[index])
    }

    /// Status of every path present in either `tree_at(lower)` or `tree_at(upper)`.
    pub fn diff(&self, lower: usize, upper: usize) -> Result<Cow<'_, Diff>, ComparerError> {
        self.check_index(lower)?;
        self.check_index(upper)?;
        let cache = self.cache()?;

        if upper == lower + 1 {
            return Ok(Cow::Borrowed(&cache.layer_diffs[upper]));
        }
        if lower == 0 && upper > 0 {
            return Ok(Cow::Borrowed(&cache.aggregated_diffs[upper]));
        }

        debug!("Computing uncached diff between layers {lower} and {upper}");
        let diff = Diff::between(Some(&cache.composites[lower]), &cache.composites[upper])
            .map_err(|source| ComparerError::StackError { source })?;
        Ok(Cow::Owned(diff))
    }

    pub fn diff_for(&self, mode: DiffMode, index: usize) -> Result<&Diff, ComparerError> {
        self.check_index(index)?;
        let cache = self.cache()?;
        Ok(match mode {
            DiffMode::Layer => &cache.layer_diffs[index],
            DiffMode::Aggregated => &cache.aggregated_diffs[index],
        })
    }

    /// Owned copy of `tree_at(index)` carrying the statuses of `diff_for(mode, index)`.
    pub fn tree_for(&self, mode: DiffMode, index: usize) -> Result<LayerTree, ComparerError> {
        let mut tree = self.tree_at(index)?.copy();
        for (path, status) in self.diff_for(mode, index)?.iter() {
            if let Some(node) = tree.get_node_mut(path) {
                node.set_status(status);
            }
        }
        Ok(tree)
    }

    /// Paths deleted by the whiteouts of layer `index`.
    pub fn removed_at(&self, index: usize) -> Result<&[RemovedPath], ComparerError> {
        self.check_index(index)?;
        Ok(&self.cache()?.removed[index])
    }

    /// Every write of every path, in layer order.
    pub fn path_history(&self) -> Result<BTreeMap<String, Vec<PathWrite>>, ComparerError> {
        let cache = self.cache()?;
        let mut history: BTreeMap<String, Vec<PathWrite>> = BTreeMap::new();

        for (layer, tree) in self.layers.iter().enumerate() {
            for removed in &cache.removed[layer] {
                history.entry(removed.path.clone()).or_default().push(PathWrite {
                    layer,
                    status: ChangeStatus::Removed,
                    kind: EntryKind::Whiteout,
                    fingerprint: Fingerprint::ZERO,
                    size: removed.size,
                });
            }

            let diff = &cache.layer_diffs[layer];
            let _ = tree.visit_depth_child_first(|path, node| {
                if !node.is_leaf() || node.is_whiteout() {
                    return Ok::<_, std::convert::Infallible>(());
                }
                if let Some(entry) = node.entry() {
                    history.entry(path.to_string()).or_default().push(PathWrite {
                        layer,
                        status: diff.status(path).unwrap_or(ChangeStatus::Added),
                        kind: entry.kind(),
                        fingerprint: entry.fingerprint(),
                        size: entry.size(),
                    });
                }
                Ok(())
            });
        }
        Ok(history)
    }

    fn check_index(&self, index: usize) -> Result<(), ComparerError> {
        if index >= self.layers.len() {
            return Err(ComparerError::IndexOutOfRange {
                index,
                layer_count: self.layers.len(),
            });
        }
        Ok(())
    }

    fn cache(&self) -> Result<&ComparerCache, ComparerError> {
        self.cache
            .get_or_init(|| self.build())
            .as_ref()
            .map_err(|source| ComparerError::StackError {
                source: source.clone(),
            })
    }

    fn build(&self) -> Result<ComparerCache, StackError> {
        info!("Building comparison cache for {} layers", self.layers.len());
        let empty = LayerTree::new();

        let mut composites: Vec<LayerTree> = Vec::with_capacity(self.layers.len());
        let mut removed = Vec::with_capacity(self.layers.len());
        let mut errors = Vec::new();
        for (index, layer) in self.layers.iter().enumerate() {
            let lower = composites.last().unwrap_or(&empty);
            let outcome = self.engine.stack(lower, layer, index)?;
            errors.extend(outcome.errors);
            removed.push(outcome.removed);
            composites.push(outcome.tree);
        }

        let mut layer_diffs = Vec::with_capacity(composites.len());
        let mut aggregated_diffs = Vec::with_capacity(composites.len());
        for index in 0..composites.len() {
            let lower = index.checked_sub(1).map(|prev| &composites[prev]);
            let layer_diff = Diff::between(lower, &composites[index])?;
            let aggregated = match index {
                0 => layer_diff.clone(),
                _ => Diff::between(Some(&composites[0]), &composites[index])?,
            };
            layer_diffs.push(layer_diff);
            aggregated_diffs.push(aggregated);
        }

        if !errors.is_empty() {
            debug!("Comparison cache collected {} structural errors", errors.len());
        }
        Ok(ComparerCache {
            composites,
            removed,
            layer_diffs,
            aggregated_diffs,
            errors,
        })
    }
}

#[derive(Debug, Snafu)]
pub enum ComparerError {
    #[snafu(display("Layer stacking failed"))]
    StackError { source: StackError },
    #[snafu(display("Layer index {index} is out of range for an image with {layer_count} layers"))]
    IndexOutOfRange { index: usize, layer_count: usize },
}
