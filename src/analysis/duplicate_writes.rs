use tracing::debug;

use crate::analysis::{EfficiencyAnalyzer, ImageMetrics, Inefficiency};
use crate::comparer::{Comparer, ComparerError};

/// Counts every byte written to a path more than once as wasted.
///
/// Efficiency is the share of written bytes that a single write per path
/// (the smallest one) would have needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateWriteAnalyzer;

impl EfficiencyAnalyzer for DuplicateWriteAnalyzer {
    fn analyze(&self, comparer: &Comparer) -> Result<ImageMetrics, ComparerError> {
        let history = comparer.path_history()?;

        let mut minimum_total: u64 = 0;
        let mut cumulative_total: u64 = 0;
        let mut inefficiencies = Vec::new();
        for (path, writes) in history {
            let cumulative_size = saturating_sum(writes.iter().map(|write| write.size));
            let minimum = writes.iter().map(|write| write.size).min().unwrap_or(0);
            minimum_total = minimum_total.saturating_add(minimum);
            cumulative_total = cumulative_total.saturating_add(cumulative_size);

            if writes.len() > 1 {
                inefficiencies.push(Inefficiency {
                    path,
                    cumulative_size,
                    layers: writes.iter().map(|write| write.layer).collect(),
                });
            }
        }
        inefficiencies.sort_by(|a, b| {
            a.cumulative_size
                .cmp(&b.cumulative_size)
                .then_with(|| a.path.cmp(&b.path))
        });

        let layer_sizes: Vec<u64> = comparer.layers().iter().map(|tree| tree.total_size()).collect();
        let size_bytes = saturating_sum(layer_sizes.iter().copied());
        let user_size_bytes = saturating_sum(layer_sizes.iter().skip(1).copied());
        let wasted_bytes = saturating_sum(inefficiencies.iter().map(|item| item.cumulative_size));

        let efficiency = if cumulative_total == 0 {
            1.0
        } else {
            minimum_total as f64 / cumulative_total as f64
        };
        let wasted_user_percent = if user_size_bytes == 0 {
            0.0
        } else {
            wasted_bytes as f64 / user_size_bytes as f64
        };

        debug!(
            "Image efficiency {efficiency:.4}, {wasted_bytes} wasted bytes over {} paths",
            inefficiencies.len()
        );
        Ok(ImageMetrics {
            size_bytes,
            user_size_bytes,
            wasted_bytes,
            wasted_user_percent,
            efficiency,
            inefficiencies,
        })
    }
}

fn saturating_sum(sizes: impl Iterator<Item = u64>) -> u64 {
    sizes.fold(0, u64::saturating_add)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::{Entry, Fingerprint, LayerTree, StackEngine};

    fn file(path: &str, size: u64) -> Entry {
        Entry::file(path, Fingerprint::of(format!("{path}{size}").as_bytes()), size)
    }

    fn comparer(layers: Vec<Vec<Entry>>) -> Comparer {
        let trees = layers
            .into_iter()
            .map(LayerTree::from_entries)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        Comparer::new(trees, StackEngine::default())
    }

    #[test]
    fn worked_example() {
        let comparer = comparer(vec![
            vec![file("/a", 100), file("/b", 50)],
            vec![file("/a", 120), file("/c", 10)],
            vec![Entry::whiteout("/b")],
        ]);
        let metrics = DuplicateWriteAnalyzer.analyze(&comparer).unwrap();

        assert_eq!(metrics.size_bytes, 280);
        assert_eq!(metrics.user_size_bytes, 130);
        assert_eq!(metrics.wasted_bytes, 320);
        assert!((metrics.efficiency - 160.0 / 330.0).abs() < 1e-9);
        assert!((metrics.wasted_user_percent - 320.0 / 130.0).abs() < 1e-9);

        let paths: Vec<_> = metrics
            .inefficiencies
            .iter()
            .map(|item| (item.path.as_str(), item.cumulative_size, item.layers.clone()))
            .collect();
        assert_eq!(paths, [("/b", 100, vec![0, 2]), ("/a", 220, vec![0, 1])]);
    }

    #[test]
    fn single_writes_are_fully_efficient() {
        let comparer = comparer(vec![vec![file("/a", 10)], vec![file("/b", 20)]]);
        let metrics = DuplicateWriteAnalyzer.analyze(&comparer).unwrap();
        assert_eq!(metrics.efficiency, 1.0);
        assert_eq!(metrics.wasted_bytes, 0);
        assert_eq!(metrics.wasted_user_percent, 0.0);
        assert!(metrics.inefficiencies.is_empty());
    }

    #[test]
    fn huge_sizes_saturate() {
        let half = u64::MAX / 2 + 1;
        let comparer = comparer(vec![vec![file("/x", half)], vec![file("/x", half)]]);
        let metrics = DuplicateWriteAnalyzer.analyze(&comparer).unwrap();
        assert_eq!(metrics.wasted_bytes, u64::MAX);
        assert_eq!(metrics.size_bytes, u64::MAX);
        assert_eq!(metrics.user_size_bytes, half);
        assert_eq!(metrics.inefficiencies[0].cumulative_size, u64::MAX);
    }

    #[test]
    fn empty_image_defaults() {
        let metrics = DuplicateWriteAnalyzer.analyze(&comparer(Vec::new())).unwrap();
        assert_eq!(metrics, ImageMetrics::default());
    }
}
