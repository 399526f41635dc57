use std::fmt::Write as _;

use crate::analysis::ImageMetrics;
use crate::comparer::{Diff, DiffMode};
use crate::config::ByteSize;
use crate::filesystem::ChangeStatus;
use crate::image::ImageManifest;

/// One row per layer, the selected one marked with `>`.
pub fn layer_table(manifest: &ImageManifest, selected: usize) -> String {
    let mut out = format!("  {:>5}  {:<12}  {:>9}  Command\n", "Index", "Digest", "Size");
    for layer in &manifest.layers {
        let marker = if layer.index == selected { '>' } else { ' ' };
        let _ = writeln!(
            out,
            "{marker} {:>5}  {:<12}  {:>9}  {}",
            layer.index,
            layer.short_digest(),
            ByteSize(layer.size()).to_string(),
            layer.command
        );
    }
    out
}

pub fn diff_summary(index: usize, mode: DiffMode, diff: &Diff) -> String {
    let counts = [
        ChangeStatus::Added,
        ChangeStatus::Removed,
        ChangeStatus::Changed,
        ChangeStatus::Unchanged,
    ]
    .map(|status| format!("{status}:{}", diff.count(status)))
    .join(" ");
    format!("Layer {index} ({mode} view): {counts}\n")
}

pub fn metrics_summary(metrics: &ImageMetrics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  efficiency: {:.4} %", metrics.efficiency * 100.0);
    let _ = writeln!(
        out,
        "  wastedBytes: {} bytes ({})",
        metrics.wasted_bytes,
        ByteSize(metrics.wasted_bytes)
    );
    let _ = writeln!(
        out,
        "  userWastedPercent: {:.4} %",
        metrics.wasted_user_percent * 100.0
    );
    for item in metrics.inefficiencies.iter().rev().take(10) {
        let _ = writeln!(
            out,
            "    {:>4}  {:>9}  {}",
            item.layers.len(),
            ByteSize(item.cumulative_size).to_string(),
            item.path
        );
    }
    out
}
