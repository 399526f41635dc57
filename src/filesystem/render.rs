use std::collections::BTreeSet;
use std::fmt::Write as _;

use colored::Colorize;

use crate::config::ByteSize;
use crate::filesystem::node::join_path;
use crate::filesystem::{ChangeStatus, EntryKind, LayerTree, Node};

const BRANCH_SPACE: &str = "│   ";
const NO_BRANCH_SPACE: &str = "    ";
const MIDDLE_ITEM: &str = "├─";
const LAST_ITEM: &str = "└─";
const UNCOLLAPSED_ITEM: &str = "─ ";
const COLLAPSED_ITEM: &str = "⊕ ";

/// Options for [`LayerTree::render_styled`].
#[derive(Debug, Clone, Default)]
pub struct RenderStyle {
    pub colorize: bool,
    pub attributes: bool,
    /// Logical paths of directories shown folded.
    pub collapsed: BTreeSet<String>,
}

impl LayerTree {
    /// Canonical box-drawing listing. Deterministic for equal trees.
    pub fn render(&self) -> String {
        self.render_styled(&RenderStyle::default())
    }

    pub fn render_styled(&self, style: &RenderStyle) -> String {
        let mut out = String::from(".\n");
        render_children(self.root(), "", "", style, &mut out);
        out
    }
}

fn render_children(node: &Node, path: &str, prefix: &str, style: &RenderStyle, out: &mut String) {
    let count = node.children().len();
    for (idx, child) in node.children().enumerate() {
        let last = idx + 1 == count;
        let child_path = join_path(path, child.display_name());
        let collapsed = !child.is_leaf() && style.collapsed.contains(&child_path);

        if style.attributes {
            out.push_str(&attributes(child));
        }
        out.push_str(prefix);
        out.push_str(if last { LAST_ITEM } else { MIDDLE_ITEM });
        out.push_str(if collapsed { COLLAPSED_ITEM } else { UNCOLLAPSED_ITEM });
        out.push_str(&label(child, style.colorize));
        out.push('\n');

        if !collapsed {
            let nested = format!("{prefix}{}", if last { NO_BRANCH_SPACE } else { BRANCH_SPACE });
            render_children(child, &child_path, &nested, style, out);
        }
    }
}

fn label(node: &Node, colorize: bool) -> String {
    let mut text = node.display_name().to_string();
    if let Some(target) = node.entry().and_then(|entry| entry.link_target()) {
        let _ = write!(text, " → {target}");
    }
    if !colorize {
        return text;
    }
    match node.status() {
        ChangeStatus::Added => text.green().to_string(),
        ChangeStatus::Removed => text.red().to_string(),
        ChangeStatus::Changed => text.yellow().to_string(),
        ChangeStatus::Unchanged => text,
    }
}

fn attributes(node: &Node) -> String {
    let flag = node.entry().map_or(EntryKind::Directory.flag(), |entry| entry.kind().flag());
    let size = if node.is_dir() {
        node.total_size()
    } else {
        node.entry().map_or(0, |entry| entry.size())
    };
    format!("{flag} {:>9}  ", ByteSize(size).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::{Entry, Fingerprint};

    fn tree(paths: &[&str]) -> LayerTree {
        LayerTree::from_entries(
            paths
                .iter()
                .map(|path| Entry::file(*path, Fingerprint::of(path.as_bytes()), 0)),
        )
        .unwrap()
    }

    #[test]
    fn renders_box_drawing_listing() {
        let tree = tree(&["/a/x", "/a/y", "/b"]);
        let expected = "\
.
├── a
│   ├── x
│   └── y
└── b
";
        assert_eq!(tree.render(), expected);
    }

    #[test]
    fn rendering_is_insertion_order_independent() {
        let forward = tree(&["/a/x", "/a/y", "/b"]);
        let backward = tree(&["/b", "/a/y", "/a/x"]);
        assert_eq!(forward.render(), backward.render());
        assert_eq!(forward.copy().render(), forward.render());
    }

    #[test]
    fn empty_tree_renders_root_only() {
        assert_eq!(LayerTree::new().render(), ".\n");
    }

    #[test]
    fn collapsed_directories_are_folded() {
        let tree = tree(&["/a/x", "/a/y", "/b"]);
        let style = RenderStyle {
            collapsed: BTreeSet::from(["/a".to_string()]),
            ..RenderStyle::default()
        };
        assert_eq!(tree.render_styled(&style), ".\n├─⊕ a\n└── b\n");
    }

    #[test]
    fn symlinks_show_their_target() {
        let tree = LayerTree::from_entries([Entry::symlink("/bin/sh", "/bin/busybox")]).unwrap();
        assert_eq!(tree.render(), ".\n└── bin\n    └── sh → /bin/busybox\n");
    }

    #[test]
    fn attribute_column_shows_kind_and_size() {
        let tree = LayerTree::from_entries([Entry::file("/f", Fingerprint::of(b"f"), 2048)]).unwrap();
        let style = RenderStyle {
            attributes: true,
            ..RenderStyle::default()
        };
        let rendered = tree.render_styled(&style);
        let line = rendered.lines().nth(1).unwrap();
        assert!(line.starts_with("- "), "{line}");
        assert!(line.ends_with("└── f"), "{line}");
        assert!(line.contains(&ByteSize(2048).to_string()), "{line}");
    }
}
