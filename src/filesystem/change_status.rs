use derive_more::Display;

use crate::filesystem::{Node, StackError};

/// How a path differs between two points of the layer sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum ChangeStatus {
    #[default]
    Unchanged,
    Changed,
    Added,
    Removed,
}

impl ChangeStatus {
    pub const ALL: [ChangeStatus; 4] = [
        ChangeStatus::Unchanged,
        ChangeStatus::Changed,
        ChangeStatus::Added,
        ChangeStatus::Removed,
    ];

    /// Join of the status lattice: equal statuses stay, anything else is a change.
    pub fn merge(self, other: ChangeStatus) -> ChangeStatus {
        if self == other {
            self
        } else {
            ChangeStatus::Changed
        }
    }

    pub fn fold(self, others: impl IntoIterator<Item = ChangeStatus>) -> ChangeStatus {
        others.into_iter().fold(self, ChangeStatus::merge)
    }
}

/// Leaf-level classification of the node found at one path before (`lower`)
/// and after (`upper`) a change.
pub fn compare_nodes(
    lower: Option<&Node>,
    upper: Option<&Node>,
) -> Result<ChangeStatus, StackError> {
    let (lower, upper) = match (lower, upper) {
        (None, None) => return Ok(ChangeStatus::Unchanged),
        (None, Some(_)) => return Ok(ChangeStatus::Added),
        (Some(_), None) => return Ok(ChangeStatus::Removed),
        (Some(lower), Some(upper)) => (lower, upper),
    };

    if upper.is_whiteout() {
        return Ok(ChangeStatus::Removed);
    }
    if lower.name() != upper.name() {
        return Err(StackError::MismatchedComparison {
            lower: lower.name().to_string(),
            upper: upper.name().to_string(),
        });
    }

    let status = match (lower.entry(), upper.entry()) {
        // an implied directory brings no content of its own
        (_, None) => ChangeStatus::Unchanged,
        (None, Some(entry)) if entry.is_dir() => ChangeStatus::Unchanged,
        (None, Some(_)) => ChangeStatus::Changed,
        (Some(before), Some(after)) if before.content_eq(after) => ChangeStatus::Unchanged,
        (Some(_), Some(_)) => ChangeStatus::Changed,
    };
    Ok(status)
}
