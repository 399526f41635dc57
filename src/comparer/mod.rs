mod comparer;
mod diff;

pub use comparer::{Comparer, ComparerError, PathWrite};
pub use diff::{Diff, DiffMode};
