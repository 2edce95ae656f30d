//! Options-to-arguments collaborator trait

use crate::types::WorkItem;

/// Turns a work item's options into the external tool's argument vector
///
/// The returned vector excludes the binary itself. Implementations must add
/// whatever switch makes the tool print one JSON metadata object per line when
/// `simulate` is set.
pub trait ArgumentBuilder: Send + Sync {
    /// Full argument list for one invocation
    fn build_args(&self, item: &WorkItem, simulate: bool) -> Vec<String>;

    /// Name of this builder, for logs
    fn name(&self) -> &'static str;
}
