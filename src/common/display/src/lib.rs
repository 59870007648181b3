//! Display utilities for Tessera.
//!
//! Provides tree rendering for `explain()` output and text helpers used
//! when quoting expressions in error messages.

mod tree;

pub use tree::{DisplayTree, TreeNode};

/// Truncate a string for display, appending `...` when it was shortened.
///
/// Truncation happens on a character boundary.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
