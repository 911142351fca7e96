//! Newly-qualifying recipient computation.
//!
//! Notifications fire only on newly *acquired* relevance: recipients who
//! already qualified before the change are never re-notified by an edit,
//! and recipients who stop qualifying receive nothing. The common case is
//! an empty delta, which is a no-op for the caller, not an error.

use std::collections::HashSet;

use crate::record::RecipientId;

/// Returns the recipients present in `new` but absent from `old`.
#[must_use]
pub fn newly_qualified(
    old: &HashSet<RecipientId>,
    new: &HashSet<RecipientId>,
) -> HashSet<RecipientId> {
    new.difference(old).cloned().collect()
}
