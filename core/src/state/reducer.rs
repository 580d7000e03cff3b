//! Per-field merge rules for [`PlanExecuteState`](super::PlanExecuteState).
//!
//! Each reducer takes the current value and the value carried by a partial
//! update (if any) and returns the merged value. They know nothing about the
//! graph.

/// Replace when the update carries a value, otherwise keep the current one.
pub fn replace_or_keep<T>(current: T, update: Option<T>) -> T {
    update.unwrap_or(current)
}

/// Append the update after the existing items.
pub fn concat<T>(mut current: Vec<T>, update: Vec<T>) -> Vec<T> {
    current.extend(update);
    current
}

/// Like [`replace_or_keep`], but a value that is already set may only be
/// "replaced" by an equal one. Returns `Err` with the rejected value otherwise.
pub fn write_once<T: PartialEq>(current: Option<T>, update: Option<T>) -> Result<Option<T>, T> {
    match (current, update) {
        (Some(existing), Some(incoming)) if existing != incoming => Err(incoming),
        (current, None) => Ok(current),
        (_, incoming) => Ok(incoming),
    }
}
