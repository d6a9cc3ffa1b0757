//! Correlation ID tracking for stepwise events.

use std::sync::OnceLock;
use uuid::Uuid;

/// Global correlation ID for the current invocation.
static CORRELATION_ID: OnceLock<Uuid> = OnceLock::new();

/// Get or create the correlation ID for the current invocation.
///
/// Every event emitted by the process carries the same ID.
#[must_use]
pub fn correlation_id() -> Uuid {
    *CORRELATION_ID.get_or_init(Uuid::new_v4)
}

/// Set the correlation ID for the current invocation.
///
/// Only the first call has an effect. Returns `true` if the ID was set.
pub fn set_correlation_id(id: Uuid) -> bool {
    CORRELATION_ID.set(id).is_ok()
}
