//! Empty-value stripping applied before query writes.

use query_state_contract::QueryMap;

/// Returns `query` without absent values, empty strings, and empty sequences.
///
/// Removing the key (rather than writing `key=`) is how a cleared field disappears from the URL.
pub fn strip_empty_values(query: &QueryMap) -> QueryMap {
    let mut stripped = query.clone();
    stripped.retain(|_, value| !value.is_empty_value());
    stripped
}
