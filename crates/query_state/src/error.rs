//! Failure taxonomy for store operations.

use query_state_contract::{NavigationError, QueryEncodeError, ValidationError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Why a read or write could not complete.
pub enum QueryStateError {
    /// Input did not satisfy the schema.
    #[error("new params do not match schema: {0}")]
    Validation(#[from] ValidationError),
    /// A write was attempted where no live router exists.
    #[error("{operation} is only available in the browser")]
    ServerContext {
        /// Operation that was refused.
        operation: &'static str,
    },
    /// The router rejected the navigation.
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    /// A validated value could not be written back as a query mapping.
    #[error(transparent)]
    Encode(#[from] QueryEncodeError),
}
