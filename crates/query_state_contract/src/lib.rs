//! Wire types and collaborator contracts for keeping application state in the URL query string.
//!
//! This crate is the boundary between the synchronization engine in `query_state` and the things
//! it drives: the host router ([`RouterAdapter`]) and the schema that validates query mappings
//! ([`QuerySchema`]). In-memory and server-side router implementations live here so that hosts
//! and tests can run the engine without a browser.

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod options;
pub mod query;
pub mod router;
pub mod schema;

pub use options::{
    ClearOptions, QueryStateOptions, ResolvedWrite, SetOptions, DEFAULT_DEBOUNCE_MS,
};
pub use query::{QueryEncodeError, QueryMap, QueryValue};
pub use router::{
    HistoryMode, MemoryRouter, NavigationCallback, NavigationError, NavigationFuture,
    NavigationListener, NavigationListeners, NavigationOptions, NavigationRecord,
    NavigationTarget, RouterAdapter, ServerRouter,
};
pub use schema::{
    FieldKind, FieldSchema, ObjectSchema, QuerySchema, ValidationError, ValidationIssue,
};
