//! Leptos host for `query_state`.
//!
//! [`LeptosRouter`] adapts `leptos_router` location and navigation to the store's router
//! contract, [`LeptosScheduler`] runs debounce timers on `setTimeout`, and the hooks in
//! [`hooks`] expose bindings as signals:
//!
//! ```ignore
//! let store = create_query_store(
//!     schema,
//!     Rc::new(LeptosRouter::new("/products")),
//!     Rc::new(LeptosScheduler::new()),
//!     QueryStateOptions::default(),
//! );
//! let (params, set_params) = use_query_params(&store, None);
//! ```

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod hooks;
pub mod router;
pub mod scheduler;
pub mod search;

pub use hooks::{
    provide_query_store, use_query_param, use_query_params, use_query_store, QueryParamSetter,
    QueryParamsSetter,
};
pub use router::LeptosRouter;
pub use scheduler::LeptosScheduler;
pub use search::{build_href, parse_search, to_search};
