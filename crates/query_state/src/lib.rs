//! Keeps a validated slice of application state in the URL query string.
//!
//! [`ParamStore`] reconciles the SSR/initial query, the live router query, and locally written
//! values into one cached snapshot and writes changes back without dropping dynamic route
//! segments or foreign parameters. [`QueryBinding`] adapts the store to a UI host: first-load
//! reconciliation, debounced write-back, and external navigation handling. Hosts obtain bindings
//! through [`create_query_store`].
//!
//! Router and schema collaborators are defined in `query_state_contract`; the Leptos host lives
//! in `query_state_leptos`.

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod binding;
pub mod error;
pub mod factory;
pub mod filter;
pub mod params;
pub mod scheduler;
pub mod store;

pub use binding::{BindingPhase, QueryBinding, SetFuture};
pub use error::QueryStateError;
pub use factory::{create_query_store, QueryParamHandle, QueryParamsHandle, QueryStore};
pub use filter::strip_empty_values;
pub use params::{dynamic_segment_name, dynamic_segment_names, split_route_params, RouteParams};
pub use scheduler::{BindingScheduler, ManualScheduler, TimerId, TimerTask};
pub use store::{InitializationState, ParamStore, Subscription, SubscriberCallback};

pub use query_state_contract as contract;
