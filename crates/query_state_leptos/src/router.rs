//! [`RouterAdapter`] over `leptos_router`.

use std::{fmt, rc::Rc};

use leptos::{create_effect, Memo, SignalGet, SignalGetUntracked, SignalWithUntracked};
use leptos_router::{use_location, use_navigate, use_params_map, Location, NavigateOptions, ParamsMap};
use query_state::dynamic_segment_names;
use query_state_contract::{
    HistoryMode, NavigationCallback, NavigationError, NavigationFuture, NavigationListener,
    NavigationListeners, NavigationOptions, NavigationTarget, QueryMap, RouterAdapter,
};

use crate::search::{build_href, parse_search};

type Navigate = Rc<dyn Fn(&str, NavigateOptions)>;

/// Router adapter for one `<Route>`.
///
/// Must be created inside the route's view so the location, params, and navigate hooks resolve
/// against the active `<Router>`. `pattern` is the route's `path`, e.g. `/posts/:id`; its
/// dynamic segments are exposed as query keys and written back into the path on navigation.
/// Locale and shallow flags have no Leptos counterpart and are ignored.
pub struct LeptosRouter {
    pattern: String,
    location: Location,
    params: Memo<ParamsMap>,
    navigate: Navigate,
    listeners: Rc<NavigationListeners>,
}

impl fmt::Debug for LeptosRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeptosRouter")
            .field("pattern", &self.pattern)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl LeptosRouter {
    /// Binds to the current router context.
    pub fn new(pattern: impl Into<String>) -> Self {
        let location = use_location();
        let navigate = use_navigate();
        let listeners = Rc::new(NavigationListeners::default());

        create_effect({
            let listeners = listeners.clone();
            let pathname = location.pathname;
            let search = location.search;
            move |previous: Option<(String, String)>| {
                let current = (pathname.get(), search.get());
                if previous.is_some_and(|previous| previous != current) {
                    listeners.emit();
                }
                current
            }
        });

        Self {
            pattern: pattern.into(),
            location,
            params: use_params_map(),
            navigate: Rc::new(move |href: &str, options: NavigateOptions| navigate(href, options)),
            listeners,
        }
    }
}

impl RouterAdapter for LeptosRouter {
    fn pathname(&self) -> String {
        self.pattern.clone()
    }

    fn query(&self) -> QueryMap {
        let mut query = parse_search(&self.location.search.get_untracked());
        self.params.with_untracked(|params| {
            for name in dynamic_segment_names(&self.pattern) {
                if let Some(value) = params.get(&name) {
                    query.insert(name, value.clone());
                }
            }
        });
        query
    }

    fn is_ready(&self) -> bool {
        cfg!(target_arch = "wasm32")
    }

    fn is_browser(&self) -> bool {
        cfg!(target_arch = "wasm32")
    }

    fn navigate(
        &self,
        target: NavigationTarget,
        mode: HistoryMode,
        options: NavigationOptions,
    ) -> NavigationFuture {
        if !self.is_browser() {
            return Box::pin(async { Err(NavigationError::Unavailable) });
        }

        let href = build_href(&target.pathname, &target.query);
        (self.navigate)(
            &href,
            NavigateOptions {
                replace: mode == HistoryMode::Replace,
                scroll: options.scroll.unwrap_or(true),
                ..NavigateOptions::default()
            },
        );
        Box::pin(async { Ok(()) })
    }

    fn on_navigation_complete(&self, callback: NavigationCallback) -> NavigationListener {
        self.listeners.add(callback)
    }
}
