//! Router collaborator contract plus in-memory and server-side implementations.

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, VecDeque},
    fmt,
    future::Future,
    pin::Pin,
    rc::Rc,
};

use futures::channel::oneshot;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::QueryMap;

/// Object-safe boxed future returned by [`RouterAdapter::navigate`].
pub type NavigationFuture = Pin<Box<dyn Future<Output = Result<(), NavigationError>>>>;

/// Callback invoked after each completed navigation.
pub type NavigationCallback = Rc<dyn Fn()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
/// History update strategy for a navigation.
pub enum HistoryMode {
    /// Push a new history entry.
    #[default]
    Push,
    /// Replace the current history entry.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Destination of a navigation.
pub struct NavigationTarget {
    /// Pathname template or concrete path.
    pub pathname: String,
    /// Full query to write.
    pub query: QueryMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Navigation flags forwarded to the router.
pub struct NavigationOptions {
    /// Update the URL without re-running page data loading.
    pub shallow: bool,
    /// Locale override.
    pub locale: Option<String>,
    /// Scroll-to-top override.
    pub scroll: Option<bool>,
}

impl Default for NavigationOptions {
    fn default() -> Self {
        Self {
            shallow: true,
            locale: None,
            scroll: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Router-side navigation failure.
pub enum NavigationError {
    /// The router refused or aborted the transition.
    #[error("navigation rejected: {0}")]
    Rejected(String),
    /// No live router exists in this context.
    #[error("no live router is available")]
    Unavailable,
}

/// Handle returned by [`RouterAdapter::on_navigation_complete`]; removes the callback on drop.
pub struct NavigationListener {
    remove: Option<Box<dyn FnOnce()>>,
}

impl NavigationListener {
    /// Wraps the closure that detaches the callback.
    pub fn new(remove: impl FnOnce() + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    /// Listener handle that owns no registration.
    pub fn detached() -> Self {
        Self { remove: None }
    }

    /// Detaches the callback now.
    pub fn remove(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for NavigationListener {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl fmt::Debug for NavigationListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationListener")
            .field("attached", &self.remove.is_some())
            .finish()
    }
}

/// Navigation surface consumed by the parameter store.
pub trait RouterAdapter {
    /// Current pathname template, e.g. `/posts/[id]`.
    fn pathname(&self) -> String;

    /// Current query, including resolved dynamic segments.
    fn query(&self) -> QueryMap;

    /// `false` until dynamic segments are resolved on first load.
    fn is_ready(&self) -> bool;

    /// `false` where no live navigation surface exists (server rendering).
    fn is_browser(&self) -> bool {
        true
    }

    /// Navigates to `target`.
    fn navigate(
        &self,
        target: NavigationTarget,
        mode: HistoryMode,
        options: NavigationOptions,
    ) -> NavigationFuture;

    /// Registers `callback` for completed navigations.
    fn on_navigation_complete(&self, callback: NavigationCallback) -> NavigationListener;
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One navigation observed by [`MemoryRouter`].
pub struct NavigationRecord {
    /// Requested destination.
    pub target: NavigationTarget,
    /// Requested history mode.
    pub mode: HistoryMode,
    /// Requested flags.
    pub options: NavigationOptions,
}

#[derive(Default)]
/// Registry of completion callbacks shared by router implementations.
pub struct NavigationListeners {
    next_id: Cell<u64>,
    callbacks: RefCell<BTreeMap<u64, NavigationCallback>>,
}

impl NavigationListeners {
    /// Registers `callback`; dropping the returned handle unregisters it.
    pub fn add(self: &Rc<Self>, callback: NavigationCallback) -> NavigationListener {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.callbacks.borrow_mut().insert(id, callback);
        let listeners = Rc::downgrade(self);
        NavigationListener::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.callbacks.borrow_mut().remove(&id);
            }
        })
    }

    /// Invokes every registered callback in registration order.
    pub fn emit(&self) {
        let callbacks = self.callbacks.borrow().values().cloned().collect::<Vec<_>>();
        for callback in callbacks {
            callback();
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.borrow().len()
    }

    /// Returns `true` when no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for NavigationListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationListeners")
            .field("len", &self.len())
            .finish()
    }
}

struct PendingNavigation {
    record: NavigationRecord,
    done: oneshot::Sender<Result<(), NavigationError>>,
}

struct MemoryRouterState {
    pathname: RefCell<String>,
    query: RefCell<QueryMap>,
    ready: Cell<bool>,
    deferred: Cell<bool>,
    fail_next: RefCell<Option<String>>,
    history: RefCell<Vec<NavigationRecord>>,
    pending: RefCell<VecDeque<PendingNavigation>>,
    listeners: Rc<NavigationListeners>,
}

#[derive(Clone)]
/// In-memory router for tests and headless hosts.
///
/// Navigations apply immediately unless [`MemoryRouter::set_deferred`] is on, in which case they
/// wait for [`MemoryRouter::resolve_next`].
pub struct MemoryRouter {
    state: Rc<MemoryRouterState>,
}

impl fmt::Debug for MemoryRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRouter")
            .field("pathname", &*self.state.pathname.borrow())
            .field("query", &*self.state.query.borrow())
            .field("ready", &self.state.ready.get())
            .finish()
    }
}

impl MemoryRouter {
    /// Creates a ready router at `pathname` with `query`.
    pub fn new(pathname: impl Into<String>, query: QueryMap) -> Self {
        Self {
            state: Rc::new(MemoryRouterState {
                pathname: RefCell::new(pathname.into()),
                query: RefCell::new(query),
                ready: Cell::new(true),
                deferred: Cell::new(false),
                fail_next: RefCell::new(None),
                history: RefCell::new(Vec::new()),
                pending: RefCell::new(VecDeque::new()),
                listeners: Rc::new(NavigationListeners::default()),
            }),
        }
    }

    /// Marks the router ready or not; becoming ready emits a completion event.
    pub fn set_ready(&self, ready: bool) {
        let was_ready = self.state.ready.replace(ready);
        if ready && !was_ready {
            self.state.listeners.emit();
        }
    }

    /// Holds navigations until [`MemoryRouter::resolve_next`] is called.
    pub fn set_deferred(&self, deferred: bool) {
        self.state.deferred.set(deferred);
    }

    /// Makes the next navigation reject with `reason`.
    pub fn fail_next_navigation(&self, reason: impl Into<String>) {
        *self.state.fail_next.borrow_mut() = Some(reason.into());
    }

    /// Applies the oldest held navigation. Returns `false` when none is pending.
    pub fn resolve_next(&self) -> bool {
        let next = self.state.pending.borrow_mut().pop_front();
        match next {
            Some(pending) => {
                self.apply(&pending.record);
                let _ = pending.done.send(Ok(()));
                true
            }
            None => false,
        }
    }

    /// Number of held navigations.
    pub fn pending_navigations(&self) -> usize {
        self.state.pending.borrow().len()
    }

    /// Simulates a navigation that did not go through any store.
    pub fn navigate_externally(&self, pathname: impl Into<String>, query: QueryMap) {
        *self.state.pathname.borrow_mut() = pathname.into();
        *self.state.query.borrow_mut() = query;
        self.state.listeners.emit();
    }

    /// Every navigation requested so far, including rejected ones.
    pub fn history(&self) -> Vec<NavigationRecord> {
        self.state.history.borrow().clone()
    }

    /// Number of registered completion listeners.
    pub fn listener_count(&self) -> usize {
        self.state.listeners.len()
    }

    fn apply(&self, record: &NavigationRecord) {
        *self.state.pathname.borrow_mut() = record.target.pathname.clone();
        *self.state.query.borrow_mut() = record.target.query.clone();
        self.state.listeners.emit();
    }
}

impl RouterAdapter for MemoryRouter {
    fn pathname(&self) -> String {
        self.state.pathname.borrow().clone()
    }

    fn query(&self) -> QueryMap {
        self.state.query.borrow().clone()
    }

    fn is_ready(&self) -> bool {
        self.state.ready.get()
    }

    fn navigate(
        &self,
        target: NavigationTarget,
        mode: HistoryMode,
        options: NavigationOptions,
    ) -> NavigationFuture {
        let record = NavigationRecord {
            target,
            mode,
            options,
        };
        self.state.history.borrow_mut().push(record.clone());

        if let Some(reason) = self.state.fail_next.borrow_mut().take() {
            return Box::pin(async move { Err(NavigationError::Rejected(reason)) });
        }

        if self.state.deferred.get() {
            let (done, wait) = oneshot::channel();
            self.state
                .pending
                .borrow_mut()
                .push_back(PendingNavigation { record, done });
            return Box::pin(async move {
                wait.await.unwrap_or_else(|_| {
                    Err(NavigationError::Rejected("navigation dropped".to_string()))
                })
            });
        }

        let router = self.clone();
        Box::pin(async move {
            router.apply(&record);
            Ok(())
        })
    }

    fn on_navigation_complete(&self, callback: NavigationCallback) -> NavigationListener {
        self.state.listeners.add(callback)
    }
}

#[derive(Debug, Clone, Default)]
/// Router stand-in for server rendering: reports the request location, never navigates.
pub struct ServerRouter {
    pathname: String,
    query: QueryMap,
}

impl ServerRouter {
    /// Creates a server router for a request.
    pub fn new(pathname: impl Into<String>, query: QueryMap) -> Self {
        Self {
            pathname: pathname.into(),
            query,
        }
    }
}

impl RouterAdapter for ServerRouter {
    fn pathname(&self) -> String {
        self.pathname.clone()
    }

    fn query(&self) -> QueryMap {
        self.query.clone()
    }

    fn is_ready(&self) -> bool {
        false
    }

    fn is_browser(&self) -> bool {
        false
    }

    fn navigate(
        &self,
        _target: NavigationTarget,
        _mode: HistoryMode,
        _options: NavigationOptions,
    ) -> NavigationFuture {
        Box::pin(async { Err(NavigationError::Unavailable) })
    }

    fn on_navigation_complete(&self, _callback: NavigationCallback) -> NavigationListener {
        NavigationListener::detached()
    }
}
