//! Per-mount binding between a [`ParamStore`] and a UI host.
//!
//! A binding holds the locally rendered value, reconciles it with the router once the router is
//! ready, debounces write-back of local changes, and invalidates the store when the router
//! reports a navigation it did not issue. Hosts drive re-rendering through the `on_change`
//! callback passed to [`QueryBinding::mount`].

use std::{cell::RefCell, collections::BTreeSet, fmt, mem, rc::Rc, time::Duration};

use futures::{channel::oneshot, future::LocalBoxFuture, FutureExt};
use leptos::logging;
use query_state_contract::{
    NavigationListener, QueryEncodeError, QueryMap, QuerySchema, SetOptions,
};

use crate::{
    scheduler::{BindingScheduler, TimerId},
    store::{ParamStore, Subscription},
};

/// Future returned by binding setters; resolves once the write carrying the change settles.
pub type SetFuture = LocalBoxFuture<'static, bool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Lifecycle of a mounted binding.
pub enum BindingPhase {
    /// Serving the initial-derived snapshot until the router resolves its query.
    AwaitingRouterReady,
    /// First reconciliation done; local changes are written back with debounce.
    Steady,
    /// Torn down; no further writes.
    Unmounted,
}

struct PendingWrite {
    timer: Option<TimerId>,
    options: SetOptions,
    waiters: Vec<oneshot::Sender<bool>>,
}

impl PendingWrite {
    fn resolve(self, written: bool) {
        for waiter in self.waiters {
            let _ = waiter.send(written);
        }
    }
}

struct BindingState<T> {
    phase: BindingPhase,
    local: T,
    dirty: BTreeSet<String>,
    pending: Option<PendingWrite>,
    subscription: Option<Subscription>,
    listener: Option<NavigationListener>,
}

struct BindingInner<S: QuerySchema> {
    store: ParamStore<S>,
    scheduler: Rc<dyn BindingScheduler>,
    on_change: Rc<dyn Fn()>,
    debounce: Duration,
    state: RefCell<BindingState<S::Value>>,
}

/// One mounted consumer of a [`ParamStore`].
pub struct QueryBinding<S: QuerySchema> {
    inner: Rc<BindingInner<S>>,
}

impl<S: QuerySchema> Clone for QueryBinding<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: QuerySchema> fmt::Debug for QueryBinding<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("QueryBinding")
            .field("phase", &state.phase)
            .field("pending_write", &state.pending.is_some())
            .finish()
    }
}

impl<S: QuerySchema + 'static> QueryBinding<S> {
    /// Mounts a binding and primes the store with `initial`.
    ///
    /// The store's bootstrap query is reset only when no other binding of the store is mounted,
    /// so concurrently mounted bindings keep the first caller's initial query.
    pub fn mount(
        store: ParamStore<S>,
        scheduler: Rc<dyn BindingScheduler>,
        initial: Option<QueryMap>,
        on_change: Rc<dyn Fn()>,
    ) -> Self {
        if store.binding_mounted() {
            store.reset_initialization();
        }
        let local = store.get_snapshot(initial.as_ref());
        let debounce = Duration::from_millis(store.options().debounce_ms);

        let binding = Self {
            inner: Rc::new(BindingInner {
                store: store.clone(),
                scheduler,
                on_change,
                debounce,
                state: RefCell::new(BindingState {
                    phase: BindingPhase::AwaitingRouterReady,
                    local,
                    dirty: BTreeSet::new(),
                    pending: None,
                    subscription: None,
                    listener: None,
                }),
            }),
        };

        let subscription = store.subscribe({
            let weak = Rc::downgrade(&binding.inner);
            Rc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Self { inner }.handle_store_change();
                }
            })
        });
        let listener = store.router().on_navigation_complete({
            let weak = Rc::downgrade(&binding.inner);
            Rc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.store.invalidate();
                }
            })
        });
        {
            let mut state = binding.inner.state.borrow_mut();
            state.subscription = Some(subscription);
            state.listener = Some(listener);
        }

        binding.reconcile();
        binding
    }

    /// Store this binding reads from.
    pub fn store(&self) -> &ParamStore<S> {
        &self.inner.store
    }

    /// Value the UI should render.
    pub fn value(&self) -> S::Value {
        self.inner.state.borrow().local.clone()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> BindingPhase {
        self.inner.state.borrow().phase
    }

    /// Returns `true` while a debounced write is waiting.
    pub fn has_pending_write(&self) -> bool {
        self.inner.state.borrow().pending.is_some()
    }

    /// Replaces the local value and schedules a debounced write-back.
    ///
    /// Only the query keys this binding changed are written; the rest of the write comes from
    /// the store snapshot at flush time, so bindings of one store never overwrite each other's
    /// keys with stale values. Every setter call of one debounce burst resolves with the result
    /// of the single write that carried it; calls cancelled by unmount resolve `false`.
    pub fn set(&self, value: S::Value, options: SetOptions) -> SetFuture {
        if !self.inner.store.router().is_browser() {
            if self.inner.store.logs_errors(&options) {
                logging::warn!("query state setter is only available in the browser");
            }
            return futures::future::ready(false).boxed_local();
        }

        let changed = match self.changed_keys(&self.value(), &value) {
            Ok(changed) => changed,
            Err(err) => {
                if self.inner.store.logs_errors(&options) {
                    logging::warn!("query state value failed to encode: {err}");
                }
                return futures::future::ready(false).boxed_local();
            }
        };

        let unchanged = {
            let mut state = self.inner.state.borrow_mut();
            if state.phase == BindingPhase::Unmounted {
                return futures::future::ready(false).boxed_local();
            }
            let unchanged = state.local == value && state.pending.is_none();
            state.local = value;
            state.dirty.extend(changed);
            unchanged
        };
        if unchanged && self.inner.store.get_snapshot(None) == self.value() {
            return futures::future::ready(true).boxed_local();
        }

        (self.inner.on_change)();
        let (done, wait) = oneshot::channel();
        self.schedule_write(Some(done), Some(options));
        self.reconcile();
        async move { wait.await.unwrap_or(false) }.boxed_local()
    }

    /// Applies `patch` over the current value, validates the result, and sets it.
    pub fn patch(&self, patch: &QueryMap, options: SetOptions) -> SetFuture {
        let store = &self.inner.store;
        let current = match store.encode(&self.value()) {
            Ok(current) => current,
            Err(err) => {
                if store.logs_errors(&options) {
                    logging::warn!("query state patch failed to encode current value: {err}");
                }
                return futures::future::ready(false).boxed_local();
            }
        };
        match store.schema().validate(&current.merged(patch)) {
            Ok(value) => self.set(value, options),
            Err(err) => {
                if store.logs_errors(&options) {
                    logging::warn!("query state patch does not match schema: {err}");
                }
                futures::future::ready(false).boxed_local()
            }
        }
    }

    /// Cancels pending writes and detaches from the store and router.
    pub fn unmount(&self) {
        let (pending, subscription, listener) = {
            let mut state = self.inner.state.borrow_mut();
            if state.phase == BindingPhase::Unmounted {
                return;
            }
            state.phase = BindingPhase::Unmounted;
            (
                state.pending.take(),
                state.subscription.take(),
                state.listener.take(),
            )
        };

        if let Some(pending) = pending {
            if let Some(timer) = pending.timer {
                self.inner.scheduler.clear_timeout(timer);
            }
            pending.resolve(false);
        }
        drop(subscription);
        if let Some(listener) = listener {
            listener.remove();
        }
        self.inner.store.binding_unmounted();
    }

    fn handle_store_change(&self) {
        if self.phase() == BindingPhase::Unmounted {
            return;
        }
        let snapshot = self.inner.store.get_snapshot(None);
        let adopted = {
            let mut state = self.inner.state.borrow_mut();
            if state.pending.is_none() && state.local != snapshot {
                state.local = snapshot;
                true
            } else {
                false
            }
        };
        if adopted {
            (self.inner.on_change)();
        }
        self.reconcile();
    }

    fn reconcile(&self) {
        match self.phase() {
            BindingPhase::Unmounted => {}
            BindingPhase::AwaitingRouterReady => {
                if self.inner.store.router().is_ready() {
                    self.first_reconciliation();
                }
            }
            BindingPhase::Steady => {
                let snapshot = self.inner.store.get_snapshot(None);
                let (diverged, scheduled) = {
                    let state = self.inner.state.borrow();
                    (
                        state.local != snapshot,
                        state.pending.as_ref().is_some_and(|p| p.timer.is_some()),
                    )
                };
                if diverged && !scheduled {
                    self.schedule_write(None, None);
                }
            }
        }
    }

    fn first_reconciliation(&self) {
        let store = &self.inner.store;
        let router_query = store.router().query();
        let live = store.validate_or_fallback(&router_query);
        let initial = store.initialization().initial_query;
        let defaults = match store.encode(&store.defaults_or_empty()) {
            Ok(defaults) => defaults,
            Err(err) => {
                if store.options().log_errors_to_console {
                    logging::warn!("query state defaults failed to encode: {err}");
                }
                QueryMap::new()
            }
        };

        let (local, pending) = {
            let mut state = self.inner.state.borrow_mut();
            state.phase = BindingPhase::Steady;
            state.dirty.clear();
            (state.local.clone(), state.pending.take())
        };
        if let Some(timer) = pending.as_ref().and_then(|pending| pending.timer) {
            self.inner.scheduler.clear_timeout(timer);
        }
        // A sibling already reconciled this load; only local changes still need writing.
        if !store.claim_first_load() && pending.is_none() {
            return;
        }

        let missing = defaults
            .iter()
            .chain(initial.iter())
            .any(|(key, value)| !value.is_empty_value() && !router_query.contains_key(key));
        if !missing && local == live {
            if let Some(pending) = pending {
                pending.resolve(true);
            }
            return;
        }

        let local_query = match store.encode(&local) {
            Ok(local_query) => local_query,
            Err(err) => {
                if store.options().log_errors_to_console {
                    logging::warn!("query state local value failed to encode: {err}");
                }
                if let Some(pending) = pending {
                    pending.resolve(false);
                }
                return;
            }
        };

        let payload = defaults
            .merged(&initial)
            .merged(&router_query)
            .merged(&local_query);
        let (options, waiters) = match pending {
            Some(pending) => (
                SetOptions::replace_shallow().or(&pending.options),
                pending.waiters,
            ),
            None => (SetOptions::replace_shallow(), Vec::new()),
        };
        self.spawn_write(
            payload,
            PendingWrite {
                timer: None,
                options,
                waiters,
            },
        );
    }

    fn schedule_write(&self, waiter: Option<oneshot::Sender<bool>>, options: Option<SetOptions>) {
        let (previous, steady) = {
            let mut state = self.inner.state.borrow_mut();
            (state.pending.take(), state.phase == BindingPhase::Steady)
        };

        let (mut waiters, mut merged_options) = match previous {
            Some(previous) => {
                if let Some(timer) = previous.timer {
                    self.inner.scheduler.clear_timeout(timer);
                }
                (previous.waiters, previous.options)
            }
            None => (Vec::new(), SetOptions::default()),
        };
        waiters.extend(waiter);
        if let Some(options) = options {
            merged_options = options.or(&merged_options);
        }

        let timer = steady.then(|| {
            let weak = Rc::downgrade(&self.inner);
            self.inner.scheduler.set_timeout(
                self.inner.debounce,
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        Self { inner }.flush();
                    }
                }),
            )
        });

        self.inner.state.borrow_mut().pending = Some(PendingWrite {
            timer,
            options: merged_options,
            waiters,
        });
    }

    fn flush(&self) {
        let (pending, local, dirty) = {
            let mut state = self.inner.state.borrow_mut();
            if state.phase != BindingPhase::Steady {
                return;
            }
            match state.pending.take() {
                Some(pending) => (pending, state.local.clone(), mem::take(&mut state.dirty)),
                None => return,
            }
        };
        if dirty.is_empty() {
            pending.resolve(true);
            return;
        }

        match self.write_payload(&local, &dirty) {
            Ok(payload) => self.spawn_write(payload, pending),
            Err(err) => {
                if self.inner.store.logs_errors(&pending.options) {
                    logging::warn!("query state local value failed to encode: {err}");
                }
                pending.resolve(false);
                self.write_finished(false);
            }
        }
    }

    /// Query keys whose encoded values differ between `previous` and `next`.
    fn changed_keys(
        &self,
        previous: &S::Value,
        next: &S::Value,
    ) -> Result<Vec<String>, QueryEncodeError> {
        let previous = self.inner.store.encode(previous)?;
        let next = self.inner.store.encode(next)?;
        Ok(previous
            .keys()
            .chain(next.keys())
            .filter(|key| previous.get(key) != next.get(key))
            .map(str::to_string)
            .collect())
    }

    /// Current store snapshot with this binding's `dirty` keys taken from `local`.
    fn write_payload(
        &self,
        local: &S::Value,
        dirty: &BTreeSet<String>,
    ) -> Result<QueryMap, QueryEncodeError> {
        let store = &self.inner.store;
        let mut payload = store.encode(&store.get_snapshot(None))?;
        let local = store.encode(local)?;
        for key in dirty {
            match local.get(key) {
                Some(value) => {
                    payload.insert(key.clone(), value.clone());
                }
                None => {
                    payload.remove(key);
                }
            }
        }
        Ok(payload)
    }

    fn spawn_write(&self, payload: QueryMap, pending: PendingWrite) {
        let store = self.inner.store.clone();
        let weak = Rc::downgrade(&self.inner);
        let PendingWrite {
            options, waiters, ..
        } = pending;

        self.inner.scheduler.spawn_local(
            async move {
                let written = store.set_query_params(payload, options).await;
                for waiter in waiters {
                    let _ = waiter.send(written);
                }
                if let Some(inner) = weak.upgrade() {
                    Self { inner }.write_finished(written);
                }
            }
            .boxed_local(),
        );
    }

    fn write_finished(&self, written: bool) {
        if written {
            return;
        }
        let reverted = {
            let state = self.inner.state.borrow();
            if state.phase == BindingPhase::Unmounted || state.pending.is_some() {
                return;
            }
            drop(state);
            let snapshot = self.inner.store.get_snapshot(None);
            let mut state = self.inner.state.borrow_mut();
            if state.local != snapshot {
                state.local = snapshot;
                true
            } else {
                false
            }
        };
        if reverted {
            (self.inner.on_change)();
        }
    }
}
