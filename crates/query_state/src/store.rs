//! Parameter store: the validated snapshot of the router query and the write/clear protocol.
//!
//! One store is shared by every binding created from the same factory call. It owns the cached
//! snapshot, the SSR bootstrap query, and the subscriber set. Reads never fail; writes report
//! failure as `false` (or an `Err` from the `try_*` variants) and log only when asked to.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    fmt,
    rc::{Rc, Weak},
};

use leptos::logging;
use query_state_contract::{
    ClearOptions, NavigationTarget, QueryEncodeError, QueryMap, QuerySchema, QueryStateOptions,
    RouterAdapter, SetOptions,
};

use crate::{
    error::QueryStateError,
    filter::strip_empty_values,
    params::{dynamic_segment_names, layer_write_payload, split_route_params},
};

/// Callback registered through [`ParamStore::subscribe`].
pub type SubscriberCallback = Rc<dyn Fn()>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Bootstrap query captured from the first caller that supplied one.
pub struct InitializationState {
    /// Whether `initial_query` has been latched.
    pub is_initialized: bool,
    /// Latched SSR/initial query.
    pub initial_query: QueryMap,
}

#[derive(Debug, Clone)]
struct Snapshot<T> {
    value: T,
    previous_query: QueryMap,
}

#[derive(Default)]
struct SubscriberSet {
    next_id: Cell<u64>,
    callbacks: RefCell<BTreeMap<u64, SubscriberCallback>>,
}

impl SubscriberSet {
    fn notify(&self) {
        let callbacks = self.callbacks.borrow().values().cloned().collect::<Vec<_>>();
        for callback in callbacks {
            callback();
        }
    }
}

/// Registration returned by [`ParamStore::subscribe`]; removes exactly its own callback.
pub struct Subscription {
    id: u64,
    set: Weak<SubscriberSet>,
}

impl Subscription {
    /// Removes the callback.
    pub fn unsubscribe(self) {
        // Drop does the removal.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(set) = self.set.upgrade() {
            set.callbacks.borrow_mut().remove(&self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

struct StoreInner<S: QuerySchema> {
    schema: S,
    router: Rc<dyn RouterAdapter>,
    options: QueryStateOptions,
    init: RefCell<InitializationState>,
    snapshot: RefCell<Option<Snapshot<S::Value>>>,
    subscribers: Rc<SubscriberSet>,
    mounted_bindings: Cell<usize>,
    first_load_claimed: Cell<bool>,
}

/// Validated projection of the router query for schema `S`.
pub struct ParamStore<S: QuerySchema> {
    inner: Rc<StoreInner<S>>,
}

impl<S: QuerySchema> Clone for ParamStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: QuerySchema + 'static> fmt::Debug for ParamStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamStore")
            .field("options", &self.inner.options)
            .field("init", &*self.inner.init.borrow())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<S: QuerySchema + 'static> ParamStore<S> {
    /// Creates a store over `router` with store-wide `options`.
    pub fn new(schema: S, router: Rc<dyn RouterAdapter>, options: QueryStateOptions) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                schema,
                router,
                options,
                init: RefCell::new(InitializationState::default()),
                snapshot: RefCell::new(None),
                subscribers: Rc::new(SubscriberSet::default()),
                mounted_bindings: Cell::new(0),
                first_load_claimed: Cell::new(false),
            }),
        }
    }

    /// Store-wide options.
    pub fn options(&self) -> &QueryStateOptions {
        &self.inner.options
    }

    /// Router this store writes to.
    pub fn router(&self) -> &Rc<dyn RouterAdapter> {
        &self.inner.router
    }

    /// Schema this store validates with.
    pub fn schema(&self) -> &S {
        &self.inner.schema
    }

    /// Current bootstrap state.
    pub fn initialization(&self) -> InitializationState {
        self.inner.init.borrow().clone()
    }

    /// Returns `true` when both handles point at the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns the validated state, reusing the cached value while the merged query is unchanged.
    ///
    /// The first non-empty `initial` query latches as the bootstrap query; later ones are
    /// ignored until [`ParamStore::reset_initialization`].
    pub fn get_snapshot(&self, initial: Option<&QueryMap>) -> S::Value {
        if let Some(initial) = initial {
            self.latch_initial(initial);
        }
        let initial = self.bootstrap_query(initial);

        if !self.inner.router.is_browser() {
            return self.validate_or_fallback(&initial);
        }

        let merged = initial.merged(&self.inner.router.query());
        if let Some(snapshot) = self.inner.snapshot.borrow().as_ref() {
            if snapshot.previous_query == merged {
                return snapshot.value.clone();
            }
        }

        let value = self.validate_or_fallback(&merged);
        *self.inner.snapshot.borrow_mut() = Some(Snapshot {
            value: value.clone(),
            previous_query: merged,
        });
        value
    }

    /// Validates `query`, falling back to schema defaults and then to `Default::default()`.
    pub fn validate_or_fallback(&self, query: &QueryMap) -> S::Value {
        match self.inner.schema.validate(query) {
            Ok(value) => value,
            Err(err) => {
                if self.inner.options.log_errors_to_console {
                    logging::warn!("query state does not match schema, using defaults: {err}");
                }
                self.defaults_or_empty()
            }
        }
    }

    /// Schema defaults, or `Default::default()` when the schema has none.
    pub fn defaults_or_empty(&self) -> S::Value {
        self.inner.schema.defaults().unwrap_or_else(|err| {
            if self.inner.options.log_errors_to_console {
                logging::warn!("query state schema has no valid defaults: {err}");
            }
            S::Value::default()
        })
    }

    /// Validates and writes `new_params`, preserving dynamic and foreign parameters.
    ///
    /// Resolves `true` once the router accepted the navigation and subscribers were notified.
    pub async fn set_query_params(&self, new_params: QueryMap, options: SetOptions) -> bool {
        let log = self.logs_errors(&options);
        match self.try_set_query_params(new_params, options).await {
            Ok(()) => true,
            Err(err) => {
                self.report(log, "set_query_params", &err);
                false
            }
        }
    }

    /// [`ParamStore::set_query_params`] with the failure reason.
    ///
    /// # Errors
    ///
    /// Returns [`QueryStateError`] when not in a browser, when `new_params` fail validation, or
    /// when the router rejects the navigation.
    pub async fn try_set_query_params(
        &self,
        new_params: QueryMap,
        options: SetOptions,
    ) -> Result<(), QueryStateError> {
        let router = self.inner.router.clone();
        if !router.is_browser() {
            return Err(QueryStateError::ServerContext {
                operation: "set_query_params",
            });
        }

        let resolved = options.resolve(&self.inner.options);
        let validated = self.inner.schema.validate(&new_params)?;
        let data = QueryMap::from_serializable(&validated)?;
        let schema_keys = self.inner.schema.keys();
        let pathname = router.pathname();

        let params = split_route_params(&pathname, &router.query(), |key| {
            data.contains_key(key) || schema_keys.iter().any(|schema_key| schema_key == key)
        });
        let mut payload = layer_write_payload(&params, &data);
        if !resolved.keep_empty_parameters {
            payload = strip_empty_values(&payload);
        }

        let target = NavigationTarget {
            pathname: resolved.pathname.unwrap_or(pathname),
            query: payload,
        };
        router
            .navigate(target, resolved.mode, resolved.navigation)
            .await?;
        self.invalidate();
        Ok(())
    }

    /// Removes `keys` from the URL, or writes schema defaults when `reset_to_defaults` is set.
    ///
    /// Without explicit keys, every schema key is targeted; when the schema cannot enumerate its
    /// keys, the keys of the current snapshot are used instead.
    pub async fn clear_query_params(&self, keys: Option<&[&str]>, options: ClearOptions) -> bool {
        let log = self.logs_errors(&options.write);
        match self.try_clear_query_params(keys, options).await {
            Ok(()) => true,
            Err(err) => {
                self.report(log, "clear_query_params", &err);
                false
            }
        }
    }

    /// [`ParamStore::clear_query_params`] with the failure reason.
    ///
    /// # Errors
    ///
    /// Returns [`QueryStateError`] under the same conditions as
    /// [`ParamStore::try_set_query_params`], and when schema defaults cannot be derived.
    pub async fn try_clear_query_params(
        &self,
        keys: Option<&[&str]>,
        options: ClearOptions,
    ) -> Result<(), QueryStateError> {
        let keys = keys.map(|keys| keys.iter().map(ToString::to_string).collect::<Vec<_>>());

        if options.reset_to_defaults {
            let input = self.reset_payload(keys.as_deref())?;
            return self.try_set_query_params(input, options.write).await;
        }

        let router = self.inner.router.clone();
        if !router.is_browser() {
            return Err(QueryStateError::ServerContext {
                operation: "clear_query_params",
            });
        }

        let targets = match keys {
            Some(keys) => keys,
            None => self.managed_keys()?,
        };
        let resolved = options.write.resolve(&self.inner.options);
        let pathname = router.pathname();
        let dynamic = dynamic_segment_names(&pathname);

        let mut query = router.query();
        query.retain(|key, _| {
            dynamic.iter().any(|name| name == key) || !targets.iter().any(|target| target == key)
        });

        let target = NavigationTarget {
            pathname: resolved.pathname.unwrap_or(pathname),
            query,
        };
        router
            .navigate(target, resolved.mode, resolved.navigation)
            .await?;
        self.invalidate();
        Ok(())
    }

    /// Registers `callback` to run after every invalidation.
    pub fn subscribe(&self, callback: SubscriberCallback) -> Subscription {
        let set = &self.inner.subscribers;
        let id = set.next_id.get();
        set.next_id.set(id + 1);
        set.callbacks.borrow_mut().insert(id, callback);
        Subscription {
            id,
            set: Rc::downgrade(set),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.callbacks.borrow().len()
    }

    /// Drops the cached snapshot and notifies every subscriber.
    pub fn invalidate(&self) {
        self.inner.snapshot.borrow_mut().take();
        self.inner.subscribers.notify();
    }

    /// Forgets the bootstrap query, the cached snapshot, and the first-load reconciliation.
    pub fn reset_initialization(&self) {
        *self.inner.init.borrow_mut() = InitializationState::default();
        self.inner.snapshot.borrow_mut().take();
        self.inner.first_load_claimed.set(false);
    }

    /// Encodes a validated value as its query mapping.
    ///
    /// # Errors
    ///
    /// Returns an error when the value does not serialize to a flat object.
    pub fn encode(&self, value: &S::Value) -> Result<QueryMap, QueryEncodeError> {
        QueryMap::from_serializable(value)
    }

    /// Records a mounted binding; returns `true` when it is the only one.
    pub(crate) fn binding_mounted(&self) -> bool {
        let count = self.inner.mounted_bindings.get() + 1;
        self.inner.mounted_bindings.set(count);
        count == 1
    }

    /// Claims the first-load reconciliation write; `true` only for the first caller.
    pub(crate) fn claim_first_load(&self) -> bool {
        !self.inner.first_load_claimed.replace(true)
    }

    pub(crate) fn binding_unmounted(&self) {
        let count = self.inner.mounted_bindings.get();
        self.inner.mounted_bindings.set(count.saturating_sub(1));
    }

    pub(crate) fn logs_errors(&self, options: &SetOptions) -> bool {
        options.resolve(&self.inner.options).log_errors
    }

    pub(crate) fn report(&self, log: bool, operation: &str, err: &QueryStateError) {
        if !log {
            return;
        }
        match err {
            QueryStateError::Navigation(_) => logging::error!("{operation} failed: {err}"),
            _ => logging::warn!("{operation} failed: {err}"),
        }
    }

    fn latch_initial(&self, initial: &QueryMap) {
        let mut init = self.inner.init.borrow_mut();
        if !init.is_initialized && !initial.is_empty() {
            init.is_initialized = true;
            init.initial_query = initial.clone();
        }
    }

    fn bootstrap_query(&self, initial: Option<&QueryMap>) -> QueryMap {
        let init = self.inner.init.borrow();
        if init.is_initialized {
            init.initial_query.clone()
        } else {
            initial.cloned().unwrap_or_default()
        }
    }

    /// Schema defaults for `keys` (every key when `None`) over the still-valid router values.
    ///
    /// A router value is kept only when it validates on top of the full defaults, so a malformed
    /// field elsewhere in the URL falls back to its default instead of failing the reset.
    fn reset_payload(&self, keys: Option<&[String]>) -> Result<QueryMap, QueryStateError> {
        let defaults = QueryMap::from_serializable(&self.inner.schema.defaults()?)?;
        let is_target =
            |key: &str| keys.map_or(true, |keys| keys.iter().any(|target| target == key));

        let mut payload = defaults.clone();
        for (key, value) in &self.inner.router.query() {
            if is_target(key.as_str()) {
                continue;
            }
            let candidate = defaults.merged(&QueryMap::from_pairs([(key.clone(), value.clone())]));
            if self.inner.schema.validate(&candidate).is_ok() {
                payload.insert(key.clone(), value.clone());
            }
        }
        Ok(payload)
    }

    fn managed_keys(&self) -> Result<Vec<String>, QueryEncodeError> {
        let keys = self.inner.schema.keys();
        if !keys.is_empty() {
            return Ok(keys);
        }
        let snapshot = self.encode(&self.get_snapshot(None))?;
        Ok(snapshot.keys().map(str::to_string).collect())
    }
}
