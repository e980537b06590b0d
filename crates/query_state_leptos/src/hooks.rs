//! Reactive hooks: query-backed values as Leptos signals.

use futures::FutureExt;
use leptos::{
    create_rw_signal, on_cleanup, provide_context, store_value, use_context, Signal, SignalGet,
    SignalUpdate, StoredValue,
};
use query_state::{QueryParamHandle, QueryParamsHandle, QueryStore, SetFuture};
use query_state_contract::{QueryMap, QuerySchema, SetOptions};
use serde::{de::DeserializeOwned, Serialize};

/// Makes `store` available to [`use_query_store`] in descendant components.
pub fn provide_query_store<S: QuerySchema + 'static>(store: QueryStore<S>) {
    provide_context(store);
}

/// Returns the store provided by an ancestor for schema `S`.
pub fn use_query_store<S: QuerySchema + 'static>() -> Option<QueryStore<S>> {
    use_context::<QueryStore<S>>()
}

/// Setter returned by [`use_query_params`].
pub struct QueryParamsSetter<S: QuerySchema + 'static> {
    handle: StoredValue<QueryParamsHandle<S>>,
}

impl<S: QuerySchema + 'static> Clone for QueryParamsSetter<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: QuerySchema + 'static> Copy for QueryParamsSetter<S> {}

impl<S: QuerySchema + 'static> QueryParamsSetter<S> {
    /// Replaces the whole value.
    pub fn set(&self, value: S::Value, options: SetOptions) -> SetFuture {
        self.handle
            .try_with_value(|handle| handle.set(value, options))
            .unwrap_or_else(disposed)
    }

    /// Edits a copy of the current value and sets it.
    pub fn update(&self, edit: impl FnOnce(&mut S::Value), options: SetOptions) -> SetFuture {
        self.handle
            .try_with_value(|handle| handle.update(edit, options))
            .unwrap_or_else(disposed)
    }

    /// Overlays raw query values on the current value.
    pub fn patch(&self, patch: &QueryMap, options: SetOptions) -> SetFuture {
        self.handle
            .try_with_value(|handle| handle.patch(patch, options))
            .unwrap_or_else(disposed)
    }
}

/// Setter returned by [`use_query_param`].
pub struct QueryParamSetter<S: QuerySchema + 'static, V: 'static> {
    handle: StoredValue<QueryParamHandle<S, V>>,
}

impl<S: QuerySchema + 'static, V: 'static> Clone for QueryParamSetter<S, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: QuerySchema + 'static, V: 'static> Copy for QueryParamSetter<S, V> {}

impl<S, V> QueryParamSetter<S, V>
where
    S: QuerySchema + 'static,
    V: Serialize + DeserializeOwned + 'static,
{
    /// Sets the field; `None` clears it.
    pub fn set(&self, value: Option<V>, options: SetOptions) -> SetFuture {
        self.handle
            .try_with_value(|handle| handle.set(value, options))
            .unwrap_or_else(disposed)
    }
}

/// Mounts an all-parameters binding for the current component.
///
/// The signal re-renders on every value change; the binding unmounts with the owning scope.
pub fn use_query_params<S: QuerySchema + 'static>(
    store: &QueryStore<S>,
    initial: Option<QueryMap>,
) -> (Signal<S::Value>, QueryParamsSetter<S>) {
    let version = create_rw_signal(0_u64);
    let handle = store_value(store.use_query_params(initial, move || bump(version)));
    on_cleanup(move || {
        handle.try_with_value(|handle| handle.binding().unmount());
    });

    let value = Signal::derive(move || {
        version.get();
        handle
            .try_with_value(QueryParamsHandle::value)
            .unwrap_or_default()
    });
    (value, QueryParamsSetter { handle })
}

/// Mounts a binding that exposes the single field `key`, decoded as `V`.
pub fn use_query_param<S, V>(
    store: &QueryStore<S>,
    key: impl Into<String>,
    initial: Option<QueryMap>,
) -> (Signal<Option<V>>, QueryParamSetter<S, V>)
where
    S: QuerySchema + 'static,
    V: Serialize + DeserializeOwned + Clone + 'static,
{
    let version = create_rw_signal(0_u64);
    let handle = store_value(store.use_query_param::<V>(key, initial, move || bump(version)));
    on_cleanup(move || {
        handle.try_with_value(|handle| handle.params().binding().unmount());
    });

    let value = Signal::derive(move || {
        version.get();
        handle.try_with_value(QueryParamHandle::value).flatten()
    });
    (value, QueryParamSetter { handle })
}

fn bump(version: leptos::RwSignal<u64>) {
    let _ = version.try_update(|version| *version = version.wrapping_add(1));
}

fn disposed() -> SetFuture {
    futures::future::ready(false).boxed_local()
}
