//! Public factory: one store per schema, handing out per-mount handles.

use std::{fmt, marker::PhantomData, rc::Rc};

use futures::{future::LocalBoxFuture, FutureExt};
use leptos::logging;
use query_state_contract::{
    ClearOptions, QueryMap, QuerySchema, QueryStateOptions, RouterAdapter, SetOptions,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    binding::{QueryBinding, SetFuture},
    scheduler::BindingScheduler,
    store::ParamStore,
};

/// Creates a store for `schema` over `router`.
///
/// Every handle obtained from the returned [`QueryStore`] shares one snapshot and one subscriber
/// set; stores from separate calls share nothing.
pub fn create_query_store<S: QuerySchema + 'static>(
    schema: S,
    router: Rc<dyn RouterAdapter>,
    scheduler: Rc<dyn BindingScheduler>,
    options: QueryStateOptions,
) -> QueryStore<S> {
    QueryStore {
        store: ParamStore::new(schema, router, options),
        scheduler,
    }
}

/// Factory output: hands out bindings over one shared [`ParamStore`].
pub struct QueryStore<S: QuerySchema> {
    store: ParamStore<S>,
    scheduler: Rc<dyn BindingScheduler>,
}

impl<S: QuerySchema> Clone for QueryStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<S: QuerySchema + 'static> fmt::Debug for QueryStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryStore")
            .field("store", &self.store)
            .finish()
    }
}

impl<S: QuerySchema + 'static> QueryStore<S> {
    /// Shared parameter store.
    pub fn store(&self) -> &ParamStore<S> {
        &self.store
    }

    /// Mounts an all-parameters binding; `on_change` runs whenever the rendered value changes.
    pub fn use_query_params(
        &self,
        initial: Option<QueryMap>,
        on_change: impl Fn() + 'static,
    ) -> QueryParamsHandle<S> {
        QueryParamsHandle {
            binding: QueryBinding::mount(
                self.store.clone(),
                self.scheduler.clone(),
                initial,
                Rc::new(on_change),
            ),
        }
    }

    /// Mounts a binding that exposes one field, decoded as `V`.
    pub fn use_query_param<V>(
        &self,
        key: impl Into<String>,
        initial: Option<QueryMap>,
        on_change: impl Fn() + 'static,
    ) -> QueryParamHandle<S, V>
    where
        V: Serialize + DeserializeOwned,
    {
        QueryParamHandle {
            key: key.into(),
            params: self.use_query_params(initial, on_change),
            marker: PhantomData,
        }
    }

    /// Removes `keys` (or every schema key) from the URL, or resets them to schema defaults.
    pub fn clear_query_params(
        &self,
        keys: Option<Vec<String>>,
        options: ClearOptions,
    ) -> LocalBoxFuture<'static, bool> {
        let store = self.store.clone();
        async move {
            let keys = keys.as_ref().map(|keys| {
                keys.iter().map(String::as_str).collect::<Vec<_>>()
            });
            store.clear_query_params(keys.as_deref(), options).await
        }
        .boxed_local()
    }
}

/// Mounted all-parameters handle; unmounts its binding on drop.
pub struct QueryParamsHandle<S: QuerySchema + 'static> {
    binding: QueryBinding<S>,
}

impl<S: QuerySchema + 'static> fmt::Debug for QueryParamsHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryParamsHandle")
            .field("binding", &self.binding)
            .finish()
    }
}

impl<S: QuerySchema + 'static> QueryParamsHandle<S> {
    /// Current validated value.
    pub fn value(&self) -> S::Value {
        self.binding.value()
    }

    /// Replaces the whole value.
    pub fn set(&self, value: S::Value, options: SetOptions) -> SetFuture {
        self.binding.set(value, options)
    }

    /// Edits a copy of the current value and sets it.
    pub fn update(&self, edit: impl FnOnce(&mut S::Value), options: SetOptions) -> SetFuture {
        let mut value = self.binding.value();
        edit(&mut value);
        self.binding.set(value, options)
    }

    /// Overlays raw query values on the current value; the merge is validated before it is set.
    pub fn patch(&self, patch: &QueryMap, options: SetOptions) -> SetFuture {
        self.binding.patch(patch, options)
    }

    /// Underlying binding.
    pub fn binding(&self) -> &QueryBinding<S> {
        &self.binding
    }
}

impl<S: QuerySchema + 'static> Drop for QueryParamsHandle<S> {
    fn drop(&mut self) {
        self.binding.unmount();
    }
}

/// Mounted single-field handle.
pub struct QueryParamHandle<S: QuerySchema + 'static, V> {
    key: String,
    params: QueryParamsHandle<S>,
    marker: PhantomData<fn() -> V>,
}

impl<S: QuerySchema + 'static, V> fmt::Debug for QueryParamHandle<S, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryParamHandle")
            .field("key", &self.key)
            .field("params", &self.params)
            .finish()
    }
}

impl<S, V> QueryParamHandle<S, V>
where
    S: QuerySchema + 'static,
    V: Serialize + DeserializeOwned,
{
    /// Field name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current field value; `None` when the field is unset or does not decode as `V`.
    pub fn value(&self) -> Option<V> {
        let value = serde_json::to_value(self.params.value()).ok()?;
        match value {
            Value::Object(mut object) => object
                .remove(&self.key)
                .filter(|field| !field.is_null())
                .and_then(|field| serde_json::from_value(field).ok()),
            _ => None,
        }
    }

    /// Sets the field; `None` clears it.
    pub fn set(&self, value: Option<V>, options: SetOptions) -> SetFuture {
        let field = match serde_json::to_value(value) {
            Ok(field) => field,
            Err(err) => {
                if self.params.binding.store().logs_errors(&options) {
                    logging::warn!("query param `{}` failed to serialize: {err}", self.key);
                }
                return futures::future::ready(false).boxed_local();
            }
        };
        let mut object = serde_json::Map::new();
        object.insert(self.key.clone(), field);

        match QueryMap::from_serializable(&Value::Object(object)) {
            Ok(patch) => self.params.patch(&patch, options),
            Err(err) => {
                if self.params.binding.store().logs_errors(&options) {
                    logging::warn!("query param `{}` failed to encode: {err}", self.key);
                }
                futures::future::ready(false).boxed_local()
            }
        }
    }

    /// All-parameters handle this field handle reads through.
    pub fn params(&self) -> &QueryParamsHandle<S> {
        &self.params
    }
}
