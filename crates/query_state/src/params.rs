//! Partitioning of router query keys into dynamic route segments and foreign parameters.

use query_state_contract::QueryMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Router query keys that a write must carry over untouched.
pub struct RouteParams {
    /// Keys bound by dynamic segments of the pathname template.
    pub dynamic: QueryMap,
    /// Keys that are neither dynamic nor managed by the store.
    pub foreign: QueryMap,
}

/// Names bound by dynamic segments of `pathname`.
///
/// Recognizes `[id]`, `[...slug]`, `[[...slug]]`, `:id`, and `*rest`.
pub fn dynamic_segment_names(pathname: &str) -> Vec<String> {
    pathname
        .split('/')
        .filter_map(dynamic_segment_name)
        .map(str::to_string)
        .collect()
}

/// Name bound by one pathname segment, or `None` for a static segment.
pub fn dynamic_segment_name(segment: &str) -> Option<&str> {
    let name = if let Some(inner) = segment
        .strip_prefix("[[...")
        .and_then(|rest| rest.strip_suffix("]]"))
    {
        inner
    } else if let Some(inner) = segment
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    {
        inner.strip_prefix("...").unwrap_or(inner)
    } else if let Some(inner) = segment.strip_prefix(':') {
        inner
    } else {
        segment.strip_prefix('*')?
    };

    (!name.is_empty()).then_some(name)
}

/// Splits `router_query` into dynamic and foreign parameters.
///
/// `is_managed` reports keys the caller is about to write (validated data or schema keys);
/// those are neither dynamic nor foreign unless the pathname binds them.
pub fn split_route_params(
    pathname: &str,
    router_query: &QueryMap,
    is_managed: impl Fn(&str) -> bool,
) -> RouteParams {
    let dynamic_names = dynamic_segment_names(pathname);
    let mut params = RouteParams::default();

    for (key, value) in router_query {
        if dynamic_names.iter().any(|name| name == key) {
            params.dynamic.insert(key.clone(), value.clone());
        } else if !is_managed(key) {
            params.foreign.insert(key.clone(), value.clone());
        }
    }

    params
}

/// Layers a write payload: foreign parameters, then `data`, then dynamic parameters.
pub fn layer_write_payload(params: &RouteParams, data: &QueryMap) -> QueryMap {
    let mut payload = params.foreign.clone();
    payload.extend_from(data);
    payload.extend_from(&params.dynamic);
    payload
}
