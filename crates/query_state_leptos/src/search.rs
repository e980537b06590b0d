//! Conversion between [`QueryMap`] and `location.search` / `href` strings.

use query_state::dynamic_segment_name;
use query_state_contract::{QueryMap, QueryValue};

/// Parses a search string (`?a=1&b=2&b=3`) into a query mapping.
///
/// Repeated keys collect into [`QueryValue::Multiple`]; `+` decodes as a space.
pub fn parse_search(search: &str) -> QueryMap {
    let mut query = QueryMap::new();

    for pair in search
        .trim_start_matches('?')
        .split('&')
        .filter(|part| !part.is_empty())
    {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        if key.is_empty() {
            continue;
        }
        let value = decode_component(value);

        let merged = match query.remove(&key) {
            None => QueryValue::Single(value),
            Some(QueryValue::Single(first)) => QueryValue::Multiple(vec![first, value]),
            Some(QueryValue::Multiple(mut values)) => {
                values.push(value);
                QueryValue::Multiple(values)
            }
            Some(QueryValue::Absent) => QueryValue::Single(value),
        };
        query.insert(key, merged);
    }

    query
}

/// Serializes `query` as a search string without the leading `?`.
///
/// Absent values are skipped; sequences repeat the key.
pub fn to_search(query: &QueryMap) -> String {
    let mut pairs = Vec::new();
    for (key, value) in query {
        for item in value.values() {
            pairs.push(format!(
                "{}={}",
                encode_component(key),
                encode_component(item)
            ));
        }
    }
    pairs.join("&")
}

/// Builds an `href` for `pattern`, filling dynamic segments from `query`.
///
/// Keys consumed by segments are left out of the search string. Catch-all values join with `/`;
/// an unfilled optional catch-all segment is dropped.
pub fn build_href(pattern: &str, query: &QueryMap) -> String {
    let mut remaining = query.clone();
    let mut segments = Vec::new();

    for segment in pattern.split('/') {
        match dynamic_segment_name(segment) {
            Some(name) => {
                let filled = remaining
                    .remove(name)
                    .map(|value| {
                        value
                            .values()
                            .iter()
                            .map(|item| encode_component(item))
                            .collect::<Vec<_>>()
                            .join("/")
                    })
                    .unwrap_or_default();
                if !filled.is_empty() || !segment.starts_with("[[") {
                    segments.push(filled);
                }
            }
            None => segments.push(segment.to_string()),
        }
    }

    let mut href = segments.join("/");
    if href.is_empty() {
        href.push('/');
    }
    let search = to_search(&remaining);
    if !search.is_empty() {
        href.push('?');
        href.push_str(&search);
    }
    href
}

fn encode_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(char::from(byte));
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

fn decode_component(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        match bytes[index] {
            b'+' => decoded.push(b' '),
            b'%' => {
                let escaped = raw
                    .get(index + 1..index + 3)
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                if let Some(byte) = escaped {
                    decoded.push(byte);
                    index += 3;
                    continue;
                }
                decoded.push(b'%');
            }
            byte => decoded.push(byte),
        }
        index += 1;
    }

    String::from_utf8_lossy(&decoded).into_owned()
}
