//! Store-wide configuration and per-call overrides.

use serde::{Deserialize, Serialize};

use crate::router::{HistoryMode, NavigationOptions};

/// Default trailing-edge debounce window for binding write-back.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// Store-wide options shared by every binding created from one store.
pub struct QueryStateOptions {
    /// Shallow navigation (URL and component state only).
    pub shallow: bool,
    /// Locale forwarded to the router.
    pub locale: Option<String>,
    /// Scroll behavior forwarded to the router.
    pub scroll: Option<bool>,
    /// Replace the history entry instead of pushing one.
    pub replace: bool,
    /// Emit diagnostics for swallowed failures.
    pub log_errors_to_console: bool,
    /// Write empty values instead of removing their keys.
    pub keep_empty_parameters: bool,
    /// Binding write-back debounce window in milliseconds.
    pub debounce_ms: u64,
}

impl Default for QueryStateOptions {
    fn default() -> Self {
        Self {
            shallow: true,
            locale: None,
            scroll: None,
            replace: false,
            log_errors_to_console: false,
            keep_empty_parameters: false,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl QueryStateOptions {
    /// Parses options from a JSON config blob; missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when `raw` is not a valid options object.
    pub fn from_json_str(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// Per-call overrides for writes. `None` falls back to the store-wide value.
pub struct SetOptions {
    /// Shallow navigation override.
    pub shallow: Option<bool>,
    /// Locale override.
    pub locale: Option<String>,
    /// Scroll override.
    pub scroll: Option<bool>,
    /// History replace override.
    pub replace: Option<bool>,
    /// Diagnostics override.
    pub log_errors_to_console: Option<bool>,
    /// Empty-value retention override.
    pub keep_empty_parameters: Option<bool>,
    /// Pathname to navigate to instead of the current one.
    pub pathname: Option<String>,
}

impl SetOptions {
    /// Options that force a `replace` + `shallow` write.
    pub fn replace_shallow() -> Self {
        Self {
            shallow: Some(true),
            replace: Some(true),
            ..Self::default()
        }
    }

    /// Layers `self` over `other`: fields set here win.
    pub fn or(&self, other: &SetOptions) -> SetOptions {
        SetOptions {
            shallow: self.shallow.or(other.shallow),
            locale: self.locale.clone().or_else(|| other.locale.clone()),
            scroll: self.scroll.or(other.scroll),
            replace: self.replace.or(other.replace),
            log_errors_to_console: self.log_errors_to_console.or(other.log_errors_to_console),
            keep_empty_parameters: self.keep_empty_parameters.or(other.keep_empty_parameters),
            pathname: self.pathname.clone().or_else(|| other.pathname.clone()),
        }
    }

    /// Resolves against store-wide options.
    pub fn resolve(&self, store: &QueryStateOptions) -> ResolvedWrite {
        ResolvedWrite {
            mode: if self.replace.unwrap_or(store.replace) {
                HistoryMode::Replace
            } else {
                HistoryMode::Push
            },
            navigation: NavigationOptions {
                shallow: self.shallow.unwrap_or(store.shallow),
                locale: self.locale.clone().or_else(|| store.locale.clone()),
                scroll: self.scroll.or(store.scroll),
            },
            log_errors: self
                .log_errors_to_console
                .unwrap_or(store.log_errors_to_console),
            keep_empty_parameters: self
                .keep_empty_parameters
                .unwrap_or(store.keep_empty_parameters),
            pathname: self.pathname.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// Per-call options for clearing parameters.
pub struct ClearOptions {
    /// Write overrides shared with [`SetOptions`].
    #[serde(flatten)]
    pub write: SetOptions,
    /// Write schema defaults instead of removing keys.
    pub reset_to_defaults: bool,
}

impl ClearOptions {
    /// Options selecting reset-to-defaults mode.
    pub fn reset_to_defaults() -> Self {
        Self {
            write: SetOptions::default(),
            reset_to_defaults: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Fully resolved write settings.
pub struct ResolvedWrite {
    /// History mode.
    pub mode: HistoryMode,
    /// Flags forwarded to the router.
    pub navigation: NavigationOptions,
    /// Whether failures are logged.
    pub log_errors: bool,
    /// Whether empty values survive filtering.
    pub keep_empty_parameters: bool,
    /// Pathname override.
    pub pathname: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn per_call_options_override_store_wide_values() {
        let store = QueryStateOptions {
            replace: true,
            locale: Some("fr".into()),
            ..QueryStateOptions::default()
        };
        let call = SetOptions {
            replace: Some(false),
            keep_empty_parameters: Some(true),
            ..SetOptions::default()
        };

        let resolved = call.resolve(&store);
        assert_eq!(resolved.mode, HistoryMode::Push);
        assert!(resolved.navigation.shallow);
        assert_eq!(resolved.navigation.locale.as_deref(), Some("fr"));
        assert!(resolved.keep_empty_parameters);
        assert!(!resolved.log_errors);
    }

    #[test]
    fn store_options_load_from_partial_json() {
        let options =
            QueryStateOptions::from_json_str(r#"{"replace":true,"debounceMs":50}"#).expect("json");
        assert_eq!(
            options,
            QueryStateOptions {
                replace: true,
                debounce_ms: 50,
                ..QueryStateOptions::default()
            }
        );
        assert!(QueryStateOptions::from_json_str("not json").is_err());
    }

    #[test]
    fn clear_options_flatten_write_overrides() {
        let options: ClearOptions =
            serde_json::from_str(r#"{"resetToDefaults":true,"replace":true}"#).expect("json");
        assert!(options.reset_to_defaults);
        assert_eq!(options.write.replace, Some(true));
    }
}
