//! # pwx-config — Layered Runtime Configuration
//!
//! Resolution order, later layers win:
//! defaults → host-page script attributes (`data-pwx-*` on the loader
//! `<script>` tag) → global override object (read once at init) →
//! caller-supplied options.
//!
//! Every layer is merged through the same camelCase JSON shape, so DOM
//! strings, the host page's override object and programmatic options
//! cannot drift apart.

#![forbid(unsafe_code)]

use pwx_core::attrs::coerce_value;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    #[serde(alias = "customer")]
    pub customer_slug: String,
    pub api_url: String,
    pub api_key: Option<String>,
    pub debug: bool,
    pub lazy_load: bool,
    pub auto_init: bool,
    pub container_selector: String,
    pub request_timeout_ms: u64,
    pub retry_attempts: u32,
    pub cache_enabled: bool,
    pub cache_ttl_ms: u64,
    pub journey_limit: usize,
    pub search_history_limit: usize,
    pub min_search_length: usize,
    pub analytics: bool,
    pub primary_color: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            customer_slug: String::new(),
            api_url: "https://api.pwx.dev".to_string(),
            api_key: None,
            debug: false,
            lazy_load: true,
            auto_init: true,
            container_selector: "[data-pwx-widget]".to_string(),
            request_timeout_ms: 10_000,
            retry_attempts: 2,
            cache_enabled: true,
            cache_ttl_ms: 300_000,
            journey_limit: 50,
            search_history_limit: 20,
            min_search_length: 2,
            analytics: true,
            primary_color: None,
        }
    }
}

/// Script-tag attribute → config key mapping of the integration contract.
const SCRIPT_ATTRS: &[(&str, &str)] = &[
    ("data-pwx-customer", "customerSlug"),
    ("data-pwx-api-key", "apiKey"),
    ("data-pwx-api-url", "apiUrl"),
    ("data-pwx-debug", "debug"),
    ("data-pwx-lazy", "lazyLoad"),
    ("data-pwx-auto-init", "autoInit"),
    ("data-pwx-primary-color", "primaryColor"),
];

impl RuntimeConfig {
    /// Resolve all four layers. `script_attrs` are the loader script tag's
    /// attributes; `global_override` is the page's override object;
    /// `options` are caller-supplied.
    pub fn resolve<'a>(
        script_attrs: impl IntoIterator<Item = (&'a str, &'a str)>,
        global_override: Option<&Value>,
        options: Option<&Value>,
    ) -> Self {
        let mut config = Self::default();
        config.apply_script_attrs(script_attrs);
        if let Some(overrides) = global_override {
            config.apply_patch(overrides);
        }
        if let Some(options) = options {
            config.apply_patch(options);
        }
        config
    }

    pub fn apply_script_attrs<'a>(
        &mut self,
        attrs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) {
        let mut patch = serde_json::Map::new();
        for (name, raw) in attrs {
            if let Some((_, key)) = SCRIPT_ATTRS.iter().find(|(attr, _)| *attr == name) {
                patch.insert((*key).to_string(), coerce_value(raw));
            }
        }
        if !patch.is_empty() {
            self.apply_patch(&Value::Object(patch));
        }
    }

    /// Merge a partial override object into this config. Unknown keys are
    /// ignored with a debug log; type mismatches leave the field as-is.
    /// Returns the camelCase names of fields that actually changed.
    pub fn apply_patch(&mut self, patch: &Value) -> Vec<String> {
        let Value::Object(patch) = patch else {
            return Vec::new();
        };
        let Ok(Value::Object(mut current)) = serde_json::to_value(&*self) else {
            return Vec::new();
        };

        let mut changed = Vec::new();
        for (key, value) in patch {
            match current.get(key) {
                Some(existing) if existing == value => {}
                Some(_) => {
                    let mut candidate = current.clone();
                    candidate.insert(key.clone(), value.clone());
                    // Reject patches that break the field's type.
                    match serde_json::from_value::<Self>(Value::Object(candidate.clone())) {
                        Ok(_) => {
                            current = candidate;
                            changed.push(key.clone());
                        }
                        Err(err) => {
                            log::warn!("pwx-config: ignoring override {key:?}: {err}");
                        }
                    }
                }
                None if key == "customer" => {
                    // Alias accepted from host pages.
                    if let Some(slug) = value.as_str() {
                        if self.customer_slug != slug {
                            current.insert("customerSlug".into(), value.clone());
                            changed.push("customerSlug".into());
                        }
                    }
                }
                None => {
                    log::debug!("pwx-config: unknown override key {key:?}");
                }
            }
        }

        if !changed.is_empty() {
            if let Ok(updated) = serde_json::from_value::<Self>(Value::Object(current)) {
                *self = updated;
            }
        }
        changed
    }

    /// Validate the resolved configuration, returning every violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        if self.customer_slug.trim().is_empty() {
            problems.push("customerSlug must not be empty".to_string());
        } else if !self
            .customer_slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            problems.push(format!(
                "customerSlug {:?} contains invalid characters",
                self.customer_slug
            ));
        }
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            problems.push(format!("apiUrl {:?} must be http(s)", self.api_url));
        }
        if self.request_timeout_ms == 0 {
            problems.push("requestTimeoutMs must be positive".to_string());
        }
        if self.retry_attempts > 10 {
            problems.push("retryAttempts must be at most 10".to_string());
        }
        if self.container_selector.trim().is_empty() {
            problems.push("containerSelector must not be empty".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }

    /// API base without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn later_layers_win() {
        let config = RuntimeConfig::resolve(
            [
                ("data-pwx-customer", "acme"),
                ("data-pwx-debug", "true"),
                ("src", "https://cdn.pwx.dev/pwx.js"),
            ],
            Some(&json!({"debug": false, "cacheTtlMs": 60000})),
            Some(&json!({"cacheTtlMs": 1000})),
        );
        assert_eq!(config.customer_slug, "acme");
        assert!(!config.debug);
        assert_eq!(config.cache_ttl_ms, 1000);
    }

    #[test]
    fn patch_reports_changed_keys_and_keeps_types() {
        let mut config = RuntimeConfig::default();
        let changed = config.apply_patch(&json!({
            "customerSlug": "acme",
            "retryAttempts": "lots",     // wrong type, ignored
            "nonsense": 1,               // unknown, ignored
            "lazyLoad": false
        }));
        assert_eq!(changed, vec!["customerSlug".to_string(), "lazyLoad".to_string()]);
        assert_eq!(config.retry_attempts, 2);
        assert!(!config.lazy_load);
    }

    #[test]
    fn customer_alias_is_accepted() {
        let mut config = RuntimeConfig::default();
        let changed = config.apply_patch(&json!({"customer": "acme"}));
        assert_eq!(changed, vec!["customerSlug".to_string()]);
        assert_eq!(config.customer_slug, "acme");
    }

    #[test]
    fn validate_collects_all_problems() {
        let mut config = RuntimeConfig::default();
        config.api_url = "ftp://files".into();
        config.request_timeout_ms = 0;
        let Err(ConfigError::Invalid(message)) = config.validate() else {
            panic!("expected invalid config");
        };
        assert!(message.contains("customerSlug"));
        assert!(message.contains("apiUrl"));
        assert!(message.contains("requestTimeoutMs"));
    }

    #[test]
    fn valid_config_passes() {
        let mut config = RuntimeConfig::default();
        config.customer_slug = "acme-shop".into();
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn api_base_strips_trailing_slash() {
        let mut config = RuntimeConfig::default();
        config.api_url = "https://api.pwx.dev/".into();
        assert_eq!(config.api_base(), "https://api.pwx.dev");
    }
}
