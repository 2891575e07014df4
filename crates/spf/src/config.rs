//! Runtime configuration for the SPF navigation engine.
//!
//! Mirrors `page_handler::utilities::config::ValorConfig`: a plain struct
//! with a `const fn new` constructor that validates/clamps its arguments,
//! and a `from_env` loader that reads `SPF_`-prefixed environment
//! variables with the same `.ok().and_then(...)` parse-or-default chain.

use core::time::Duration;
use std::collections::HashMap;
use std::env;

/// All configuration keys named in spec.md §6 "Configuration keys", plus
/// the two Open-Question behavior flags resolved in `DESIGN.md`.
#[derive(Clone, Debug)]
pub struct SpfConfig {
    /// Query-string pattern appended to request URLs, with `__type__`
    /// substituted for the request type (e.g. `"?spf=__type__"`).
    pub url_identifier: Option<String>,
    /// When `true`, the prefetch/navigate/history caches share one
    /// namespace instead of being key-prefixed apart.
    pub cache_unified: bool,
    /// How long a cache entry remains valid.
    pub cache_lifetime: Duration,
    /// Class name marking an anchor as SPF-navigable.
    pub link_class: String,
    /// Class name marking an anchor (or an ancestor) as opted out of SPF.
    pub nolink_class: String,
    /// Maximum navigations per page load before falling back to reload.
    pub navigate_limit: Option<u32>,
    /// Maximum age of the page before falling back to reload.
    pub navigate_lifetime: Option<Duration>,
    /// Class name marking a body fragment as animated.
    pub animation_class: String,
    /// Duration of the animated transition's final step.
    pub animation_duration: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Headers merged into every outgoing request before per-call options.
    pub request_headers: HashMap<String, String>,
    /// Use `X-SPF-Request`/`Accept` headers instead of a query identifier.
    pub advanced_header_identifier: bool,
    /// Treat the raw response as natively JSON-typed (skip chunk framing).
    pub advanced_response_type_json: bool,
    /// Schedule a prefetch on `mousedown` ahead of `click`.
    pub experimental_prefetch_mousedown: bool,
    /// Enforce same-origin checks on history-driven navigations.
    pub experimental_same_origin: bool,
    /// Drop the current history entry before reloading when the URLs match.
    pub experimental_remove_history: bool,
    /// Hand fragment HTML off to an external handler instead of innerHTML.
    pub experimental_html_handler: bool,
    /// Process responses asynchronously even when not multipart.
    pub experimental_process_async: bool,
    /// Persist navigation timing across the reload boundary.
    pub advanced_navigate_persist_timing: bool,
    /// Query-parameter name the reload reason code is stamped under.
    pub reload_identifier: String,
    /// See `DESIGN.md` Open Question 1. Default `true`.
    pub stamp_cache_key_on_promoted_prefetch: bool,
    /// See `DESIGN.md` Open Question 2. Default `true` (redirect wins).
    pub redirect_wins_over_reload: bool,
}

impl Default for SpfConfig {
    fn default() -> Self {
        Self {
            url_identifier: Some("?spf=__type__".to_owned()),
            cache_unified: false,
            cache_lifetime: Duration::from_secs(10 * 60),
            link_class: "spf-link".to_owned(),
            nolink_class: "spf-nolink".to_owned(),
            navigate_limit: None,
            navigate_lifetime: None,
            animation_class: "spf-animate".to_owned(),
            animation_duration: Duration::from_millis(425),
            request_timeout: Duration::from_secs(0),
            request_headers: HashMap::new(),
            advanced_header_identifier: false,
            advanced_response_type_json: false,
            experimental_prefetch_mousedown: false,
            experimental_same_origin: false,
            experimental_remove_history: false,
            experimental_html_handler: false,
            experimental_process_async: false,
            advanced_navigate_persist_timing: false,
            reload_identifier: "spf-reload-reason".to_owned(),
            stamp_cache_key_on_promoted_prefetch: true,
            redirect_wins_over_reload: true,
        }
    }
}

impl SpfConfig {
    /// Loads configuration from environment variables, falling back to
    /// [`SpfConfig::default`] for anything unset or unparsable.
    ///
    /// Reads: `SPF_URL_IDENTIFIER`, `SPF_CACHE_UNIFIED`,
    /// `SPF_CACHE_LIFETIME_MS`, `SPF_LINK_CLASS`, `SPF_NOLINK_CLASS`,
    /// `SPF_NAVIGATE_LIMIT`, `SPF_NAVIGATE_LIFETIME_MS`,
    /// `SPF_ANIMATION_CLASS`, `SPF_ANIMATION_DURATION_MS`,
    /// `SPF_REQUEST_TIMEOUT_MS`, `SPF_ADVANCED_HEADER_IDENTIFIER`,
    /// `SPF_ADVANCED_RESPONSE_TYPE_JSON`,
    /// `SPF_EXPERIMENTAL_PREFETCH_MOUSEDOWN`,
    /// `SPF_EXPERIMENTAL_SAME_ORIGIN`, `SPF_EXPERIMENTAL_REMOVE_HISTORY`,
    /// `SPF_EXPERIMENTAL_HTML_HANDLER`, `SPF_EXPERIMENTAL_PROCESS_ASYNC`,
    /// `SPF_ADVANCED_NAVIGATE_PERSIST_TIMING`, `SPF_RELOAD_IDENTIFIER`.
    #[must_use]
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            url_identifier: env::var("SPF_URL_IDENTIFIER")
                .ok()
                .or(default.url_identifier),
            cache_unified: env_bool("SPF_CACHE_UNIFIED", default.cache_unified),
            cache_lifetime: env::var("SPF_CACHE_LIFETIME_MS")
                .ok()
                .and_then(|val| val.parse::<u64>().ok())
                .map_or(default.cache_lifetime, Duration::from_millis),
            link_class: env::var("SPF_LINK_CLASS").unwrap_or(default.link_class),
            nolink_class: env::var("SPF_NOLINK_CLASS").unwrap_or(default.nolink_class),
            navigate_limit: env::var("SPF_NAVIGATE_LIMIT")
                .ok()
                .and_then(|val| val.parse::<u32>().ok())
                .or(default.navigate_limit),
            navigate_lifetime: env::var("SPF_NAVIGATE_LIFETIME_MS")
                .ok()
                .and_then(|val| val.parse::<u64>().ok())
                .map(Duration::from_millis)
                .or(default.navigate_lifetime),
            animation_class: env::var("SPF_ANIMATION_CLASS").unwrap_or(default.animation_class),
            animation_duration: env::var("SPF_ANIMATION_DURATION_MS")
                .ok()
                .and_then(|val| val.parse::<u64>().ok())
                .map_or(default.animation_duration, Duration::from_millis),
            request_timeout: env::var("SPF_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|val| val.parse::<u64>().ok())
                .map_or(default.request_timeout, Duration::from_millis),
            request_headers: default.request_headers.clone(),
            advanced_header_identifier: env_bool(
                "SPF_ADVANCED_HEADER_IDENTIFIER",
                default.advanced_header_identifier,
            ),
            advanced_response_type_json: env_bool(
                "SPF_ADVANCED_RESPONSE_TYPE_JSON",
                default.advanced_response_type_json,
            ),
            experimental_prefetch_mousedown: env_bool(
                "SPF_EXPERIMENTAL_PREFETCH_MOUSEDOWN",
                default.experimental_prefetch_mousedown,
            ),
            experimental_same_origin: env_bool(
                "SPF_EXPERIMENTAL_SAME_ORIGIN",
                default.experimental_same_origin,
            ),
            experimental_remove_history: env_bool(
                "SPF_EXPERIMENTAL_REMOVE_HISTORY",
                default.experimental_remove_history,
            ),
            experimental_html_handler: env_bool(
                "SPF_EXPERIMENTAL_HTML_HANDLER",
                default.experimental_html_handler,
            ),
            experimental_process_async: env_bool(
                "SPF_EXPERIMENTAL_PROCESS_ASYNC",
                default.experimental_process_async,
            ),
            advanced_navigate_persist_timing: env_bool(
                "SPF_ADVANCED_NAVIGATE_PERSIST_TIMING",
                default.advanced_navigate_persist_timing,
            ),
            reload_identifier: env::var("SPF_RELOAD_IDENTIFIER")
                .unwrap_or(default.reload_identifier),
            ..default
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key).ok().as_deref().map_or(default, |val| val == "1" || val == "true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_defaults() {
        let config = SpfConfig::default();
        assert_eq!(config.url_identifier.as_deref(), Some("?spf=__type__"));
        assert!(!config.cache_unified);
        assert_eq!(config.link_class, "spf-link");
        assert!(config.stamp_cache_key_on_promoted_prefetch);
        assert!(config.redirect_wins_over_reload);
    }

    #[test]
    fn unset_env_falls_back_to_default() {
        // SAFETY-irrelevant: reading an env var that almost certainly
        // isn't set in any test runner.
        env::remove_var("SPF_LINK_CLASS_TEST_PROBE_UNUSED");
        let config = SpfConfig::from_env();
        assert_eq!(config.reload_identifier, "spf-reload-reason");
    }
}
