//! The request engine (spec.md §4.J): cache check, streaming chunk handling,
//! timing, and the `onPart`/`onError`/`onSuccess` callback triad.
//!
//! Structured the way [`crate::transport`] structures its own async
//! boundary: a `send` call returns a cancel handle plus a
//! `Pin<Box<dyn Future<...>>>` the caller drives to completion, rather than
//! spawning internally — the same non-`'static`, borrowed-closure shape as
//! [`crate::transport::Transport::send`], generalized one layer up to also
//! own cache lookup/write-back and multipart reassembly.

use std::cell::Cell;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use web_time::Instant;

use crate::cache::{Cache, EntryKind};
use crate::config::SpfConfig;
use crate::error::{Result, SpfError};
use crate::process::NavKind;
use crate::response::parser::{self, MultipartParser};
use crate::response::{CacheType, Response, SingleResponse, Timing};
use crate::transport::{Method, RequestOptions as TransportOptions, ResponseHeaders, Transport};
use crate::url;

/// Per-call request description (spec.md §4.J `send(url, options)`).
#[derive(Debug, Clone)]
pub struct SendOptions {
    /// The HTTP method.
    pub method: Method,
    /// Headers merged on top of [`SpfConfig::request_headers`].
    pub headers: HashMap<String, String>,
    /// The request body, for `POST`.
    pub post_data: Option<String>,
    /// What kind of navigation this request serves, driving cache-key
    /// prefix selection and the wire `X-SPF-Request`/identifier type.
    pub kind: NavKind,
    /// The page this request is being made *from* — used both to scope
    /// `cacheType: url`/`path` entries and as the `X-SPF-Referer` header.
    pub referer: String,
    /// Whether to send credentials (cookies) cross-origin.
    pub with_credentials: bool,
}

impl SendOptions {
    /// Convenience constructor for the common case (no extra headers, no
    /// body, default credentials).
    #[must_use]
    pub fn new(kind: NavKind, referer: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            headers: HashMap::new(),
            post_data: None,
            kind,
            referer: referer.into(),
            with_credentials: false,
        }
    }
}

/// The three callbacks a [`Engine::send`] call drives (spec.md §4.J
/// `onPart`/`onError`/`onSuccess`).
pub struct RequestCallbacks<'a> {
    /// Invoked once per part of a multipart response, in order, before
    /// `on_success`.
    pub on_part: Box<dyn FnMut(SingleResponse) + 'a>,
    /// Invoked on any transport, parse, or (indirectly) cancellation
    /// failure. The request is not retried.
    pub on_error: Box<dyn FnMut(&SpfError) + 'a>,
    /// Invoked exactly once, with the fully assembled response, once the
    /// request (cache hit or network round-trip) completes successfully.
    pub on_success: Box<dyn FnMut(Response) + 'a>,
}

/// A handle to an in-flight (or already-completed) [`Engine::send`] call.
///
/// Cancellation is cooperative: [`RequestHandle::cancel`] only sets a flag
/// the driving future checks at its next suspension point (spec.md §5
/// "in-flight work within a task cannot be cancelled — it runs to a natural
/// yield point").
#[derive(Clone, Default)]
pub struct RequestHandle {
    cancelled: Rc<Cell<bool>>,
}

impl RequestHandle {
    /// Requests cancellation of the in-flight call this handle refers to.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    /// Whether [`RequestHandle::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

/// The future a [`Engine::send`] call returns.
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a>>;

/// Owns the response cache and drives every `send` through it, generalizing
/// the teacher's `page_handler::url::stream_url` round-trip (one-shot fetch
/// plus streaming callback) into the cache-aware, multipart-aware engine
/// spec.md §4.J describes.
pub struct Engine {
    transport: Rc<dyn Transport>,
    cache: Rc<std::cell::RefCell<Cache>>,
}

impl Engine {
    /// Creates an engine over the given transport and (typically shared,
    /// process-wide) cache.
    #[must_use]
    pub fn new(transport: Rc<dyn Transport>, cache: Rc<std::cell::RefCell<Cache>>) -> Self {
        Self { transport, cache }
    }

    /// Issues the request described by `options` against `url`, consulting
    /// the cache first.
    ///
    /// # Errors
    /// The returned future resolves to [`SpfError::Transport`] or
    /// [`SpfError::Parse`] on failure; in both cases `callbacks.on_error`
    /// has already been invoked before the future resolves.
    pub fn send<'a>(
        &'a self,
        config: &'a SpfConfig,
        url: &'a str,
        options: &'a SendOptions,
        callbacks: RequestCallbacks<'a>,
    ) -> (RequestHandle, SendFuture<'a>) {
        let handle = RequestHandle::default();
        let handle_for_future = handle.clone();
        let future: SendFuture<'a> = Box::pin(async move {
            self.run(config, url, options, callbacks, handle_for_future).await
        });
        (handle, future)
    }

    async fn run<'a>(
        &'a self,
        config: &'a SpfConfig,
        url: &'a str,
        options: &'a SendOptions,
        callbacks: RequestCallbacks<'a>,
        handle: RequestHandle,
    ) -> Result<()> {
        let RequestCallbacks { mut on_part, mut on_error, mut on_success } = callbacks;
        let start = Instant::now();
        let base_key = base_cache_key(url, config);

        if let Some((found_key, entry_kind, response)) = self.lookup_cache(config, &base_key, &options.referer, options.kind) {
            if !config.cache_unified {
                self.cache.borrow_mut().remove(&found_key);
            }
            defer().await;
            if handle.is_cancelled() {
                let err = SpfError::Cancel("request");
                on_error(&err);
                return Err(err);
            }
            let mut response = response;
            response.stamp_timing(&Timing {
                spf_cached: Some(true),
                spf_prefetched: Some(entry_kind == EntryKind::Prefetch),
                navigation_start: navigation_start(options.kind, start),
                extra: HashMap::new(),
            });
            if let Response::Multipart(multi) = &response {
                for part in &multi.parts {
                    on_part(part.clone());
                }
            }
            on_success(response);
            return Ok(());
        }

        let identifier_url = request_url(url, config, options.kind);
        let transport_options = TransportOptions {
            method: options.method,
            headers: merge_headers(config, options),
            post_data: options.post_data.clone(),
            with_credentials: options.with_credentials,
            timeout: config.request_timeout,
        };

        let mut full_body = String::new();
        let mut parser_state = MultipartParser::new();
        let multipart_detected = Rc::new(Cell::new(false));
        let mut streamed_parts = Vec::new();

        let multipart_detected_for_headers = Rc::clone(&multipart_detected);
        let chunk_result = self
            .transport
            .send(
                &identifier_url,
                &transport_options,
                Box::new(move |headers: &ResponseHeaders| {
                    // spec.md §4.J "Streaming": `onHeaders` reads
                    // `X-SPF-Response-Type`; multipart framing is declared
                    // by the server up front, not sniffed from the body.
                    let is_multipart = headers
                        .get("X-SPF-Response-Type")
                        .is_some_and(|value| value.to_ascii_lowercase().contains("multipart"));
                    multipart_detected_for_headers.set(is_multipart);
                }),
                Box::new(|chunk: &[u8]| {
                    let text = String::from_utf8_lossy(chunk);
                    full_body.push_str(&text);
                    if !multipart_detected.get() {
                        return;
                    }
                    if let Ok(parts) = parser_state.feed(&text) {
                        for mut part in parts {
                            stamp_live(&mut part);
                            streamed_parts.push(part);
                        }
                    }
                }),
            )
            .await;

        if let Err(err) = chunk_result {
            on_error(&err);
            return Err(err);
        }

        if handle.is_cancelled() {
            let err = SpfError::Cancel("request");
            on_error(&err);
            return Err(err);
        }

        let parts = if multipart_detected.get() && !config.advanced_response_type_json {
            let tail = match parser_state.finish(true) {
                Ok(tail) => tail,
                Err(err) => {
                    on_error(&err);
                    return Err(err);
                }
            };
            let mut parts = streamed_parts;
            for mut part in tail {
                stamp_live(&mut part);
                parts.push(part);
            }
            parts
        } else {
            match parser::parse(&full_body) {
                Ok(parsed) => {
                    let mut parts = parsed.parts;
                    for part in &mut parts {
                        stamp_live(part);
                    }
                    parts
                }
                Err(err) => {
                    on_error(&err);
                    return Err(err);
                }
            }
        };

        if parts.len() > 1 {
            for part in &parts {
                on_part(part.clone());
            }
        }

        let mut response = parser::assemble(parts);
        response.stamp_timing(&Timing {
            spf_cached: Some(false),
            spf_prefetched: Some(false),
            navigation_start: navigation_start(options.kind, start),
            extra: HashMap::new(),
        });

        if !matches!(options.method, Method::Post) {
            let write_key = write_cache_key(&base_key, config, options.kind, &options.referer, response.cache_type());
            self.cache.borrow_mut().insert(write_key, response.clone(), entry_kind_for(options.kind));
        }

        on_success(response);
        Ok(())
    }

    fn lookup_cache(
        &self,
        config: &SpfConfig,
        base_key: &str,
        referer: &str,
        kind: NavKind,
    ) -> Option<(String, EntryKind, Response)> {
        for prefix in read_prefixes(kind, config.cache_unified) {
            for key in lookup_candidates(prefix, base_key, referer) {
                let cache = self.cache.borrow();
                if let Some(entry) = cache.get(&key) {
                    return Some((key, entry.kind, entry.response.clone()));
                }
            }
        }
        None
    }
}

fn stamp_live(part: &mut SingleResponse) {
    let timing = part.timing.get_or_insert_with(Timing::default);
    timing.spf_cached.get_or_insert(false);
    timing.spf_prefetched.get_or_insert(false);
}

fn navigation_start(kind: NavKind, start: Instant) -> Option<f64> {
    if kind.is_navigation() {
        Some(start.elapsed().as_millis() as f64)
    } else {
        None
    }
}

fn entry_kind_for(kind: NavKind) -> EntryKind {
    match kind {
        NavKind::Prefetch => EntryKind::Prefetch,
        NavKind::Load => EntryKind::Load,
        NavKind::NavigateBack | NavKind::NavigateForward => EntryKind::NavigateBack,
        NavKind::Navigate | NavKind::Request => EntryKind::Navigate,
    }
}

/// Which cache-key prefixes a read for `kind` should try, in order
/// (DESIGN.md "cache-key prefix/read-order"). `cache_unified` collapses
/// every kind to the unprefixed namespace.
fn read_prefixes(kind: NavKind, cache_unified: bool) -> Vec<&'static str> {
    if cache_unified {
        return vec![""];
    }
    match kind {
        NavKind::NavigateBack | NavKind::NavigateForward => vec!["history "],
        NavKind::Navigate => vec!["prefetch ", "history "],
        NavKind::Load | NavKind::Request | NavKind::Prefetch => vec![""],
    }
}

fn write_prefix(kind: NavKind, cache_unified: bool) -> &'static str {
    if cache_unified {
        return "";
    }
    match kind {
        NavKind::NavigateBack | NavKind::NavigateForward | NavKind::Navigate => "history ",
        NavKind::Prefetch => "prefetch ",
        NavKind::Load | NavKind::Request => "",
    }
}

/// The absolute, identifier-stripped URL used as the root of every cache
/// key (spec.md §4.J "Cache key composition").
fn base_cache_key(url: &str, config: &SpfConfig) -> String {
    match &config.url_identifier {
        Some(pattern) => match identifier_param_name(pattern) {
            Some(name) => crate::url::strip_identifier(url, name),
            None => url.to_owned(),
        },
        None => url.to_owned(),
    }
}

fn identifier_param_name(pattern: &str) -> Option<&str> {
    let after_query = pattern.trim_start_matches('?');
    after_query.split('=').next().filter(|name| !name.is_empty())
}

/// Builds the three read candidates for `prefix + base`, most-scoped first
/// (spec.md §4.J "Lookup order").
fn lookup_candidates(prefix: &str, base_key: &str, referer: &str) -> Vec<String> {
    let mut candidates = vec![format!("{prefix}{base_key} previous {referer}")];
    if let Some(path) = url::path(referer) {
        candidates.push(format!("{prefix}{base_key} previous {path}"));
    }
    candidates.push(format!("{prefix}{base_key}"));
    candidates
}

fn write_cache_key(
    base_key: &str,
    config: &SpfConfig,
    kind: NavKind,
    referer: &str,
    cache_type: Option<CacheType>,
) -> String {
    let prefix = write_prefix(kind, config.cache_unified);
    match cache_type {
        Some(CacheType::Url) => format!("{prefix}{base_key} previous {referer}"),
        Some(CacheType::Path) => match url::path(referer) {
            Some(path) => format!("{prefix}{base_key} previous {path}"),
            None => format!("{prefix}{base_key}"),
        },
        Some(CacheType::Global) | None => format!("{prefix}{base_key}"),
    }
}

fn request_type_name(kind: NavKind) -> &'static str {
    match kind {
        NavKind::Request => "request",
        NavKind::Navigate => "navigate",
        NavKind::NavigateBack => "navigate-back",
        NavKind::NavigateForward => "navigate-forward",
        NavKind::Load => "load",
        NavKind::Prefetch => "prefetch",
    }
}

fn request_url(url: &str, config: &SpfConfig, kind: NavKind) -> String {
    if config.advanced_header_identifier {
        return url.to_owned();
    }
    crate::url::append_identifier(url, config.url_identifier.as_deref(), request_type_name(kind))
}

fn merge_headers(config: &SpfConfig, options: &SendOptions) -> HashMap<String, String> {
    let mut headers = config.request_headers.clone();
    headers.extend(options.headers.clone());
    if !options.referer.is_empty() {
        headers.insert("X-SPF-Referer".to_owned(), options.referer.clone());
    }
    if config.advanced_header_identifier {
        headers.insert("X-SPF-Request".to_owned(), request_type_name(options.kind).to_owned());
        headers.insert("Accept".to_owned(), "application/json".to_owned());
    }
    headers
}

async fn defer() {
    #[cfg(feature = "native")]
    {
        tokio::task::yield_now().await;
    }
    #[cfg(all(feature = "wasm", not(feature = "native")))]
    {
        let promise = js_sys::Promise::resolve(&wasm_bindgen::JsValue::NULL);
        let _ = wasm_bindgen_futures::JsFuture::from(promise).await;
    }
}
