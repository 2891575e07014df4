//! The HTTP transport boundary (spec.md §4.J `send`).
//!
//! Mirrors the teacher's `JsRuntime` trait
//! (`crates/page_handler/src/internal/runtime.rs`): a dyn-compatible async
//! method expressed as a hand-rolled `Pin<Box<dyn Future<...>>>` return
//! type rather than `async-trait`, since the teacher's own codebase uses
//! that idiom for its other dyn-dispatched async boundary. The native
//! implementation streams bytes the same way
//! `page_handler::url::stream_url` does with `reqwest` + `tokio-stream`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use web_time::Duration;

use crate::error::{Result, SpfError};

/// The HTTP method for a request (spec.md §4.J `options.method`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// `GET`.
    #[default]
    Get,
    /// `POST`.
    Post,
}

/// Per-request options (spec.md §4.J `send(url, options)`).
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// The HTTP method.
    pub method: Method,
    /// Headers merged on top of [`crate::config::SpfConfig::request_headers`].
    pub headers: HashMap<String, String>,
    /// The request body, for `POST`.
    pub post_data: Option<String>,
    /// Whether to send credentials (cookies) cross-origin.
    pub with_credentials: bool,
    /// Zero means "no timeout".
    pub timeout: Duration,
}

/// The future a [`Transport::send`] call returns.
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a>>;

/// Response headers handed to [`Transport::send`]'s `on_headers` callback,
/// with case-insensitive lookup (header names are case-insensitive on the
/// wire; `reqwest`/`XMLHttpRequest` both preserve whatever casing the server
/// sent, so a plain `HashMap` lookup would miss).
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaders {
    by_lower_name: HashMap<String, String>,
}

impl ResponseHeaders {
    /// Records `value` under `name`, overwriting any previous value for the
    /// same name (compared case-insensitively).
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.by_lower_name.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Looks up `name`, case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.by_lower_name.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// The XHR/fetch boundary the request engine drives.
///
/// `on_headers` is invoked once, as soon as response headers are available,
/// before any `on_chunk` call — this is how the caller learns whether
/// `X-SPF-Response-Type: multipart` applies (spec.md §4.J "Streaming"),
/// rather than sniffing the body for a framing token. `on_chunk` is invoked
/// once per chunk of the response body as it arrives, in order; the
/// returned future resolves once the request completes (successfully or
/// not) after every chunk has been delivered.
pub trait Transport {
    /// Issues the request described by `options` against `url`.
    ///
    /// # Errors
    /// Returns [`SpfError::Transport`] if the request fails, is aborted, or
    /// times out, or completes with a non-success status.
    fn send<'a>(
        &'a self,
        url: &'a str,
        options: &'a RequestOptions,
        on_headers: Box<dyn FnMut(&ResponseHeaders) + 'a>,
        on_chunk: Box<dyn FnMut(&[u8]) + 'a>,
    ) -> SendFuture<'a>;
}

#[cfg(feature = "native")]
pub use native::ReqwestTransport;

#[cfg(feature = "native")]
mod native {
    use super::{Method, RequestOptions, ResponseHeaders, SendFuture, Transport};
    use crate::error::SpfError;
    use tokio_stream::StreamExt as _;

    /// A [`Transport`] backed by `reqwest`, streaming the response body via
    /// `bytes_stream()` the same way `page_handler::url::stream_url` does.
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        /// Creates a transport with a fresh `reqwest::Client`.
        #[must_use]
        pub fn new() -> Self {
            Self {
                client: reqwest::Client::new(),
            }
        }
    }

    impl Default for ReqwestTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Transport for ReqwestTransport {
        fn send<'a>(
            &'a self,
            url: &'a str,
            options: &'a RequestOptions,
            mut on_headers: Box<dyn FnMut(&ResponseHeaders) + 'a>,
            mut on_chunk: Box<dyn FnMut(&[u8]) + 'a>,
        ) -> SendFuture<'a> {
            Box::pin(async move {
                let mut builder = match options.method {
                    Method::Get => self.client.get(url),
                    Method::Post => self.client.post(url),
                };
                for (name, value) in &options.headers {
                    builder = builder.header(name, value);
                }
                if let Some(data) = options.post_data.clone() {
                    builder = builder.body(data);
                }
                if !options.timeout.is_zero() {
                    builder = builder.timeout(options.timeout);
                }
                builder = builder.fetch_mode_no_cors();

                let response = builder
                    .send()
                    .await
                    .map_err(|err| SpfError::Transport {
                        url: url.to_owned(),
                        message: err.to_string(),
                    })?;
                if !response.status().is_success() {
                    return Err(SpfError::Transport {
                        url: url.to_owned(),
                        message: format!("unexpected status {}", response.status()),
                    });
                }

                let mut headers = ResponseHeaders::default();
                for (name, value) in response.headers() {
                    if let Ok(value) = value.to_str() {
                        headers.insert(name.as_str(), value);
                    }
                }
                on_headers(&headers);

                let mut stream = response.bytes_stream();
                while let Some(chunk) = stream.next().await {
                    let bytes = chunk.map_err(|err| SpfError::Transport {
                        url: url.to_owned(),
                        message: err.to_string(),
                    })?;
                    on_chunk(&bytes);
                }
                Ok(())
            })
        }
    }
}

/// What [`FakeTransport`] does when `send` is called for a given URL.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Deliver `headers` via `on_headers`, then each byte vector as a
    /// separate chunk, then succeed.
    Chunks(ResponseHeaders, Vec<Vec<u8>>),
    /// Fail the request with this message after delivering no chunks.
    Error(String),
}

/// A recorded call to [`FakeTransport::send`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentRequest {
    /// The requested URL.
    pub url: String,
    /// The HTTP method used.
    pub method: Method,
    /// The request body, if any.
    pub post_data: Option<String>,
}

/// An in-memory [`Transport`] double: each URL is given a scripted
/// [`ScriptedResponse`] queue ahead of time; `send` pops the next one.
#[derive(Default)]
pub struct FakeTransport {
    scripted: std::cell::RefCell<HashMap<String, std::collections::VecDeque<ScriptedResponse>>>,
    requests: std::cell::RefCell<Vec<SentRequest>>,
}

impl FakeTransport {
    /// Creates an empty double with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful, chunked response for the next `send` to `url`,
    /// with no response headers.
    pub fn script(&self, url: impl Into<String>, chunks: Vec<Vec<u8>>) {
        self.script_with_headers(url, ResponseHeaders::default(), chunks);
    }

    /// Like [`FakeTransport::script`], but declares `X-SPF-Response-Type:
    /// multipart` the way a real server streaming a multipart response
    /// would, so [`Transport::send`]'s `on_headers` callback sees it.
    pub fn script_multipart(&self, url: impl Into<String>, chunks: Vec<Vec<u8>>) {
        let mut headers = ResponseHeaders::default();
        headers.insert("X-SPF-Response-Type", "multipart");
        self.script_with_headers(url, headers, chunks);
    }

    /// Queues a successful, chunked response for the next `send` to `url`,
    /// delivering `headers` via `on_headers` first.
    pub fn script_with_headers(&self, url: impl Into<String>, headers: ResponseHeaders, chunks: Vec<Vec<u8>>) {
        self.scripted
            .borrow_mut()
            .entry(url.into())
            .or_default()
            .push_back(ScriptedResponse::Chunks(headers, chunks));
    }

    /// Queues a failing response for the next `send` to `url`.
    pub fn script_error(&self, url: impl Into<String>, message: impl Into<String>) {
        self.scripted
            .borrow_mut()
            .entry(url.into())
            .or_default()
            .push_back(ScriptedResponse::Error(message.into()));
    }

    /// Every request sent so far, in order.
    #[must_use]
    pub fn sent_requests(&self) -> Vec<SentRequest> {
        self.requests.borrow().clone()
    }
}

impl Transport for FakeTransport {
    fn send<'a>(
        &'a self,
        url: &'a str,
        options: &'a RequestOptions,
        mut on_headers: Box<dyn FnMut(&ResponseHeaders) + 'a>,
        mut on_chunk: Box<dyn FnMut(&[u8]) + 'a>,
    ) -> SendFuture<'a> {
        Box::pin(async move {
            self.requests.borrow_mut().push(SentRequest {
                url: url.to_owned(),
                method: options.method,
                post_data: options.post_data.clone(),
            });
            let scripted = self
                .scripted
                .borrow_mut()
                .get_mut(url)
                .and_then(std::collections::VecDeque::pop_front);
            match scripted {
                Some(ScriptedResponse::Chunks(headers, chunks)) => {
                    on_headers(&headers);
                    for chunk in chunks {
                        on_chunk(&chunk);
                    }
                    Ok(())
                }
                Some(ScriptedResponse::Error(message)) => Err(SpfError::Transport {
                    url: url.to_owned(),
                    message,
                }),
                None => Err(SpfError::Transport {
                    url: url.to_owned(),
                    message: "no scripted response".to_owned(),
                }),
            }
        })
    }
}

#[cfg(feature = "wasm")]
pub mod web {
    //! `XMLHttpRequest`-backed [`super::Transport`].
    //!
    //! Unlike `fetch`, `XMLHttpRequest` exposes `responseText` growth via
    //! `onprogress`, which is what lets a chunk be handed to the caller as
    //! soon as it arrives rather than only once the whole body is in —
    //! required for the multipart-stream parser to see parts incrementally.

    use std::cell::RefCell;
    use std::rc::Rc;

    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::{JsCast, JsValue};
    use web_sys::{Event, ProgressEvent, XmlHttpRequest};

    use super::{Method, RequestOptions, ResponseHeaders, SendFuture, Transport};
    use crate::error::SpfError;

    const HEADERS_RECEIVED: u16 = 2;

    fn read_headers(xhr: &XmlHttpRequest) -> ResponseHeaders {
        let mut headers = ResponseHeaders::default();
        let Ok(raw) = xhr.get_all_response_headers() else {
            return headers;
        };
        for line in raw.split("\r\n") {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim(), value.trim());
            }
        }
        headers
    }

    /// A [`Transport`] backed by a real `XMLHttpRequest`.
    #[derive(Default)]
    pub struct XhrTransport;

    impl XhrTransport {
        /// Creates a transport.
        #[must_use]
        pub fn new() -> Self {
            Self
        }
    }

    impl Transport for XhrTransport {
        fn send<'a>(
            &'a self,
            url: &'a str,
            options: &'a RequestOptions,
            on_headers: Box<dyn FnMut(&ResponseHeaders) + 'a>,
            on_chunk: Box<dyn FnMut(&[u8]) + 'a>,
        ) -> SendFuture<'a> {
            Box::pin(async move {
                let xhr = XmlHttpRequest::new().map_err(|_| SpfError::Transport {
                    url: url.to_owned(),
                    message: "failed to construct XMLHttpRequest".to_owned(),
                })?;
                let method = match options.method {
                    Method::Get => "GET",
                    Method::Post => "POST",
                };
                xhr.open(method, url).map_err(|_| SpfError::Transport {
                    url: url.to_owned(),
                    message: "XMLHttpRequest.open failed".to_owned(),
                })?;
                for (name, value) in &options.headers {
                    let _ = xhr.set_request_header(name, value);
                }
                xhr.set_with_credentials(options.with_credentials);

                let on_headers = Rc::new(RefCell::new(on_headers));
                let headers_delivered = Rc::new(RefCell::new(false));
                let on_chunk = Rc::new(RefCell::new(on_chunk));
                let last_len = Rc::new(RefCell::new(0usize));

                let promise = js_sys::Promise::new(&mut |resolve, reject| {
                    let ready_xhr = xhr.clone();
                    let ready_headers = Rc::clone(&on_headers);
                    let ready_delivered = Rc::clone(&headers_delivered);
                    let ready_state = Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
                        if ready_xhr.ready_state() >= HEADERS_RECEIVED && !*ready_delivered.borrow() {
                            *ready_delivered.borrow_mut() = true;
                            (ready_headers.borrow_mut())(&read_headers(&ready_xhr));
                        }
                    });
                    xhr.set_onreadystatechange(Some(ready_state.as_ref().unchecked_ref()));
                    ready_state.forget();

                    let progress_xhr = xhr.clone();
                    let progress_chunk = Rc::clone(&on_chunk);
                    let progress_len = Rc::clone(&last_len);
                    let progress = Closure::<dyn FnMut(ProgressEvent)>::new(move |_event: ProgressEvent| {
                        if let Ok(Some(text)) = progress_xhr.response_text() {
                            let mut consumed = progress_len.borrow_mut();
                            if text.len() > *consumed {
                                (progress_chunk.borrow_mut())(text[*consumed..].as_bytes());
                                *consumed = text.len();
                            }
                        }
                    });
                    xhr.set_onprogress(Some(progress.as_ref().unchecked_ref()));
                    progress.forget();

                    let load = Closure::<dyn FnMut()>::new(move || {
                        let _ = resolve.call0(&JsValue::NULL);
                    });
                    xhr.set_onload(Some(load.as_ref().unchecked_ref()));
                    load.forget();

                    let error = Closure::<dyn FnMut()>::new(move || {
                        let _ = reject.call0(&JsValue::NULL);
                    });
                    xhr.set_onerror(Some(error.as_ref().unchecked_ref()));
                    error.forget();

                    xhr.set_ontimeout(Some(error.as_ref().unchecked_ref()));
                });

                let send_result = match &options.post_data {
                    Some(body) => xhr.send_with_opt_str(Some(body)),
                    None => xhr.send(),
                };
                send_result.map_err(|_| SpfError::Transport {
                    url: url.to_owned(),
                    message: "XMLHttpRequest.send failed".to_owned(),
                })?;

                wasm_bindgen_futures::JsFuture::from(promise)
                    .await
                    .map_err(|_| SpfError::Transport {
                        url: url.to_owned(),
                        message: "request failed".to_owned(),
                    })?;

                if xhr.status().unwrap_or(0) >= 400 {
                    return Err(SpfError::Transport {
                        url: url.to_owned(),
                        message: format!("unexpected status {}", xhr.status().unwrap_or(0)),
                    });
                }
                Ok(())
            })
        }
    }
}
