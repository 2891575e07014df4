//! Click/history interception, prefetch promotion, reload fallback and DOM
//! event dispatch for one navigation (spec.md §4.K).
//!
//! The prefetch registry and the "drive the in-app navigation, or fall back
//! to a full browser navigate-away" split are grounded on
//! `examples/other_examples/6f752e1d_next-rs-next-rs__src-router.rs.rs`'s
//! `Router` (a URL-keyed registry of in-flight work feeding a promotion
//! path) and
//! `examples/other_examples/98037722_sleepycatcoding-ruffle__core-src-backend-navigator.rs.rs`'s
//! navigate-vs-reload split in a Rust-native navigator. Like
//! [`crate::request::Engine::send`], every entry point here returns a
//! future the caller drives rather than one this module spawns itself —
//! there is no executor handle to spawn onto.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use web_time::Instant;

use crate::config::SpfConfig;
use crate::dom::Dom;
use crate::error::SpfError;
use crate::events::{self, EventDetail, NavEvent, ReloadReason};
use crate::history::{HistoryBackend, HistoryState};
use crate::process::{self, NavInfo, NavKind};
use crate::request::{Engine, RequestCallbacks, RequestHandle, SendOptions};
use crate::resources::ResourceLoader;
use crate::response::{Response, SingleResponse};
use crate::tasks::TaskQueues;
use crate::transport::Method;

/// Whether a navigation target currently passes the eligibility gates
/// (spec.md §4.K "eligibility").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// All gates pass; the navigation may proceed in-app.
    Eligible,
    /// `navigate-limit` navigations have already happened this page load.
    OverLimit,
    /// `navigate-lifetime` has elapsed since the page loaded.
    Expired,
    /// The target fails a same-origin check (`experimental-same-origin`).
    CrossOrigin,
}

/// Caller-resolved facts about an intercepted click. [`Dom`] exposes no
/// ancestor-traversal primitive, so the embedder walks up from the click
/// target (finding the nearest anchor and its classes) and passes the
/// resolved facts in here.
#[derive(Debug, Clone)]
pub struct ClickContext {
    /// The resolved `href` of the nearest ancestor anchor.
    pub href: String,
    /// Whether Ctrl/Alt/Shift/Meta was held.
    pub has_modifier_key: bool,
    /// Whether the primary mouse button was used.
    pub is_primary_button: bool,
    /// Whether an ancestor carries `link-class`.
    pub has_link_class: bool,
    /// Whether an ancestor carries `nolink-class`.
    pub has_nolink_class: bool,
}

/// Options accepted by the public entry points (spec.md §6 "Request options").
#[derive(Debug, Clone, Default)]
pub struct NavigateOptions {
    /// The HTTP method to use.
    pub method: Method,
    /// Extra request headers.
    pub headers: HashMap<String, String>,
    /// The request body, for `POST`.
    pub post_data: Option<String>,
    /// Whether to send credentials (cookies) cross-origin.
    pub with_credentials: bool,
    /// A scroll position to restore, carried from history state.
    pub position: Option<(f64, f64)>,
}

/// The future a controller entry point returns. The embedder drives it to
/// completion (native: `tokio::task::spawn_local`; wasm:
/// `wasm_bindgen_futures::spawn_local`), the same non-spawning contract
/// [`crate::request::Engine::send`] already uses one layer down.
pub type NavFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a>>;

struct PrefetchEntry {
    handle: RequestHandle,
    done: Rc<Cell<bool>>,
}

/// Owns the navigation-controller state for one page load: the navigation
/// counter, page-load clock, in-flight request, and prefetch registry
/// (spec.md §3 "Global navigation state").
pub struct NavigationController {
    config: Rc<SpfConfig>,
    dom: Rc<dyn Dom>,
    history: Rc<dyn HistoryBackend>,
    tasks: Rc<RefCell<TaskQueues>>,
    loader: Rc<RefCell<ResourceLoader>>,
    engine: Rc<Engine>,
    loaded_at: Instant,
    counter: Cell<u32>,
    in_flight: RefCell<Option<RequestHandle>>,
    prefetches: RefCell<HashMap<String, PrefetchEntry>>,
}

impl NavigationController {
    /// Builds a controller bound to the given collaborators, starting its
    /// page-load clock now.
    #[must_use]
    pub fn new(
        config: Rc<SpfConfig>,
        dom: Rc<dyn Dom>,
        history: Rc<dyn HistoryBackend>,
        tasks: Rc<RefCell<TaskQueues>>,
        loader: Rc<RefCell<ResourceLoader>>,
        engine: Rc<Engine>,
    ) -> Self {
        Self {
            config,
            dom,
            history,
            tasks,
            loader,
            engine,
            loaded_at: Instant::now(),
            counter: Cell::new(0),
            in_flight: RefCell::new(None),
            prefetches: RefCell::new(HashMap::new()),
        }
    }

    /// Evaluates the eligibility gates for navigating to `target`
    /// (spec.md §4.K "eligibility").
    #[must_use]
    pub fn eligibility(&self, target: &str) -> Eligibility {
        if self.config.experimental_same_origin && !crate::url::same_origin(&self.dom.location_href(), target) {
            return Eligibility::CrossOrigin;
        }
        if let Some(limit) = self.config.navigate_limit {
            if self.counter.get() >= limit {
                return Eligibility::OverLimit;
            }
        }
        if let Some(lifetime) = self.config.navigate_lifetime {
            if self.loaded_at.elapsed() >= lifetime {
                return Eligibility::Expired;
            }
        }
        Eligibility::Eligible
    }

    /// Handles an intercepted click: gates it, dispatches `spfclick`, and
    /// returns a future to drive if the navigation should proceed. The
    /// first element of the return value is whether the browser's default
    /// action (following the link) should be prevented.
    pub fn click<'a>(&'a self, ctx: &ClickContext) -> (bool, Option<NavFuture<'a>>) {
        if ctx.has_modifier_key || !ctx.is_primary_button || !ctx.has_link_class || ctx.has_nolink_class {
            return (false, None);
        }
        let current = self.dom.location_href();
        if ctx.href == current {
            return (true, None);
        }
        if !crate::url::same_origin(&current, &ctx.href) {
            return (false, None);
        }

        match self.eligibility(&ctx.href) {
            Eligibility::Eligible => {}
            Eligibility::OverLimit | Eligibility::Expired => {
                self.reload(&ctx.href, ReloadReason::Ineligible);
                return (true, None);
            }
            Eligibility::CrossOrigin => {
                self.reload(&ctx.href, ReloadReason::ForbiddenOrigin);
                return (true, None);
            }
        }

        if !events::dispatch(self.dom.as_ref(), NavEvent::Click, &EventDetail::for_url(ctx.href.clone())) {
            return (true, None);
        }

        (true, Some(self.navigate_as(ctx.href.clone(), NavKind::Navigate, NavigateOptions::default())))
    }

    /// Handles a `popstate` event for `url`/`state`: reloads if ineligible,
    /// otherwise returns a future driving a history-flavored navigation
    /// (spec.md §4.K "history").
    pub fn handle_popstate<'a>(&'a self, url: String, state: Option<HistoryState>) -> Option<NavFuture<'a>> {
        match self.eligibility(&url) {
            Eligibility::CrossOrigin => {
                self.reload(&url, ReloadReason::ForbiddenOrigin);
                return None;
            }
            Eligibility::OverLimit | Eligibility::Expired => {
                self.reload(&url, ReloadReason::Ineligible);
                return None;
            }
            Eligibility::Eligible => {}
        }

        if !events::dispatch(self.dom.as_ref(), NavEvent::History, &EventDetail::for_url(url.clone())) {
            return None;
        }

        let back = state.as_ref().and_then(|state| state.back).unwrap_or(true);
        let kind = if back { NavKind::NavigateBack } else { NavKind::NavigateForward };
        let position = state.and_then(|state| state.position);
        Some(self.navigate_as(url, kind, NavigateOptions { position, ..NavigateOptions::default() }))
    }

    /// The public `navigate(url, options)` entry point: same gates as
    /// `click`, but callable directly (spec.md §4.K "public navigate").
    pub fn navigate<'a>(&'a self, url: String, options: NavigateOptions) -> NavFuture<'a> {
        Box::pin(async move {
            match self.eligibility(&url) {
                Eligibility::Eligible => {}
                Eligibility::OverLimit | Eligibility::Expired => {
                    self.reload(&url, ReloadReason::Ineligible);
                    return;
                }
                Eligibility::CrossOrigin => {
                    self.reload(&url, ReloadReason::ForbiddenOrigin);
                    return;
                }
            }
            self.navigate_as(url, NavKind::Navigate, options).await;
        })
    }

    fn navigate_as<'a>(&'a self, url: String, kind: NavKind, options: NavigateOptions) -> NavFuture<'a> {
        Box::pin(async move {
            if let Some(previous) = self.in_flight.borrow_mut().take() {
                previous.cancel();
            }
            self.cancel_all_prefetches_except(Some(&url));
            self.tasks.borrow_mut().cancel_all_except("process ", &process::queue_name(&url));
            self.await_in_flight_prefetch(&url).await;

            let referer = self.dom.location_href();

            if kind == NavKind::Navigate {
                self.counter.set(self.counter.get() + 1);
                let _ = self.history.add(
                    &url,
                    &HistoryState {
                        referer: referer.clone(),
                        ..HistoryState::default()
                    },
                );
            }

            if !events::dispatch(self.dom.as_ref(), NavEvent::Request, &EventDetail::for_url(url.clone())) {
                self.reload(&url, ReloadReason::RequestCancelled);
                return;
            }

            let send_options = SendOptions {
                method: options.method,
                headers: options.headers,
                post_data: options.post_data,
                kind,
                referer: referer.clone(),
                with_credentials: options.with_credentials,
            };

            let mut nav = NavInfo::new(url.clone(), referer, kind);
            nav.position = options.position;

            let outcome: Rc<RefCell<Option<NavOutcome>>> = Rc::new(RefCell::new(None));
            let outcome_for_success = Rc::clone(&outcome);
            let outcome_for_error = Rc::clone(&outcome);

            let callbacks = RequestCallbacks {
                on_part: Box::new(|_part: SingleResponse| {}),
                on_error: Box::new(move |err: &SpfError| {
                    *outcome_for_error.borrow_mut() = Some(NavOutcome::Error(err.to_string(), err.reload_reason()));
                }),
                on_success: Box::new(move |response: Response| {
                    *outcome_for_success.borrow_mut() = Some(NavOutcome::Success(response));
                }),
            };

            let (handle, future) = self.engine.send(&self.config, &url, &send_options, callbacks);
            *self.in_flight.borrow_mut() = Some(handle);
            let _ = future.await;
            self.in_flight.borrow_mut().take();

            match outcome.borrow_mut().take() {
                Some(NavOutcome::Success(response)) => self.apply_response(response, nav).await,
                Some(NavOutcome::Error(message, reason)) => {
                    let cancelled = events::dispatch(
                        self.dom.as_ref(),
                        NavEvent::Error,
                        &EventDetail {
                            err: Some(message),
                            url: Some(url.clone()),
                            ..EventDetail::default()
                        },
                    );
                    if cancelled {
                        self.reload(&url, reason.unwrap_or(ReloadReason::UncaughtError));
                    }
                }
                None => {}
            }
        })
    }

    /// Issues a bare request: not subject to eligibility, and only the
    /// local callbacks run (no DOM events, spec.md §4.K).
    pub fn load<'a>(&'a self, url: String, options: NavigateOptions, callbacks: RequestCallbacks<'a>) -> NavFuture<'a> {
        Box::pin(async move {
            let referer = self.dom.location_href();
            let send_options = SendOptions {
                method: options.method,
                headers: options.headers,
                post_data: options.post_data,
                kind: NavKind::Load,
                referer,
                with_credentials: options.with_credentials,
            };
            let (_, future) = self.engine.send(&self.config, &url, &send_options, callbacks);
            let _ = future.await;
        })
    }

    /// Starts a prefetch for `url`, registering it so a subsequent
    /// `navigate` to the same URL can be promoted instead of issuing a
    /// second request (spec.md §4.K "Prefetch promotion", §8 "at most one
    /// entry exists in the prefetch registry at a time"). A no-op future if
    /// `url` already has a prefetch in flight.
    pub fn prefetch(&self, url: String) -> NavFuture<'_> {
        if self.prefetches.borrow().contains_key(&url) {
            return Box::pin(async {});
        }
        Box::pin(async move {
            let referer = self.dom.location_href();
            let send_options = SendOptions::new(NavKind::Prefetch, referer);
            let callbacks = RequestCallbacks {
                on_part: Box::new(|_| {}),
                on_error: Box::new(|_| {}),
                on_success: Box::new(|_| {}),
            };
            let (handle, future) = self.engine.send(&self.config, &url, &send_options, callbacks);
            let done = Rc::new(Cell::new(false));
            self.prefetches.borrow_mut().insert(
                url.clone(),
                PrefetchEntry {
                    handle,
                    done: Rc::clone(&done),
                },
            );
            let _ = future.await;
            done.set(true);
            self.prefetches.borrow_mut().remove(&url);
        })
    }

    /// Cancels the in-flight navigation, if any.
    pub fn cancel(&self) {
        if let Some(handle) = self.in_flight.borrow_mut().take() {
            handle.cancel();
        }
    }

    /// Cancels every prefetch whose key differs from `keep_url` (spec.md §5
    /// `cancelAllPrefetchesExcept`).
    pub fn cancel_all_prefetches_except(&self, keep_url: Option<&str>) {
        for (url, entry) in self.prefetches.borrow().iter() {
            if Some(url.as_str()) != keep_url {
                entry.handle.cancel();
            }
        }
    }

    /// If `url` has a prefetch registered but not yet complete, waits for
    /// it to finish (and write its cache entry) before returning, so the
    /// caller's own cache lookup for `url` finds it rather than a second
    /// network request being issued (spec.md §4.K "Prefetch promotion").
    async fn await_in_flight_prefetch(&self, url: &str) {
        let Some(done) = self.prefetches.borrow().get(url).map(|entry| Rc::clone(&entry.done)) else {
            return;
        };
        while !done.get() {
            defer().await;
        }
    }

    async fn apply_response(&self, response: Response, nav: NavInfo) {
        let parts = response.parts();
        if parts.is_empty() {
            return;
        }

        if let Some(redirect) = parts[0].redirect.clone() {
            let (_, hash) = crate::url::partition_hash(&nav.current);
            let corrected = crate::url::with_hash(&redirect, hash);
            let _ = self.history.replace(
                Some(&corrected),
                &HistoryState {
                    referer: nav.referer.clone(),
                    ..HistoryState::default()
                },
            );
            self.navigate_as(
                redirect,
                NavKind::Navigate,
                NavigateOptions {
                    method: Method::Get,
                    ..NavigateOptions::default()
                },
            )
            .await;
            return;
        }

        if parts[0].reload == Some(true) {
            self.reload(&nav.current, ReloadReason::ReloadResponse);
            return;
        }

        let is_multipart = matches!(response, Response::Multipart(_));
        let owned_parts: VecDeque<SingleResponse> = parts.into_iter().cloned().collect();
        let total = owned_parts.len();
        let single_response = (!is_multipart).then(|| owned_parts[0].clone());

        let done = Rc::new(Cell::new(false));
        let done_for_cb = Rc::clone(&done);
        let dom_for_cb = Rc::clone(&self.dom);
        let url_for_cb = nav.current.clone();
        let on_all_done: Rc<RefCell<Option<Box<dyn FnOnce()>>>> = Rc::new(RefCell::new(Some(Box::new(move || {
            if let Some(single_response) = single_response {
                events::dispatch(
                    dom_for_cb.as_ref(),
                    NavEvent::Process,
                    &EventDetail {
                        url: Some(url_for_cb.clone()),
                        response: Some(single_response.clone()),
                        ..EventDetail::default()
                    },
                );
                events::dispatch(
                    dom_for_cb.as_ref(),
                    NavEvent::Done,
                    &EventDetail {
                        url: Some(url_for_cb.clone()),
                        response: Some(single_response),
                        ..EventDetail::default()
                    },
                );
            } else {
                events::dispatch(dom_for_cb.as_ref(), NavEvent::Done, &EventDetail::for_url(url_for_cb.clone()));
            }
            done_for_cb.set(true);
        }))));

        let deps = PartDeps {
            dom: Rc::clone(&self.dom),
            tasks: Rc::clone(&self.tasks),
            loader: Rc::clone(&self.loader),
            history: Rc::clone(&self.history),
            config: Rc::clone(&self.config),
        };
        drive_parts(deps, owned_parts, 0, total, nav, on_all_done);

        while !done.get() {
            defer().await;
        }
    }

    /// Dispatches `spfreload`, optionally drops the current history entry,
    /// then navigates the browser away, stamping the reason code onto the
    /// target URL (spec.md §4.K "Reload reasons").
    fn reload(&self, url: &str, reason: ReloadReason) {
        let current = self.dom.location_href();
        events::dispatch(
            self.dom.as_ref(),
            NavEvent::Reload,
            &EventDetail {
                url: Some(url.to_owned()),
                reason: Some(reason.as_code()),
                ..EventDetail::default()
            },
        );

        if self.config.experimental_remove_history && url == current {
            let _ = self.history.replace(None, &HistoryState::default());
        }

        let separator = if url.contains('?') { '&' } else { '?' };
        let target = format!("{url}{separator}{}={}", self.config.reload_identifier, reason.as_code());
        let only_hash_differs =
            target != current && crate::url::partition_hash(&target).0 == crate::url::partition_hash(&current).0;
        self.dom.navigate_to(&target, only_hash_differs);
    }
}

enum NavOutcome {
    Success(Response),
    Error(String, Option<ReloadReason>),
}

#[derive(Clone)]
struct PartDeps {
    dom: Rc<dyn Dom>,
    tasks: Rc<RefCell<TaskQueues>>,
    loader: Rc<RefCell<ResourceLoader>>,
    history: Rc<dyn HistoryBackend>,
    config: Rc<SpfConfig>,
}

/// Processes `remaining` one part at a time, dispatching `spfpartprocess`/
/// `spfpartdone` around each part of a multipart response, then invokes
/// `on_all_done` once every part has been applied (spec.md §5 ordering
/// guarantees).
fn drive_parts(
    deps: PartDeps,
    mut remaining: VecDeque<SingleResponse>,
    index: usize,
    total: usize,
    nav: NavInfo,
    on_all_done: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
) {
    let Some(part) = remaining.pop_front() else {
        if let Some(done) = on_all_done.borrow_mut().take() {
            done();
        }
        return;
    };
    let multipart = total > 1;
    if multipart {
        events::dispatch(
            deps.dom.as_ref(),
            NavEvent::PartProcess,
            &EventDetail {
                url: Some(nav.current.clone()),
                part: Some(index),
                response: Some(part.clone()),
                ..EventDetail::default()
            },
        );
    }

    let deps_for_done = deps.clone();
    let nav_for_done = nav.clone();
    let on_all_done_for_done = Rc::clone(&on_all_done);
    let index_next = index + 1;
    let part_for_done = part.clone();

    process::process(
        Rc::clone(&deps.dom),
        Rc::clone(&deps.tasks),
        Rc::clone(&deps.loader),
        Rc::clone(&deps.history),
        &deps.config,
        part,
        nav.clone(),
        move || {
            if multipart {
                events::dispatch(
                    deps_for_done.dom.as_ref(),
                    NavEvent::PartDone,
                    &EventDetail {
                        url: Some(nav_for_done.current.clone()),
                        part: Some(index),
                        response: Some(part_for_done.clone()),
                        ..EventDetail::default()
                    },
                );
            }
            drive_parts(deps_for_done.clone(), remaining, index_next, total, nav_for_done.clone(), Rc::clone(&on_all_done_for_done));
        },
    );
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::dom::RecordingDom;
    use crate::history::FakeHistory;
    use crate::transport::{FakeTransport, Transport};

    fn controller() -> (NavigationController, Rc<RecordingDom>, Rc<FakeTransport>, Rc<FakeHistory>) {
        let dom = Rc::new(RecordingDom::with_elements(["main"]));
        dom.set_location("https://x/");
        let history = Rc::new(FakeHistory::new());
        let tasks = Rc::new(RefCell::new(TaskQueues::new()));
        let loader = Rc::new(RefCell::new(ResourceLoader::new()));
        let transport = Rc::new(FakeTransport::new());
        let cache = Rc::new(RefCell::new(Cache::new(core::time::Duration::from_secs(60))));
        let engine = Rc::new(Engine::new(transport.clone() as Rc<dyn Transport>, cache));
        let controller = NavigationController::new(
            Rc::new(SpfConfig::default()),
            dom.clone() as Rc<dyn Dom>,
            history.clone() as Rc<dyn HistoryBackend>,
            tasks,
            loader,
            engine,
        );
        (controller, dom, transport, history)
    }

    #[test]
    fn click_with_a_modifier_key_does_not_navigate() {
        let (controller, _dom, _transport, _history) = controller();
        let (handled, future) = controller.click(&ClickContext {
            href: "https://x/a".to_owned(),
            has_modifier_key: true,
            is_primary_button: true,
            has_link_class: true,
            has_nolink_class: false,
        });
        assert!(!handled);
        assert!(future.is_none());
    }

    #[test]
    fn click_on_the_current_url_prevents_default_without_a_request() {
        let (controller, _dom, _transport, _history) = controller();
        let (handled, future) = controller.click(&ClickContext {
            href: "https://x/".to_owned(),
            has_modifier_key: false,
            is_primary_button: true,
            has_link_class: true,
            has_nolink_class: false,
        });
        assert!(handled);
        assert!(future.is_none());
    }

    #[tokio::test]
    async fn navigate_applies_a_single_response_and_dispatches_done() {
        let (controller, dom, transport, history) = controller();
        transport.script("https://x/a?spf=navigate", vec![br#"{"title":"A"}"#.to_vec()]);
        controller.navigate("https://x/a".to_owned(), NavigateOptions::default()).await;

        assert_eq!(dom.title(), "A");
        let names: Vec<String> = dom.dispatched_events().into_iter().map(|(name, _)| name).collect();
        assert!(names.contains(&"spfdone".to_owned()));
        assert!(names.contains(&"spfprocess".to_owned()));
        assert_eq!(history.entries().len(), 1);
    }

    #[tokio::test]
    async fn process_and_done_events_carry_the_applied_response() {
        let (controller, dom, transport, _history) = controller();
        transport.script("https://x/a?spf=navigate", vec![br#"{"title":"A"}"#.to_vec()]);
        controller.navigate("https://x/a".to_owned(), NavigateOptions::default()).await;

        for name in ["spfprocess", "spfdone"] {
            let detail = dom
                .dispatched_events()
                .into_iter()
                .find(|(event_name, _)| event_name == name)
                .map(|(_, detail)| detail)
                .unwrap_or_else(|| panic!("{name} was not dispatched"));
            assert!(detail.contains(r#""title":"A""#), "{name} detail should carry the applied response: {detail}");
        }
    }

    #[tokio::test]
    async fn a_redirect_response_replaces_history_and_navigates_again() {
        let (controller, dom, transport, history) = controller();
        transport.script("https://x/a?spf=navigate", vec![br#"{"redirect":"https://x/b"}"#.to_vec()]);
        transport.script("https://x/b?spf=navigate", vec![br#"{"title":"B"}"#.to_vec()]);
        controller.navigate("https://x/a".to_owned(), NavigateOptions::default()).await;

        assert_eq!(dom.title(), "B");
        let has_replace = history
            .entries()
            .iter()
            .any(|entry| matches!(entry, crate::history::FakeEntry::Replace { url: Some(url), .. } if url == "https://x/b"));
        assert!(has_replace);
    }

    #[test]
    fn eligibility_reports_over_limit_once_the_counter_is_exhausted() {
        let mut config = SpfConfig::default();
        config.navigate_limit = Some(0);
        let dom = Rc::new(RecordingDom::with_elements(["main"]));
        dom.set_location("https://x/");
        let history = Rc::new(FakeHistory::new());
        let tasks = Rc::new(RefCell::new(TaskQueues::new()));
        let loader = Rc::new(RefCell::new(ResourceLoader::new()));
        let transport = Rc::new(FakeTransport::new());
        let cache = Rc::new(RefCell::new(Cache::new(core::time::Duration::from_secs(60))));
        let engine = Rc::new(Engine::new(transport as Rc<dyn Transport>, cache));
        let controller = NavigationController::new(
            Rc::new(config),
            dom as Rc<dyn Dom>,
            history as Rc<dyn HistoryBackend>,
            tasks,
            loader,
            engine,
        );
        assert_eq!(controller.eligibility("https://x/a"), Eligibility::OverLimit);
    }

    #[tokio::test]
    async fn a_prefetch_in_flight_is_promoted_instead_of_a_second_request() {
        let (controller, dom, transport, _history) = controller();
        transport.script("https://x/a?spf=prefetch", vec![br#"{"title":"A"}"#.to_vec()]);

        let prefetch = controller.prefetch("https://x/a".to_owned());
        let navigate = controller.navigate("https://x/a".to_owned(), NavigateOptions::default());
        let (_, ()) = tokio::join!(prefetch, navigate);

        let sent = transport.sent_requests();
        assert_eq!(dom.title(), "A");
        assert_eq!(sent.iter().filter(|req| req.url == "https://x/a?spf=prefetch").count(), 1);
        assert_eq!(sent.iter().filter(|req| req.url == "https://x/a?spf=navigate").count(), 0);
    }
}
