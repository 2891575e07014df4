//! `NavContext`: the typed replacement for the original's string-keyed
//! global navigation state (spec.md §3 "Global navigation state", §9
//! "Shared mutable state → instance container").
//!
//! Every process-wide collaborator — the response cache, the task queues,
//! the resource loader, the script dependency graph, the navigation
//! controller's prefetch registry and counters — is owned here instead of
//! living as a module-level global, so a page (or a test) can construct,
//! tear down, and reconstruct a fully independent instance. [`NavContext`]
//! is the concrete shape of the `spf.*` public API in spec.md §6: `init`,
//! `dispose`, `navigate`, `load`, `prefetch`, `process`, `cache.*`,
//! `script.*`, `style.*` are all methods here, delegating to the component
//! each one names.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::cache::Cache;
use crate::config::SpfConfig;
use crate::dom::Dom;
use crate::history::HistoryBackend;
use crate::navigation::{ClickContext, NavFuture, NavigateOptions, NavigationController};
use crate::process::{self, NavInfo, NavKind};
use crate::request::{Engine, RequestCallbacks};
use crate::resources::{ResourceLoader, ResourceType};
use crate::response::Response;
use crate::scripts::ScriptDeps;
use crate::tasks::TaskQueues;
use crate::transport::Transport;

/// Owns every process-wide piece of navigation state for one page load.
///
/// Constructed once via [`NavContext::new`] (or dropped in and rebuilt —
/// there is no hidden global surviving a `dispose`/`new` cycle, unlike the
/// module-reload concern the original's globals existed to survive).
pub struct NavContext {
    config: Rc<SpfConfig>,
    dom: Rc<dyn Dom>,
    history: Rc<dyn HistoryBackend>,
    tasks: Rc<RefCell<TaskQueues>>,
    loader: Rc<RefCell<ResourceLoader>>,
    scripts: RefCell<ScriptDeps>,
    cache: Rc<RefCell<Cache>>,
    engine: Rc<Engine>,
    controller: NavigationController,
    initialized: Cell<bool>,
}

impl NavContext {
    /// Builds a context over the given collaborators. Does not itself
    /// register any browser listeners — that is the embedder's job, driven
    /// by [`NavContext::handle_click`] / [`NavContext::handle_popstate`]
    /// once [`NavContext::init`] has returned `true`.
    #[must_use]
    pub fn new(config: SpfConfig, dom: Rc<dyn Dom>, history: Rc<dyn HistoryBackend>, transport: Rc<dyn Transport>) -> Self {
        let config = Rc::new(config);
        let tasks = Rc::new(RefCell::new(TaskQueues::new()));
        let loader = Rc::new(RefCell::new(ResourceLoader::new()));
        let cache = Rc::new(RefCell::new(Cache::new(config.cache_lifetime)));
        let engine = Rc::new(Engine::new(transport, Rc::clone(&cache)));
        let controller = NavigationController::new(
            Rc::clone(&config),
            Rc::clone(&dom),
            Rc::clone(&history),
            Rc::clone(&tasks),
            Rc::clone(&loader),
            Rc::clone(&engine),
        );
        Self {
            config,
            dom,
            history,
            tasks,
            loader,
            scripts: RefCell::new(ScriptDeps::new()),
            cache,
            engine,
            controller,
            initialized: Cell::new(false),
        }
    }

    /// Builds a context against the real browser DOM, history, and
    /// transport (`wasm` feature).
    #[cfg(feature = "wasm")]
    #[must_use]
    pub fn new_browser(config: SpfConfig) -> Self {
        Self::new(
            config,
            Rc::new(crate::dom::web::WebDom::new()),
            Rc::new(crate::history::web::WebHistory::new()),
            Rc::new(crate::transport::web::XhrTransport::new()),
        )
    }

    /// Builds a context against a real `reqwest`-backed transport with the
    /// given `Dom`/`HistoryBackend` (`native` feature; for embedders
    /// driving navigation logic outside of an actual browser tab).
    #[cfg(feature = "native")]
    #[must_use]
    pub fn new_native(config: SpfConfig, dom: Rc<dyn Dom>, history: Rc<dyn HistoryBackend>) -> Self {
        Self::new(config, dom, history, Rc::new(crate::transport::ReqwestTransport::new()))
    }

    /// `spf.init(config?) -> bool` (spec.md §6). Idempotent: registers the
    /// `popstate` handler once and returns `true`; a second call while
    /// already initialized is a no-op returning `false`.
    pub fn init(&self) -> bool {
        if self.initialized.get() {
            return false;
        }
        self.initialized.set(true);
        // `HistoryBackend::init` needs a registered handler to wire up its
        // `popstate` listener at all; the embedder drives the actual
        // navigation by calling `NavContext::handle_popstate` with the
        // resolved url/state once that handler fires.
        self.history.init(Box::new(|_url, _state| {}));
        true
    }

    /// `spf.dispose()` (spec.md §6). Cancels every task queue and clears
    /// the prefetch registry, response cache, and pub/sub state; the
    /// context itself may be reused after another [`NavContext::init`].
    pub fn dispose(&self) {
        self.controller.cancel();
        self.controller.cancel_all_prefetches_except(None);
        self.tasks.borrow_mut().cancel_all_except("", "");
        self.cache.borrow_mut().clear();
        self.initialized.set(false);
    }

    /// Whether [`NavContext::init`] has run without a matching
    /// [`NavContext::dispose`].
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    /// Routes an intercepted click through the navigation controller
    /// (spec.md §4.K "click"). Returns whether the browser's default
    /// action should be prevented, plus a future to drive if a navigation
    /// should proceed.
    pub fn handle_click(&self, ctx: &ClickContext) -> (bool, Option<NavFuture<'_>>) {
        self.controller.click(ctx)
    }

    /// Routes a `popstate` event through the navigation controller
    /// (spec.md §4.K "history").
    pub fn handle_popstate(&self, url: String, state: Option<crate::history::HistoryState>) -> Option<NavFuture<'_>> {
        self.controller.handle_popstate(url, state)
    }

    /// `spf.navigate(url, options?)` (spec.md §6).
    pub fn navigate(&self, url: String, options: NavigateOptions) -> NavFuture<'_> {
        self.controller.navigate(url, options)
    }

    /// `spf.load(url, options?)` (spec.md §6): not subject to eligibility
    /// limits, dispatches only the given callbacks.
    pub fn load<'a>(&'a self, url: String, options: NavigateOptions, callbacks: RequestCallbacks<'a>) -> NavFuture<'a> {
        self.controller.load(url, options, callbacks)
    }

    /// `spf.prefetch(url, options?)` (spec.md §6): registers an in-flight
    /// request a later `navigate` to the same URL can be promoted into.
    pub fn prefetch(&self, url: String) -> NavFuture<'_> {
        self.controller.prefetch(url)
    }

    /// `spf.process(response, callback?)` (spec.md §6): applies an
    /// already-obtained response to the DOM directly, outside of the
    /// navigation/request pipeline (e.g. a response constructed locally, or
    /// relayed from elsewhere). Runs with [`NavKind::Request`] semantics —
    /// no history entry, no navigation events.
    pub fn process(&self, response: Response, callback: impl FnMut() + 'static) {
        let current = self.dom.location_href();
        let parts = response.parts();
        let Some(first) = parts.first() else {
            return;
        };
        if first.redirect.is_some() || first.reload == Some(true) {
            // `spf.process` applies a response in place; redirect/reload
            // semantics belong to the navigation pipeline, not here.
            return;
        }
        let owned: Vec<_> = parts.into_iter().cloned().collect();
        drive_process_parts(
            Rc::clone(&self.dom),
            Rc::clone(&self.tasks),
            Rc::clone(&self.loader),
            Rc::clone(&self.history),
            Rc::clone(&self.config),
            owned,
            current,
            Rc::new(RefCell::new(Some(callback))),
        );
    }

    /// `spf.cache.remove(key)` (spec.md §6).
    pub fn cache_remove(&self, key: &str) {
        self.cache.borrow_mut().remove(key);
    }

    /// `spf.cache.clear()` (spec.md §6).
    pub fn cache_clear(&self) {
        self.cache.borrow_mut().clear();
    }

    /// `spf.script.declare(deps, urls?)` (spec.md §4.F / §6).
    pub fn script_declare(&self, deps: std::collections::HashMap<String, Vec<String>>, urls: Option<std::collections::HashMap<String, String>>) {
        self.scripts.borrow_mut().declare(deps, urls);
    }

    /// `spf.script.load(url, name, cb?)` (spec.md §6).
    pub fn script_load(&self, url: &str, name: &str, callback: impl FnMut() + 'static) {
        self.scripts
            .borrow_mut()
            .load(self.dom.as_ref(), &mut self.loader.borrow_mut(), url, name, callback);
        crate::resources::flush_ready(&self.loader);
    }

    /// `spf.script.unload(url)` / the `unrequire`-adjacent single-name form
    /// (spec.md §6).
    pub fn script_unload(&self, url: &str) {
        self.loader.borrow_mut().unload(self.dom.as_ref(), ResourceType::Script, url);
    }

    /// `spf.script.get(name)` (spec.md §6): whether `name`'s mapped URL is
    /// currently loaded.
    #[must_use]
    pub fn script_is_loaded(&self, url: &str) -> bool {
        self.loader.borrow().is_loaded(ResourceType::Script, url)
    }

    /// `spf.script.ready(names, cb?, requireCb?)` (spec.md §4.F / §6).
    pub fn script_ready(
        &self,
        names: &[String],
        callback: impl FnMut() + 'static,
        require_callback: Option<impl FnMut(&[String])>,
    ) {
        self.scripts
            .borrow_mut()
            .ready(self.dom.as_ref(), &mut self.loader.borrow_mut(), names, callback, require_callback);
        crate::resources::flush_ready(&self.loader);
    }

    /// `spf.script.require(names, cb?)` (spec.md §4.F / §6).
    pub fn script_require(&self, names: &[String], callback: impl FnMut() + 'static) {
        self.scripts
            .borrow_mut()
            .require(self.dom.as_ref(), &mut self.loader.borrow_mut(), names, callback);
        crate::resources::flush_ready(&self.loader);
    }

    /// `spf.script.unrequire(names)` (spec.md §4.F / §6).
    pub fn script_unrequire(&self, names: &[String]) {
        self.scripts.borrow_mut().unrequire(self.dom.as_ref(), &mut self.loader.borrow_mut(), names);
    }

    /// `spf.script.done(name)` (spec.md §4.F / §6).
    pub fn script_done(&self, name: &str) {
        self.scripts.borrow_mut().done(name);
    }

    /// `spf.script.prefetch(url)` / `spf.style.prefetch(url)` (spec.md §4.E
    /// / §6), parameterized by resource kind.
    pub fn resource_prefetch(&self, kind: ResourceType, url: &str) {
        self.loader.borrow_mut().prefetch(self.dom.as_ref(), kind, url);
    }

    /// `spf.style.load(url, name, cb?)` (spec.md §6).
    pub fn style_load(&self, url: &str, name: Option<&str>, callback: impl FnMut() + 'static) {
        self.loader.borrow_mut().load(self.dom.as_ref(), ResourceType::Style, url, name, callback);
        crate::resources::flush_ready(&self.loader);
    }

    /// `spf.style.unload(url)` (spec.md §6).
    pub fn style_unload(&self, url: &str) {
        self.loader.borrow_mut().unload(self.dom.as_ref(), ResourceType::Style, url);
    }

    /// `spf.style.get(url)` (spec.md §6): whether `url` is currently loaded.
    #[must_use]
    pub fn style_is_loaded(&self, url: &str) -> bool {
        self.loader.borrow().is_loaded(ResourceType::Style, url)
    }

    /// The configuration this context was built with.
    #[must_use]
    pub fn config(&self) -> &SpfConfig {
        &self.config
    }
}

/// Applies `remaining` one part at a time via [`process::process`],
/// chaining the next part's application inside the previous one's `on_done`
/// so whole-response ordering (spec.md §4.I) holds without a second queue:
/// each part's own `"process ${url}"` queue must fully drain before the
/// next part is even scheduled.
#[allow(clippy::too_many_arguments)]
fn drive_process_parts(
    dom: Rc<dyn Dom>,
    tasks: Rc<RefCell<TaskQueues>>,
    loader: Rc<RefCell<ResourceLoader>>,
    history: Rc<dyn HistoryBackend>,
    config: Rc<SpfConfig>,
    mut remaining: Vec<crate::response::SingleResponse>,
    current: String,
    callback: Rc<RefCell<Option<impl FnMut() + 'static>>>,
) {
    if remaining.is_empty() {
        if let Some(mut callback) = callback.borrow_mut().take() {
            callback();
        }
        return;
    }
    let part = remaining.remove(0);
    let nav = NavInfo::new(current.clone(), current.clone(), NavKind::Request);
    let dom_for_next = Rc::clone(&dom);
    let tasks_for_next = Rc::clone(&tasks);
    let loader_for_next = Rc::clone(&loader);
    let history_for_next = Rc::clone(&history);
    let config_for_next = Rc::clone(&config);
    let current_for_next = current;
    let callback_for_next = Rc::clone(&callback);
    process::process(dom, tasks, loader, history, &config, part, nav, move || {
        drive_process_parts(
            Rc::clone(&dom_for_next),
            Rc::clone(&tasks_for_next),
            Rc::clone(&loader_for_next),
            Rc::clone(&history_for_next),
            Rc::clone(&config_for_next),
            std::mem::take(&mut remaining),
            current_for_next.clone(),
            Rc::clone(&callback_for_next),
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::RecordingDom;
    use crate::history::FakeHistory;
    use crate::transport::FakeTransport;

    fn context() -> (NavContext, Rc<RecordingDom>, Rc<FakeTransport>) {
        let dom = Rc::new(RecordingDom::with_elements(["main"]));
        dom.set_location("https://x/");
        let history = Rc::new(FakeHistory::new());
        let transport = Rc::new(FakeTransport::new());
        let context = NavContext::new(
            SpfConfig::default(),
            dom.clone() as Rc<dyn Dom>,
            history as Rc<dyn HistoryBackend>,
            transport.clone() as Rc<dyn Transport>,
        );
        (context, dom, transport)
    }

    #[test]
    fn init_is_idempotent() {
        let (context, _dom, _transport) = context();
        assert!(context.init());
        assert!(!context.init(), "a second call while initialized is a no-op");
    }

    #[test]
    fn dispose_allows_reinitialization() {
        let (context, _dom, _transport) = context();
        assert!(context.init());
        context.dispose();
        assert!(!context.is_initialized());
        assert!(context.init());
    }

    #[tokio::test]
    async fn navigate_through_the_context_updates_the_title() {
        let (context, dom, transport) = context();
        transport.script("https://x/a?spf=navigate", vec![br#"{"title":"A"}"#.to_vec()]);
        context.navigate("https://x/a".to_owned(), NavigateOptions::default()).await;
        assert_eq!(dom.title(), "A");
    }

    #[test]
    fn script_load_is_idempotent_across_two_calls() {
        let (context, dom, _transport) = context();
        context.script_load("https://x/a.js", "a", || {});
        context.script_load("https://x/a.js", "a", || {});
        assert_eq!(dom.script_append_count("https://x/a.js"), 1);
    }

    #[test]
    fn process_applies_a_bare_response_without_history() {
        let (context, dom, _transport) = context();
        let response = Response::Single(crate::response::SingleResponse {
            title: Some("Processed".to_owned()),
            ..crate::response::SingleResponse::default()
        });
        let done = Rc::new(Cell::new(false));
        let done_clone = Rc::clone(&done);
        context.process(response, move || done_clone.set(true));
        assert_eq!(dom.title(), "Processed");
    }

    #[test]
    fn cache_remove_and_clear_delegate_to_the_shared_cache() {
        let (context, _dom, _transport) = context();
        context.cache.borrow_mut().insert(
            "k",
            Response::Single(crate::response::SingleResponse::default()),
            crate::cache::EntryKind::Navigate,
        );
        context.cache_remove("k");
        assert!(context.cache.borrow().get("k").is_none());
        context.cache.borrow_mut().insert(
            "k2",
            Response::Single(crate::response::SingleResponse::default()),
            crate::cache::EntryKind::Navigate,
        );
        context.cache_clear();
        assert!(context.cache.borrow().is_empty());
    }
}
