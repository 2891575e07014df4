//! Applies a parsed response to the DOM via the task queue (spec.md §4.I).
//!
//! All DOM work for one response is scheduled on a queue named
//! `"process ${absoluteUrl}"` (see [`queue_name`]), generalizing the
//! teacher's per-page [`tasks::TaskQueues`] idiom of keying a queue off an
//! identity (there an element; here the navigated URL) so concurrent
//! responses for different URLs proceed independently while one URL's parts
//! stay strictly ordered.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use web_time::Duration;

use crate::config::SpfConfig;
use crate::dom::Dom;
use crate::history::{HistoryBackend, HistoryState};
use crate::resources::{ResourceLoader, ResourceType};
use crate::response::extract::{self, ExtractedScript};
use crate::response::SingleResponse;
use crate::tasks::{self, TaskQueues};
use crate::url;

/// Which kind of navigation a response is being applied for (spec.md §3
/// "Navigation info" `type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKind {
    /// A bare `request()` with no navigation semantics.
    Request,
    /// A forward click/`navigate()` navigation.
    Navigate,
    /// A `popstate`-driven back navigation.
    NavigateBack,
    /// A `popstate`-driven forward navigation.
    NavigateForward,
    /// A `load()` call: not a navigation, callbacks only.
    Load,
    /// A `prefetch()` call: not a navigation, callbacks only.
    Prefetch,
}

impl NavKind {
    /// Whether this kind represents an actual page navigation (as opposed
    /// to a bare `load`/`prefetch`/`request`).
    #[must_use]
    pub const fn is_navigation(self) -> bool {
        matches!(self, Self::Navigate | Self::NavigateBack | Self::NavigateForward)
    }
}

/// Per-navigation context threaded through response processing (spec.md §3
/// "Navigation info"). Immutable except for the shared `scrolled` flag,
/// which several fragments and the final scroll step all read and write.
#[derive(Debug, Clone)]
pub struct NavInfo {
    /// The absolute URL currently being navigated to.
    pub current: String,
    /// Whether this navigation was driven by a `popstate` event.
    pub history: bool,
    /// The URL originally requested, before any redirect.
    pub original: String,
    /// An explicit scroll position to restore, carried from history state.
    pub position: Option<(f64, f64)>,
    /// The referring URL.
    pub referer: String,
    /// Whether this is a back (as opposed to forward) history navigation.
    pub reverse: bool,
    /// Set once some step has scrolled the viewport, so the final fallback
    /// step knows not to reset to `(0, 0)`.
    pub scrolled: Rc<Cell<bool>>,
    /// What kind of navigation this is.
    pub r#type: NavKind,
}

impl NavInfo {
    /// Builds a fresh, unscrolled [`NavInfo`].
    #[must_use]
    pub fn new(current: impl Into<String>, referer: impl Into<String>, kind: NavKind) -> Self {
        let current = current.into();
        Self {
            original: current.clone(),
            current,
            history: matches!(kind, NavKind::NavigateBack | NavKind::NavigateForward),
            position: None,
            referer: referer.into(),
            reverse: matches!(kind, NavKind::NavigateBack),
            scrolled: Rc::new(Cell::new(false)),
            r#type: kind,
        }
    }
}

/// The task-queue name a response for `absolute_url` is processed on.
#[must_use]
pub fn queue_name(absolute_url: &str) -> String {
    format!("process {absolute_url}")
}

/// Schedules every step needed to apply `response` to the DOM for `nav`,
/// then drains the queue, invoking `on_done` once processing completes.
///
/// `history` is consulted only for the immediate URL-correction step (§4.I
/// point 2); it is not used if `response.url` is absent or `nav` is not a
/// navigation driven by history replacement.
#[allow(clippy::too_many_arguments)]
pub fn process(
    dom: Rc<dyn Dom>,
    tasks: Rc<RefCell<TaskQueues>>,
    loader: Rc<RefCell<ResourceLoader>>,
    history: Rc<dyn HistoryBackend>,
    config: &SpfConfig,
    response: SingleResponse,
    nav: NavInfo,
    on_done: impl FnMut() + 'static,
) {
    if let Some(title) = &response.title {
        dom.set_title(title);
    }

    if nav.r#type.is_navigation() {
        if let Some(new_url) = &response.url {
            let (_, hash) = url::partition_hash(&nav.current);
            let corrected = url::with_hash(new_url, hash);
            let _ = history.replace(
                Some(&corrected),
                &HistoryState {
                    referer: nav.referer.clone(),
                    ..HistoryState::default()
                },
            );
        }
    }

    let queue = queue_name(&nav.current);
    let response = Rc::new(response);
    let config = Rc::new(config.clone());

    if let Some(head) = response.head.clone() {
        let dom = Rc::clone(&dom);
        let loader = Rc::clone(&loader);
        let tasks_for_head = Rc::clone(&tasks);
        let queue_for_head = queue.clone();
        tasks.borrow_mut().add(&queue, Duration::ZERO, move || {
            install_fragment(&dom, &loader, &tasks_for_head, &queue_for_head, &head);
        });
    }

    if let Some(attrs) = &response.attr {
        let dom = Rc::clone(&dom);
        let attrs = attrs.clone();
        tasks.borrow_mut().add(&queue, Duration::ZERO, move || {
            for (element_id, values) in &attrs {
                for (name, value) in values {
                    dom.set_attribute(element_id, name, value);
                }
            }
        });
    }

    if let Some(body) = &response.body {
        for (element_id, html) in body.clone() {
            let dom = Rc::clone(&dom);
            let loader = Rc::clone(&loader);
            let tasks_for_body = Rc::clone(&tasks);
            let queue_for_body = queue.clone();
            let config = Rc::clone(&config);
            let nav = nav.clone();
            let response_name = response.name.clone();
            tasks.borrow_mut().add(&queue, Duration::ZERO, move || {
                if !nav.history && nav.position.is_none() && !nav.scrolled.get() {
                    dom.scroll_to(0.0, 0.0);
                    nav.scrolled.set(true);
                }
                install_body_fragment(
                    &dom,
                    &loader,
                    &tasks_for_body,
                    &queue_for_body,
                    &config,
                    &element_id,
                    &html,
                    response_name.as_deref(),
                );
            });
        }
    }

    if let Some(foot) = response.foot.clone() {
        let dom = Rc::clone(&dom);
        let loader = Rc::clone(&loader);
        let tasks_for_foot = Rc::clone(&tasks);
        let queue_for_foot = queue.clone();
        tasks.borrow_mut().add(&queue, Duration::ZERO, move || {
            install_fragment(&dom, &loader, &tasks_for_foot, &queue_for_foot, &foot);
        });
    }

    {
        let dom = Rc::clone(&dom);
        let nav = nav.clone();
        let mut on_done = on_done;
        tasks.borrow_mut().add(&queue, Duration::ZERO, move || {
            final_scroll(&dom, &nav);
            on_done();
        });
    }

    tasks.borrow_mut().run(&queue, true);
}

/// Installs an extracted fragment's preconnects/styles immediately, then
/// suspends the queue to install its scripts and resumes once they finish.
/// Used for the `head`/`foot` steps, which have no `innerHTML` target.
fn install_fragment(
    dom: &Rc<dyn Dom>,
    loader: &Rc<RefCell<ResourceLoader>>,
    tasks: &Rc<RefCell<TaskQueues>>,
    queue: &str,
    html: &str,
) {
    let extracted = extract::extract(html);
    for href in &extracted.preconnects {
        dom.append_preconnect(href);
    }
    install_styles(dom, loader, &extracted.styles, &extracted.links);
    install_scripts(dom, loader, tasks, queue, extracted.scripts);
}

/// Like [`install_fragment`] but for a `body` entry: replaces `innerHTML`,
/// and runs the configured animated transition when the element opts in.
fn install_body_fragment(
    dom: &Rc<dyn Dom>,
    loader: &Rc<RefCell<ResourceLoader>>,
    tasks: &Rc<RefCell<TaskQueues>>,
    queue: &str,
    config: &SpfConfig,
    element_id: &str,
    html: &str,
    response_name: Option<&str>,
) {
    let extracted = extract::extract(html);
    for href in &extracted.preconnects {
        dom.append_preconnect(href);
    }
    install_styles(dom, loader, &extracted.styles, &extracted.links);

    if dom.has_class(element_id, &config.animation_class) {
        animate_fragment(dom, element_id, &extracted.html, response_name, config.animation_duration, tasks);
    } else {
        // `experimental_html_handler` names an external HTML-handler
        // boundary the distillation never specifies a contract for; until
        // one exists, fall back to the default innerHTML replacement.
        dom.set_inner_html(element_id, &extracted.html);
    }

    install_scripts(dom, loader, tasks, queue, extracted.scripts);
}

fn install_styles(
    dom: &Rc<dyn Dom>,
    loader: &Rc<RefCell<ResourceLoader>>,
    styles: &[extract::ExtractedStyle],
    links: &[extract::ExtractedLink],
) {
    for (index, style) in styles.iter().enumerate() {
        let id = format!("inline-style-{index:x}");
        dom.append_inline_style(&id, &style.text);
    }
    for link in links {
        loader
            .borrow_mut()
            .load(dom.as_ref(), ResourceType::Style, &link.href, link.name.as_deref(), || {});
        crate::resources::flush_ready(loader);
    }
}

/// Suspends `queue`, installs `scripts` (non-async scripts sequentially,
/// async scripts concurrently), and resumes the queue once every script has
/// finished loading.
fn install_scripts(
    dom: &Rc<dyn Dom>,
    loader: &Rc<RefCell<ResourceLoader>>,
    tasks: &Rc<RefCell<TaskQueues>>,
    queue: &str,
    scripts: Vec<ExtractedScript>,
) {
    if scripts.is_empty() {
        return;
    }

    tasks.borrow_mut().suspend(queue);

    let remaining = Rc::new(Cell::new(scripts.len()));
    let tasks_for_resume = Rc::clone(tasks);
    let queue_owned = queue.to_owned();
    let resume_once = Rc::new(move || {
        let left = remaining.get() - 1;
        remaining.set(left);
        if left == 0 {
            tasks_for_resume.borrow_mut().resume(&queue_owned, true);
        }
    });

    let mut non_async: Vec<ExtractedScript> = Vec::new();
    for script in scripts {
        if script.src.is_some() && !script.is_async {
            non_async.push(script);
            continue;
        }
        install_one_script(dom, loader, &script, Rc::clone(&resume_once));
    }

    load_sequential(dom, loader, non_async, resume_once);
}

fn install_one_script(
    dom: &Rc<dyn Dom>,
    loader: &Rc<RefCell<ResourceLoader>>,
    script: &ExtractedScript,
    resume_once: Rc<impl Fn() + 'static>,
) {
    match &script.src {
        Some(src) => {
            let resume = Rc::clone(&resume_once);
            loader
                .borrow_mut()
                .load(dom.as_ref(), ResourceType::Script, src, script.name.as_deref(), move || (*resume)());
            crate::resources::flush_ready(loader);
        }
        None => {
            let id = resources_inline_id(script.text.as_deref().unwrap_or_default());
            dom.append_script(&id, None, script.text.as_deref(), false);
            (*resume_once)();
        }
    }
}

/// Loads `remaining` one at a time, in order — the next script's load only
/// begins once the previous one's `load` event fires.
fn load_sequential(
    dom: &Rc<dyn Dom>,
    loader: &Rc<RefCell<ResourceLoader>>,
    mut remaining: Vec<ExtractedScript>,
    resume_once: Rc<impl Fn() + 'static>,
) {
    if remaining.is_empty() {
        return;
    }
    let script = remaining.remove(0);
    let dom_for_next = Rc::clone(dom);
    let loader_for_next = Rc::clone(loader);
    let resume_for_load = Rc::clone(&resume_once);
    let src = script.src.clone().unwrap_or_default();
    loader.borrow_mut().load(dom.as_ref(), ResourceType::Script, &src, script.name.as_deref(), move || {
        (*resume_for_load)();
        load_sequential(&dom_for_next, &loader_for_next, remaining.clone(), Rc::clone(&resume_for_load));
    });
    crate::resources::flush_ready(loader);
}

fn resources_inline_id(text: &str) -> String {
    crate::resources::element_id(ResourceType::Script, text)
}

/// The three-step animated transition (spec.md §4.I "Animation sub-queue").
fn animate_fragment(
    dom: &Rc<dyn Dom>,
    element_id: &str,
    new_html: &str,
    response_name: Option<&str>,
    duration: Duration,
    tasks: &Rc<RefCell<TaskQueues>>,
) {
    let from_name = dom.data_name(element_id).unwrap_or_default();
    let to_name = response_name.unwrap_or_default().to_owned();
    let sub_queue = tasks::key(element_id);

    let dom1 = Rc::clone(dom);
    let id1 = element_id.to_owned();
    let html1 = new_html.to_owned();
    let from1 = from_name.clone();
    let to1 = to_name.clone();
    tasks.borrow_mut().add(&sub_queue, Duration::ZERO, move || {
        dom1.set_attribute(&id1, "data-spf-animating-from", &from1);
        dom1.set_attribute(&id1, "data-spf-animating-to", &to1);
        dom1.set_attribute(&id1, "data-spf-pending-html", &html1);
    });

    let dom2 = Rc::clone(dom);
    let id2 = element_id.to_owned();
    tasks.borrow_mut().add(&sub_queue, Duration::from_millis(17), move || {
        dom2.set_attribute(&id2, "data-spf-animation-phase", "swap");
    });

    let dom3 = Rc::clone(dom);
    let id3 = element_id.to_owned();
    let html3 = new_html.to_owned();
    let to3 = to_name;
    tasks.borrow_mut().add(&sub_queue, duration, move || {
        dom3.set_inner_html(&id3, &html3);
        dom3.set_attribute(&id3, "data-spf-name", &to3);
    });

    tasks.borrow_mut().run(&sub_queue, false);
}

fn final_scroll(dom: &Rc<dyn Dom>, nav: &NavInfo) {
    if let Some((x, y)) = nav.position {
        dom.scroll_to(x, y);
        nav.scrolled.set(true);
        return;
    }
    let (_, hash) = url::partition_hash(&nav.current);
    if let Some(hash) = hash {
        let target = hash.trim_start_matches('#');
        if !target.is_empty() && dom.scroll_into_view(target) {
            nav.scrolled.set(true);
            return;
        }
    }
    if !nav.scrolled.get() {
        dom.scroll_to(0.0, 0.0);
        nav.scrolled.set(true);
    }
}
