//! The DOM boundary trait.
//!
//! `spec.md` §1 names "low-level wrappers for ... DOM traversal, class-list
//! manipulation" as an external collaborator whose contract is referenced
//! but not specified. [`Dom`] is that referenced contract: every operation
//! the navigation pipeline needs from the page's live DOM, generalized from
//! the teacher's `html::dom::DOMSubscriber` trait
//! (`crates/page_handler/src/updater.rs`) which plays the same role for
//! style/layout updates.
//!
//! Two implementations ship: [`RecordingDom`], an in-memory double used by
//! tests and by the `native` feature's non-browser embedders, and (behind
//! the `wasm` feature) a `web_sys`-backed implementation.

use std::cell::RefCell;
use std::collections::HashMap;

/// Everything the navigation pipeline needs to mutate a live (or simulated)
/// document.
pub trait Dom {
    /// Sets `document.title`.
    fn set_title(&self, title: &str);

    /// Replaces the `innerHTML` of the element with the given id. Returns
    /// `false` if no such element exists.
    fn set_inner_html(&self, element_id: &str, html: &str) -> bool;

    /// Sets a single attribute on the element with the given id. Returns
    /// `false` if no such element exists.
    fn set_attribute(&self, element_id: &str, name: &str, value: &str) -> bool;

    /// Returns `true` if an element with the given id exists and its
    /// `class` attribute contains `class_name`.
    fn has_class(&self, element_id: &str, class_name: &str) -> bool;

    /// Returns the element id's current `data-spf-name` attribute value, if
    /// any (used by the animation sub-queue to read the prior transition
    /// `name`).
    fn data_name(&self, element_id: &str) -> Option<String>;

    /// Returns `true` if an element with the given id exists at all.
    fn element_exists(&self, element_id: &str) -> bool;

    /// Scrolls the window to the given coordinates.
    fn scroll_to(&self, x: f64, y: f64);

    /// Scrolls the element with the given id into view, returning `false`
    /// if it does not exist.
    fn scroll_into_view(&self, element_id: &str) -> bool;

    /// Appends a `<script>` element to `<head>` with the given attributes;
    /// returns the element id the loader should track readiness under.
    fn append_script(&self, element_id: &str, src: Option<&str>, inline: Option<&str>, r#async: bool);

    /// Appends a `<link rel=stylesheet>` element to `<head>`.
    fn append_stylesheet(&self, element_id: &str, href: &str);

    /// Appends an inline `<style>` element to `<head>` with the given CSS
    /// text (spec.md §4.H "styles" — inline extraction, as opposed to the
    /// external `<link rel=stylesheet>` extracted as a `link`).
    fn append_inline_style(&self, element_id: &str, css_text: &str);

    /// Appends a `<link rel=spf-preconnect>` element to `<head>`.
    fn append_preconnect(&self, href: &str);

    /// Appends a `<link rel=prefetch>` element for `url` to `<head>`,
    /// issuing the HTTP request without executing or applying it — the
    /// resource-loader's way of warming the browser cache for a script or
    /// style that will only be `load`ed later (spec.md §4.E `prefetch`).
    /// `url` must not be re-requested for the given `element_id`.
    fn append_prefetch(&self, element_id: &str, url: &str);

    /// Removes the element with the given id, if present.
    fn remove_element(&self, element_id: &str);

    /// Dispatches a `CustomEvent` with the given name and JSON-encoded
    /// `detail` on `document`. Returns `false` if a listener cancelled it.
    fn dispatch_custom_event(&self, name: &str, detail_json: &str) -> bool;

    /// Returns `window.location.href`, the navigation controller's view of
    /// "the current URL" when nothing else has supplied one.
    fn location_href(&self) -> String;

    /// Performs the full-page reload fallback (spec.md §4.K "Reload
    /// reasons"): assigns `location.href = url`. When `also_reload` is
    /// `true` the caller has determined `url` differs from the current
    /// location only by hash, so `location.reload()` is additionally
    /// issued (a hash-only assignment would not otherwise force a fetch).
    fn navigate_to(&self, url: &str, also_reload: bool);
}

/// An in-memory [`Dom`] double that records every call instead of mutating a
/// real document. Used by the test suite and by `native`-feature embedders
/// that want to drive navigation logic without a browser (for example, a
/// pre-render diffing tool).
#[derive(Default)]
pub struct RecordingDom {
    inner: RefCell<RecordingDomState>,
}

#[derive(Default)]
struct RecordingDomState {
    title: String,
    elements: HashMap<String, ElementRecord>,
    scroll: (f64, f64),
    dispatched: Vec<(String, String)>,
    cancel_next_event: Option<String>,
    location: String,
    reloads: Vec<(String, bool)>,
    script_appends: HashMap<String, u32>,
}

#[derive(Default, Clone)]
struct ElementRecord {
    inner_html: String,
    attrs: HashMap<String, String>,
}

impl RecordingDom {
    /// Creates an empty recording double with the given element ids
    /// pre-seeded as present (with empty content), so `set_inner_html`/
    /// `set_attribute` calls against them succeed.
    #[must_use]
    pub fn with_elements(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let dom = Self::default();
        {
            let mut state = dom.inner.borrow_mut();
            for id in ids {
                state.elements.entry(id.into()).or_default();
            }
        }
        dom
    }

    /// The current recorded document title.
    #[must_use]
    pub fn title(&self) -> String {
        self.inner.borrow().title.clone()
    }

    /// The current recorded `innerHTML` for an element, if it exists.
    #[must_use]
    pub fn inner_html(&self, element_id: &str) -> Option<String> {
        self.inner
            .borrow()
            .elements
            .get(element_id)
            .map(|record| record.inner_html.clone())
    }

    /// The current recorded attribute value for an element, if both exist.
    #[must_use]
    pub fn attribute(&self, element_id: &str, name: &str) -> Option<String> {
        self.inner
            .borrow()
            .elements
            .get(element_id)?
            .attrs
            .get(name)
            .cloned()
    }

    /// The current recorded scroll position.
    #[must_use]
    pub fn scroll_position(&self) -> (f64, f64) {
        self.inner.borrow().scroll
    }

    /// All `(event_name, detail_json)` pairs dispatched so far, in order.
    #[must_use]
    pub fn dispatched_events(&self) -> Vec<(String, String)> {
        self.inner.borrow().dispatched.clone()
    }

    /// Arranges for the next dispatch of `event_name` to return `false`
    /// (simulate a listener calling `preventDefault`).
    pub fn cancel_next(&self, event_name: impl Into<String>) {
        self.inner.borrow_mut().cancel_next_event = Some(event_name.into());
    }

    /// Sets the recorded `location.href`, as if the page had loaded there.
    pub fn set_location(&self, url: impl Into<String>) {
        self.inner.borrow_mut().location = url.into();
    }

    /// Every `(url, also_reload)` pair passed to [`Dom::navigate_to`], in
    /// order.
    #[must_use]
    pub fn reloads(&self) -> Vec<(String, bool)> {
        self.inner.borrow().reloads.clone()
    }

    /// How many times [`Dom::append_script`] has actually created a new
    /// element for `src` (as opposed to `ResourceLoader::load` short-circuiting
    /// on an existing one), keyed by the `src` passed in.
    #[must_use]
    pub fn script_append_count(&self, src: &str) -> u32 {
        self.inner.borrow().script_appends.get(src).copied().unwrap_or(0)
    }
}

impl Dom for RecordingDom {
    fn set_title(&self, title: &str) {
        self.inner.borrow_mut().title = title.to_owned();
    }

    fn set_inner_html(&self, element_id: &str, html: &str) -> bool {
        let mut state = self.inner.borrow_mut();
        match state.elements.get_mut(element_id) {
            Some(record) => {
                record.inner_html = html.to_owned();
                true
            }
            None => false,
        }
    }

    fn set_attribute(&self, element_id: &str, name: &str, value: &str) -> bool {
        let mut state = self.inner.borrow_mut();
        match state.elements.get_mut(element_id) {
            Some(record) => {
                record.attrs.insert(name.to_owned(), value.to_owned());
                true
            }
            None => false,
        }
    }

    fn has_class(&self, element_id: &str, class_name: &str) -> bool {
        self.inner
            .borrow()
            .elements
            .get(element_id)
            .and_then(|record| record.attrs.get("class"))
            .is_some_and(|classes| classes.split_whitespace().any(|token| token == class_name))
    }

    fn data_name(&self, element_id: &str) -> Option<String> {
        self.inner
            .borrow()
            .elements
            .get(element_id)?
            .attrs
            .get("data-spf-name")
            .cloned()
    }

    fn element_exists(&self, element_id: &str) -> bool {
        self.inner.borrow().elements.contains_key(element_id)
    }

    fn scroll_to(&self, x: f64, y: f64) {
        self.inner.borrow_mut().scroll = (x, y);
    }

    fn scroll_into_view(&self, element_id: &str) -> bool {
        self.element_exists(element_id)
    }

    fn append_script(&self, element_id: &str, src: Option<&str>, _inline: Option<&str>, _async: bool) {
        let mut state = self.inner.borrow_mut();
        state.elements.entry(element_id.to_owned()).or_default();
        if let Some(src) = src {
            *state.script_appends.entry(src.to_owned()).or_insert(0) += 1;
        }
    }

    fn append_stylesheet(&self, element_id: &str, _href: &str) {
        self.inner.borrow_mut().elements.entry(element_id.to_owned()).or_default();
    }

    fn append_inline_style(&self, element_id: &str, _css_text: &str) {
        self.inner.borrow_mut().elements.entry(element_id.to_owned()).or_default();
    }

    fn append_preconnect(&self, _href: &str) {}

    fn append_prefetch(&self, element_id: &str, _url: &str) {
        self.inner.borrow_mut().elements.entry(element_id.to_owned()).or_default();
    }

    fn remove_element(&self, element_id: &str) {
        self.inner.borrow_mut().elements.remove(element_id);
    }

    fn dispatch_custom_event(&self, name: &str, detail_json: &str) -> bool {
        let mut state = self.inner.borrow_mut();
        state
            .dispatched
            .push((name.to_owned(), detail_json.to_owned()));
        if state.cancel_next_event.as_deref() == Some(name) {
            state.cancel_next_event = None;
            false
        } else {
            true
        }
    }

    fn location_href(&self) -> String {
        self.inner.borrow().location.clone()
    }

    fn navigate_to(&self, url: &str, also_reload: bool) {
        let mut state = self.inner.borrow_mut();
        state.location = url.to_owned();
        state.reloads.push((url.to_owned(), also_reload));
    }
}

#[cfg(feature = "wasm")]
pub mod web {
    //! `web_sys`-backed [`super::Dom`] implementation, used when the crate
    //! runs in a real browser tab (the `wasm` feature).

    use super::Dom;
    use wasm_bindgen::JsCast;
    use web_sys::{CustomEventInit, Window};

    /// A [`Dom`] implementation that mutates the real `document` of the
    /// supplied `window` via `web_sys`.
    pub struct WebDom {
        window: Window,
    }

    impl WebDom {
        /// Binds to `web_sys::window()`, the tab's global `Window`.
        ///
        /// # Panics
        /// Panics if called outside a browser context (no global `window`).
        #[must_use]
        #[allow(clippy::expect_used, reason = "binding to a non-existent window is unrecoverable")]
        pub fn new() -> Self {
            Self {
                window: web_sys::window().expect("no global `window` exists"),
            }
        }

        #[allow(clippy::expect_used, reason = "a window without a document cannot happen in a browser tab")]
        fn document(&self) -> web_sys::Document {
            self.window.document().expect("window has no document")
        }
    }

    impl Default for WebDom {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Dom for WebDom {
        fn set_title(&self, title: &str) {
            self.document().set_title(title);
        }

        fn set_inner_html(&self, element_id: &str, html: &str) -> bool {
            match self.document().get_element_by_id(element_id) {
                Some(element) => {
                    element.set_inner_html(html);
                    true
                }
                None => false,
            }
        }

        fn set_attribute(&self, element_id: &str, name: &str, value: &str) -> bool {
            match self.document().get_element_by_id(element_id) {
                Some(element) => element.set_attribute(name, value).is_ok(),
                None => false,
            }
        }

        fn has_class(&self, element_id: &str, class_name: &str) -> bool {
            self.document()
                .get_element_by_id(element_id)
                .is_some_and(|element| element.class_list().contains(class_name))
        }

        fn data_name(&self, element_id: &str) -> Option<String> {
            self.document()
                .get_element_by_id(element_id)?
                .get_attribute("data-spf-name")
        }

        fn element_exists(&self, element_id: &str) -> bool {
            self.document().get_element_by_id(element_id).is_some()
        }

        fn scroll_to(&self, x: f64, y: f64) {
            self.window.scroll_to_with_x_and_y(x, y);
        }

        fn scroll_into_view(&self, element_id: &str) -> bool {
            match self.document().get_element_by_id(element_id) {
                Some(element) => {
                    element.scroll_into_view();
                    true
                }
                None => false,
            }
        }

        fn append_script(
            &self,
            element_id: &str,
            src: Option<&str>,
            inline: Option<&str>,
            r#async: bool,
        ) {
            let document = self.document();
            let Ok(element) = document.create_element("script") else {
                return;
            };
            let script: web_sys::HtmlScriptElement = element.unchecked_into();
            script.set_id(element_id);
            if let Some(src) = src {
                script.set_src(src);
            }
            if let Some(inline) = inline {
                script.set_text(inline);
            }
            script.set_async(r#async);
            if let Some(head) = document.head() {
                let _ = head.append_child(&script);
            }
        }

        fn append_stylesheet(&self, element_id: &str, href: &str) {
            let document = self.document();
            let Ok(element) = document.create_element("link") else {
                return;
            };
            let link: web_sys::HtmlLinkElement = element.unchecked_into();
            link.set_id(element_id);
            link.set_rel("stylesheet");
            link.set_href(href);
            if let Some(head) = document.head() {
                let _ = head.append_child(&link);
            }
        }

        fn append_inline_style(&self, element_id: &str, css_text: &str) {
            let document = self.document();
            let Ok(element) = document.create_element("style") else {
                return;
            };
            element.set_id(element_id);
            element.set_text_content(Some(css_text));
            if let Some(head) = document.head() {
                let _ = head.append_child(&element);
            }
        }

        fn append_preconnect(&self, href: &str) {
            let document = self.document();
            let Ok(element) = document.create_element("link") else {
                return;
            };
            let link: web_sys::HtmlLinkElement = element.unchecked_into();
            link.set_rel("spf-preconnect");
            link.set_href(href);
            if let Some(head) = document.head() {
                let _ = head.append_child(&link);
            }
        }

        fn append_prefetch(&self, element_id: &str, url: &str) {
            let document = self.document();
            let Ok(element) = document.create_element("link") else {
                return;
            };
            let link: web_sys::HtmlLinkElement = element.unchecked_into();
            link.set_id(element_id);
            link.set_rel("prefetch");
            link.set_href(url);
            if let Some(head) = document.head() {
                let _ = head.append_child(&link);
            }
        }

        fn remove_element(&self, element_id: &str) {
            if let Some(element) = self.document().get_element_by_id(element_id) {
                element.remove();
            }
        }

        fn dispatch_custom_event(&self, name: &str, detail_json: &str) -> bool {
            let detail = js_sys::JSON::parse(detail_json).unwrap_or(wasm_bindgen::JsValue::NULL);
            let mut init = CustomEventInit::new();
            init.detail(&detail);
            init.cancelable(true);
            init.bubbles(true);
            let Ok(event) =
                web_sys::CustomEvent::new_with_event_init_dict(name, &init)
            else {
                return true;
            };
            self.document()
                .dispatch_event(&event)
                .unwrap_or(true)
        }

        fn location_href(&self) -> String {
            self.window.location().href().unwrap_or_default()
        }

        fn navigate_to(&self, url: &str, also_reload: bool) {
            let location = self.window.location();
            let _ = location.set_href(url);
            if also_reload {
                let _ = location.reload();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_inner_html_requires_existing_element() {
        let dom = RecordingDom::with_elements(["main"]);
        assert!(dom.set_inner_html("main", "<p>a</p>"));
        assert!(!dom.set_inner_html("missing", "<p>a</p>"));
        assert_eq!(dom.inner_html("main").as_deref(), Some("<p>a</p>"));
    }

    #[test]
    fn dispatch_can_be_cancelled() {
        let dom = RecordingDom::default();
        dom.cancel_next("spfclick");
        assert!(!dom.dispatch_custom_event("spfclick", "{}"));
        assert!(dom.dispatch_custom_event("spfclick", "{}"));
        assert_eq!(dom.dispatched_events().len(), 2);
    }

    #[test]
    fn has_class_checks_whitespace_separated_list() {
        let dom = RecordingDom::with_elements(["main"]);
        dom.set_attribute("main", "class", "spf-link nolink");
        assert!(dom.has_class("main", "spf-link"));
        assert!(!dom.has_class("main", "other"));
    }

    #[test]
    fn location_href_reflects_the_last_navigate_to_call() {
        let dom = RecordingDom::default();
        dom.set_location("https://example.com/a");
        assert_eq!(dom.location_href(), "https://example.com/a");

        dom.navigate_to("https://example.com/b", false);
        assert_eq!(dom.location_href(), "https://example.com/b");
        assert_eq!(
            dom.reloads(),
            vec![("https://example.com/b".to_owned(), false)]
        );
    }

    #[test]
    fn navigate_to_records_the_also_reload_flag() {
        let dom = RecordingDom::default();
        dom.navigate_to("https://example.com/a#frag", true);
        assert_eq!(
            dom.reloads(),
            vec![("https://example.com/a#frag".to_owned(), true)]
        );
    }
}
