//! Idempotent script/style injection keyed by URL hash (spec.md §4.E).
//!
//! Built on [`crate::dom::Dom`] for element mutation and [`crate::pubsub::PubSub`]
//! for "finished loading" fan-out — the same two collaborators the
//! specification names for this component.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;
use std::rc::Rc;

use crate::dom::Dom;
use crate::pubsub::PubSub;

/// Which kind of resource a loader operation concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// A `<script>`.
    Script,
    /// A `<link rel=stylesheet>`.
    Style,
}

impl ResourceType {
    const fn tag(self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Style => "style",
        }
    }
}

/// Computes the deterministic element id `"${type}-${hash(url-without-protocol)}"`.
#[must_use]
pub fn element_id(kind: ResourceType, url: &str) -> String {
    let without_protocol = url.split_once("://").map_or(url, |(_, rest)| rest);
    let mut hasher = DefaultHasher::new();
    without_protocol.hash(&mut hasher);
    format!("{}-{:x}", kind.tag(), hasher.finish())
}

/// What [`ResourceLoader::load`] hands back so a caller can later
/// [`ResourceLoader::ignore`] its callback without touching the element.
#[derive(Debug, Clone)]
pub struct LoadHandle {
    /// The element id the resource was loaded (or is loading) under.
    pub element_id: String,
    /// The subscription index to pass to [`ResourceLoader::ignore`], or
    /// `None` if the callback already fired synchronously because the
    /// resource was already loaded.
    pub subscription: Option<usize>,
}

/// Tracks loaded/loading script and style elements and the name groups used
/// to "switch versions" — remove superseded elements once a same-named
/// replacement finishes loading.
#[derive(Default)]
pub struct ResourceLoader {
    loaded: HashSet<String>,
    names: HashMap<String, Vec<String>>,
    ready: PubSub,
    prefetched: HashSet<String>,
    pending_ready: Vec<Box<dyn FnOnce()>>,
}

impl ResourceLoader {
    /// Creates an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `callback` to run on the next [`ResourceLoader::flush_ready`]
    /// instead of invoking it inline (spec.md §4.E "invoke callback
    /// asynchronously"): used for a resource that is already flagged
    /// loaded, where calling back in immediately would reenter whatever
    /// borrow of this loader led to the call.
    pub(crate) fn defer_ready(&mut self, mut callback: impl FnMut() + 'static) {
        self.pending_ready.push(Box::new(move || callback()));
    }

    /// Takes every callback deferred by [`ResourceLoader::load`]'s
    /// already-loaded branch (or [`ScriptDeps`](crate::scripts::ScriptDeps)'s
    /// equivalent), leaving none pending.
    pub fn take_ready_callbacks(&mut self) -> Vec<Box<dyn FnOnce()>> {
        std::mem::take(&mut self.pending_ready)
    }

    /// Runs every callback deferred since the last flush.
    ///
    /// Safe to call directly only when this loader is owned outright (e.g.
    /// in a test). A loader shared as `Rc<RefCell<ResourceLoader>>` should
    /// go through the free function [`flush_ready`] instead, which releases
    /// the `RefCell` borrow before running the callbacks so one calling
    /// back into the loader doesn't reenter a borrow still held here.
    pub fn flush_ready(&mut self) {
        for callback in self.take_ready_callbacks() {
            callback();
        }
    }

    /// Loads `url` as `kind`, invoking `callback` once it is ready.
    ///
    /// If the element is already flagged loaded, `callback` runs
    /// immediately. If it exists but hasn't finished loading, `callback` is
    /// queued behind the existing one(s). Otherwise a new element is
    /// created and appended to `<head>`.
    pub fn load(
        &mut self,
        dom: &dyn Dom,
        kind: ResourceType,
        url: &str,
        name: Option<&str>,
        mut callback: impl FnMut() + 'static,
    ) -> LoadHandle {
        let id = element_id(kind, url);

        if let Some(name) = name {
            let group = self.names.entry(name.to_owned()).or_default();
            if !group.contains(&id) {
                group.push(id.clone());
            }
        }

        if self.loaded.contains(&id) {
            self.defer_ready(callback);
            return LoadHandle {
                element_id: id,
                subscription: None,
            };
        }

        if !dom.element_exists(&id) {
            match kind {
                ResourceType::Script => dom.append_script(&id, Some(url), None, false),
                ResourceType::Style => dom.append_stylesheet(&id, url),
            }
        }
        self.ready.subscribe(&id, callback);
        let subscription = Some(self.ready.subscriber_count(&id) - 1);
        LoadHandle {
            element_id: id,
            subscription,
        }
    }

    /// Unsubscribes a pending callback returned by [`ResourceLoader::load`]
    /// without removing the element itself.
    pub fn ignore(&mut self, handle: &LoadHandle) {
        if let Some(index) = handle.subscription {
            self.ready.unsubscribe(&handle.element_id, index);
        }
    }

    /// Marks `url` (as `kind`) loaded: flags it, publishes and clears its
    /// ready-callbacks, and removes any elements registered under the same
    /// `name` before it (spec.md §4.E "switch versions"). The caller is
    /// responsible for invoking this once the underlying element's `load`
    /// event fires (a real `onload` in the browser binding, or a test
    /// double's equivalent).
    pub fn mark_loaded(&mut self, dom: &dyn Dom, kind: ResourceType, url: &str) {
        let id = element_id(kind, url);
        self.loaded.insert(id.clone());
        self.ready.publish(&id);
        self.ready.clear(Some(&id));

        for group in self.names.values_mut() {
            let Some(position) = group.iter().position(|existing| existing == &id) else {
                continue;
            };
            for superseded in group.drain(..position) {
                dom.remove_element(&superseded);
                self.loaded.remove(&superseded);
            }
        }
    }

    /// Removes the element for `url` (as `kind`) and clears any pending
    /// callbacks for it. Does not guarantee an in-flight network fetch is
    /// aborted.
    pub fn unload(&mut self, dom: &dyn Dom, kind: ResourceType, url: &str) {
        let id = element_id(kind, url);
        self.unload_id(dom, &id);
    }

    /// Removes every element registered under `name`.
    pub fn unload_by_name(&mut self, dom: &dyn Dom, name: &str) {
        let Some(ids) = self.names.remove(name) else {
            return;
        };
        for id in ids {
            self.unload_id(dom, &id);
        }
    }

    fn unload_id(&mut self, dom: &dyn Dom, id: &str) {
        dom.remove_element(id);
        self.loaded.remove(id);
        self.ready.clear(Some(id));
        for group in self.names.values_mut() {
            group.retain(|existing| existing != id);
        }
    }

    /// Guarantees at most one prefetch request per `(kind, url)` pair.
    /// No-op if already prefetched.
    pub fn prefetch(&mut self, dom: &dyn Dom, kind: ResourceType, url: &str) {
        let id = element_id(kind, url);
        if !self.prefetched.insert(id.clone()) {
            return;
        }
        dom.append_prefetch(&id, url);
    }

    /// Returns whether `url` (as `kind`) is currently flagged loaded.
    #[must_use]
    pub fn is_loaded(&self, kind: ResourceType, url: &str) -> bool {
        self.loaded.contains(&element_id(kind, url))
    }
}

/// Invokes every callback [`ResourceLoader::load`] deferred because its
/// resource was already loaded, releasing `loader`'s borrow before running
/// them.
///
/// Call this as its own statement immediately after any statement that
/// mutably borrowed `loader` — never fold it into the same expression (for
/// instance a `for` loop's head), which keeps the borrow alive for the
/// loop's body and defeats the point of deferring in the first place.
pub fn flush_ready(loader: &Rc<RefCell<ResourceLoader>>) {
    let callbacks = loader.borrow_mut().take_ready_callbacks();
    for callback in callbacks {
        callback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::RecordingDom;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn element_id_ignores_protocol_and_differs_by_kind() {
        let https_id = element_id(ResourceType::Script, "https://example.com/a.js");
        let http_id = element_id(ResourceType::Script, "http://example.com/a.js");
        assert_ne!(https_id, http_id, "scheme participates in the hash unless stripped identically");
        let stripped_id = element_id(ResourceType::Script, "example.com/a.js");
        assert_ne!(https_id, stripped_id, "only the exact '://' prefix is stripped");
        let style_id = element_id(ResourceType::Style, "https://example.com/a.js");
        assert_ne!(https_id, style_id);
    }

    #[test]
    fn load_creates_element_once_and_notifies_on_completion() {
        let dom = RecordingDom::default();
        let mut loader = ResourceLoader::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let log1 = Rc::clone(&log);
        let handle1 = loader.load(&dom, ResourceType::Script, "https://a/x.js", None, move || {
            log1.borrow_mut().push("first")
        });
        let log2 = Rc::clone(&log);
        let _handle2 = loader.load(&dom, ResourceType::Script, "https://a/x.js", None, move || {
            log2.borrow_mut().push("second")
        });
        assert!(log.borrow().is_empty());

        loader.mark_loaded(&dom, ResourceType::Script, "https://a/x.js");
        assert_eq!(*log.borrow(), vec!["first", "second"]);

        let log3 = Rc::clone(&log);
        loader.load(&dom, ResourceType::Script, "https://a/x.js", None, move || {
            log3.borrow_mut().push("third")
        });
        assert_eq!(*log.borrow(), vec!["first", "second"], "already-loaded callbacks are deferred, not inline");
        loader.flush_ready();
        assert_eq!(*log.borrow(), vec!["first", "second", "third"], "flushing runs the deferred callback");
        let _ = handle1;
    }

    #[test]
    fn switching_versions_removes_the_earlier_same_named_element() {
        let dom = RecordingDom::default();
        let mut loader = ResourceLoader::new();
        loader.load(&dom, ResourceType::Style, "https://a/v1.css", Some("theme"), || {});
        loader.mark_loaded(&dom, ResourceType::Style, "https://a/v1.css");
        assert!(dom.element_exists(&element_id(ResourceType::Style, "https://a/v1.css")));

        loader.load(&dom, ResourceType::Style, "https://a/v2.css", Some("theme"), || {});
        loader.mark_loaded(&dom, ResourceType::Style, "https://a/v2.css");

        assert!(!dom.element_exists(&element_id(ResourceType::Style, "https://a/v1.css")));
        assert!(dom.element_exists(&element_id(ResourceType::Style, "https://a/v2.css")));
    }

    #[test]
    fn ignore_prevents_a_queued_callback_from_firing() {
        let dom = RecordingDom::default();
        let mut loader = ResourceLoader::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = Rc::clone(&log);
        let handle = loader.load(&dom, ResourceType::Script, "https://a/x.js", None, move || {
            log_clone.borrow_mut().push("fired")
        });
        loader.ignore(&handle);
        loader.mark_loaded(&dom, ResourceType::Script, "https://a/x.js");
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn unload_by_name_removes_every_member_of_the_group() {
        let dom = RecordingDom::default();
        let mut loader = ResourceLoader::new();
        loader.load(&dom, ResourceType::Script, "https://a/1.js", Some("bundle"), || {});
        loader.load(&dom, ResourceType::Script, "https://a/2.js", Some("bundle"), || {});
        loader.unload_by_name(&dom, "bundle");
        assert!(!dom.element_exists(&element_id(ResourceType::Script, "https://a/1.js")));
        assert!(!dom.element_exists(&element_id(ResourceType::Script, "https://a/2.js")));
    }

    #[test]
    fn prefetch_is_issued_at_most_once_per_url() {
        let dom = RecordingDom::default();
        let mut loader = ResourceLoader::new();
        loader.prefetch(&dom, ResourceType::Style, "https://a/x.css");
        loader.prefetch(&dom, ResourceType::Style, "https://a/x.css");
        assert!(dom.element_exists(&element_id(ResourceType::Style, "https://a/x.css")));
    }
}
