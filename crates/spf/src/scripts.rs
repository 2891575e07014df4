//! Named-script dependency graph and `ready` barriers (spec.md §4.F).
//!
//! Sits on top of [`crate::resources::ResourceLoader`] the way the teacher's
//! `core::dependencies` module layers a cycle-safe dependency graph over a
//! flat resource table (not vendored into this crate's final tree — see
//! DESIGN.md); `require`'s visited-set cycle guard is the same idiom
//! generalized from build-target dependencies to script names.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::dom::Dom;
use crate::resources::{ResourceLoader, ResourceType};

/// Maintains the `name → dependency names` and `name → url` maps and
/// resolves readiness across them.
#[derive(Default)]
pub struct ScriptDeps {
    deps: HashMap<String, Vec<String>>,
    url_map: HashMap<String, String>,
    done: HashSet<String>,
}

impl ScriptDeps {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `deps` (name to dependency-name list) and, if given, `urls`
    /// (name to URL) into the graph.
    pub fn declare(&mut self, deps: HashMap<String, Vec<String>>, urls: Option<HashMap<String, String>>) {
        for (name, mut list) in deps {
            let entry = self.deps.entry(name).or_default();
            entry.append(&mut list);
            entry.sort();
            entry.dedup();
        }
        if let Some(urls) = urls {
            self.url_map.extend(urls);
        }
    }

    /// Loads `url` and associates it with `name`, invoking `callback` once
    /// it finishes (see [`ResourceLoader::load`] for the idempotency
    /// contract).
    pub fn load(
        &mut self,
        dom: &dyn Dom,
        loader: &mut ResourceLoader,
        url: &str,
        name: &str,
        callback: impl FnMut() + 'static,
    ) {
        self.url_map.insert(name.to_owned(), url.to_owned());
        loader.load(dom, ResourceType::Script, url, Some(name), callback);
    }

    /// Marks `name` synthetically ready without an associated URL — used
    /// for names that coordinate other scripts but load nothing themselves.
    pub fn done(&mut self, name: &str) {
        self.done.insert(name.to_owned());
    }

    /// Invokes `callback` once every name in `names` is ready (loaded, or
    /// marked [`ScriptDeps::done`], or — for a name with declared
    /// dependencies but no URL of its own — once all of its dependencies
    /// are ready).
    ///
    /// If any name in `names` is neither declared nor url-mapped nor
    /// `done`, `require_callback` (if given) is invoked with the unknown
    /// names instead, so the caller can lazily [`ScriptDeps::declare`] them
    /// and retry.
    pub fn ready(
        &mut self,
        dom: &dyn Dom,
        loader: &mut ResourceLoader,
        names: &[String],
        callback: impl FnMut() + 'static,
        mut require_callback: Option<impl FnMut(&[String])>,
    ) {
        let unknown: Vec<String> = names
            .iter()
            .filter(|name| {
                !self.url_map.contains_key(name.as_str())
                    && !self.deps.contains_key(name.as_str())
                    && !self.done.contains(name.as_str())
            })
            .cloned()
            .collect();
        if !unknown.is_empty() {
            if let Some(require_callback) = require_callback.as_mut() {
                require_callback(&unknown);
            }
            return;
        }

        let mut visited = HashSet::new();
        let mut leaves = Vec::new();
        for name in names {
            self.collect_leaves(name, &mut visited, &mut leaves);
        }
        self.when_ready(dom, loader, leaves, callback);
    }

    /// Transitively resolves `names`' dependencies (cycle-safe via a
    /// visited set — a cycle just means each name is scheduled at most
    /// once, not an error) and loads every url-mapped leaf, invoking
    /// `callback` once they have all finished.
    pub fn require(
        &mut self,
        dom: &dyn Dom,
        loader: &mut ResourceLoader,
        names: &[String],
        callback: impl FnMut() + 'static,
    ) {
        let mut visited = HashSet::new();
        let mut leaves = Vec::new();
        for name in names {
            self.collect_leaves(name, &mut visited, &mut leaves);
        }
        self.when_ready(dom, loader, leaves, callback);
    }

    /// Unloads `names` and every name that declared one of them as a
    /// dependency, transitively.
    pub fn unrequire(&mut self, dom: &dyn Dom, loader: &mut ResourceLoader, names: &[String]) {
        let mut to_unload: HashSet<String> = names.iter().cloned().collect();
        loop {
            let mut grew = false;
            for (name, deps) in &self.deps {
                if deps.iter().any(|dep| to_unload.contains(dep)) && to_unload.insert(name.clone()) {
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        for name in &to_unload {
            if let Some(url) = self.url_map.get(name) {
                loader.unload(dom, ResourceType::Script, url);
            }
            self.done.remove(name);
        }
    }

    fn collect_leaves(&self, name: &str, visited: &mut HashSet<String>, leaves: &mut Vec<String>) {
        if !visited.insert(name.to_owned()) {
            return;
        }
        if let Some(deps) = self.deps.get(name) {
            for dep in deps {
                self.collect_leaves(dep, visited, leaves);
            }
        }
        if self.url_map.contains_key(name) {
            leaves.push(name.to_owned());
        }
    }

    fn is_ready(&self, loader: &ResourceLoader, name: &str) -> bool {
        if self.done.contains(name) {
            return true;
        }
        match self.url_map.get(name) {
            Some(url) => loader.is_loaded(ResourceType::Script, url),
            None => self
                .deps
                .get(name)
                .is_some_and(|deps| deps.iter().all(|dep| self.is_ready(loader, dep))),
        }
    }

    fn when_ready(
        &mut self,
        dom: &dyn Dom,
        loader: &mut ResourceLoader,
        leaf_names: Vec<String>,
        callback: impl FnMut() + 'static,
    ) {
        let pending: Vec<String> = leaf_names
            .into_iter()
            .filter(|name| !self.is_ready(loader, name))
            .collect();

        if pending.is_empty() {
            // Every leaf is already ready: defer rather than calling back in
            // directly, for the same reentrancy reason as
            // `ResourceLoader::load`'s already-loaded branch — the caller
            // (`NavContext::script_ready`/`require`) is still holding a
            // mutable borrow of `loader` at this point.
            loader.defer_ready(callback);
            return;
        }

        let remaining = Rc::new(Cell::new(pending.len()));
        let callback = Rc::new(RefCell::new(callback));
        for name in pending {
            let Some(url) = self.url_map.get(&name).cloned() else {
                continue;
            };
            let remaining = Rc::clone(&remaining);
            let callback = Rc::clone(&callback);
            loader.load(dom, ResourceType::Script, &url, Some(&name), move || {
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    (callback.borrow_mut())();
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::RecordingDom;

    fn urls(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(name, url)| ((*name).to_owned(), (*url).to_owned())).collect()
    }

    fn deps(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(name, dep_names)| ((*name).to_owned(), dep_names.iter().map(|dep| (*dep).to_owned()).collect()))
            .collect()
    }

    #[test]
    fn ready_fires_immediately_once_all_urls_already_loaded() {
        let dom = RecordingDom::default();
        let mut loader = ResourceLoader::new();
        let mut graph = ScriptDeps::new();
        graph.declare(HashMap::new(), Some(urls(&[("a", "https://x/a.js")])));
        loader.load(&dom, ResourceType::Script, "https://x/a.js", Some("a"), || {});
        loader.mark_loaded(&dom, ResourceType::Script, "https://x/a.js");

        let fired = Rc::new(Cell::new(false));
        let fired_clone = Rc::clone(&fired);
        graph.ready(&dom, &mut loader, &["a".to_owned()], move || fired_clone.set(true), None::<fn(&[String])>);
        assert!(!fired.get(), "an already-ready callback is deferred, not called inline");
        loader.flush_ready();
        assert!(fired.get());
    }

    #[test]
    fn ready_reports_unknown_names_via_require_callback() {
        let dom = RecordingDom::default();
        let mut loader = ResourceLoader::new();
        let mut graph = ScriptDeps::new();
        let unknowns = Rc::new(RefCell::new(Vec::new()));
        let unknowns_clone = Rc::clone(&unknowns);
        graph.ready(
            &dom,
            &mut loader,
            &["mystery".to_owned()],
            || panic!("must not run"),
            Some(move |names: &[String]| unknowns_clone.borrow_mut().extend_from_slice(names)),
        );
        assert_eq!(*unknowns.borrow(), vec!["mystery".to_owned()]);
    }

    #[test]
    fn require_transitively_loads_dependencies_and_waits_for_all() {
        let dom = RecordingDom::default();
        let mut loader = ResourceLoader::new();
        let mut graph = ScriptDeps::new();
        graph.declare(
            deps(&[("widget", &["jquery", "widget-core"])]),
            Some(urls(&[("jquery", "https://x/jquery.js"), ("widget-core", "https://x/widget.js")])),
        );

        let fired = Rc::new(Cell::new(false));
        let fired_clone = Rc::clone(&fired);
        graph.require(&dom, &mut loader, &["widget".to_owned()], move || fired_clone.set(true));
        assert!(!fired.get(), "must wait for both leaves");

        loader.mark_loaded(&dom, ResourceType::Script, "https://x/jquery.js");
        assert!(!fired.get());
        loader.mark_loaded(&dom, ResourceType::Script, "https://x/widget.js");
        assert!(fired.get());
    }

    #[test]
    fn require_tolerates_a_dependency_cycle() {
        let dom = RecordingDom::default();
        let mut loader = ResourceLoader::new();
        let mut graph = ScriptDeps::new();
        graph.declare(
            deps(&[("a", &["b"]), ("b", &["a"])]),
            Some(urls(&[("a", "https://x/a.js"), ("b", "https://x/b.js")])),
        );

        let fired = Rc::new(Cell::new(false));
        let fired_clone = Rc::clone(&fired);
        graph.require(&dom, &mut loader, &["a".to_owned()], move || fired_clone.set(true));
        loader.mark_loaded(&dom, ResourceType::Script, "https://x/a.js");
        loader.mark_loaded(&dom, ResourceType::Script, "https://x/b.js");
        assert!(fired.get());
    }

    #[test]
    fn unrequire_unloads_the_name_and_its_dependents() {
        let dom = RecordingDom::default();
        let mut loader = ResourceLoader::new();
        let mut graph = ScriptDeps::new();
        graph.declare(
            deps(&[("widget", &["jquery"])]),
            Some(urls(&[("jquery", "https://x/jquery.js"), ("widget", "https://x/widget.js")])),
        );
        loader.load(&dom, ResourceType::Script, "https://x/jquery.js", Some("jquery"), || {});
        loader.mark_loaded(&dom, ResourceType::Script, "https://x/jquery.js");

        graph.unrequire(&dom, &mut loader, &["jquery".to_owned()]);
        assert!(!loader.is_loaded(ResourceType::Script, "https://x/jquery.js"));
    }
}
