//! Thin wrapper over the browser's `pushState`/`replaceState`/`popstate`
//! API (spec.md §4.G), generalized from the teacher's state-round-trip
//! idiom and grounded on the `next-rs` router's `AnyHistory`/`BrowserHistory`
//! split (`examples/other_examples/...src-router.rs.rs`): a real backend
//! behind a feature flag, a recording double for everything else.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpfError};

/// The state object every history entry carries (spec.md §4.G).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoryState {
    /// The referring URL at the time this entry was pushed.
    #[serde(rename = "spf-referer")]
    pub referer: String,
    /// The URL this entry itself represents, when it differs from the
    /// pushed URL (e.g. after a server-declared `url` correction).
    #[serde(rename = "spf-current", skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    /// The saved scroll position to restore on a `popstate` back to this
    /// entry.
    #[serde(rename = "spf-position", skip_serializing_if = "Option::is_none")]
    pub position: Option<(f64, f64)>,
    /// Set when this entry was reached by a back/forward navigation.
    #[serde(rename = "spf-back", skip_serializing_if = "Option::is_none")]
    pub back: Option<bool>,
}

/// The browser history boundary the navigation controller drives.
pub trait HistoryBackend {
    /// Registers the `popstate` handler. `on_change(url, state)` fires for
    /// every `popstate`, with `state` absent when the browser supplies a
    /// `null` state object (e.g. the initial load's implicit entry).
    fn init(&self, on_change: Box<dyn FnMut(String, Option<HistoryState>)>);

    /// Pushes a new history entry for `url` carrying `state`.
    ///
    /// # Errors
    /// Returns [`SpfError::History`] if state serialization fails (quota
    /// exceeded, cross-domain) or the History API is unsupported.
    fn add(&self, url: &str, state: &HistoryState) -> Result<()>;

    /// Replaces the current history entry's state, and its URL unless
    /// `url` is `None` (spec.md's `skipUrl`).
    ///
    /// # Errors
    /// Returns [`SpfError::History`] under the same conditions as
    /// [`HistoryBackend::add`].
    fn replace(&self, url: Option<&str>, state: &HistoryState) -> Result<()>;
}

/// An in-memory [`HistoryBackend`] double used by tests: records every
/// `add`/`replace` call and lets the test simulate a `popstate` directly.
#[derive(Default)]
pub struct FakeHistory {
    on_change: std::cell::RefCell<Option<Box<dyn FnMut(String, Option<HistoryState>)>>>,
    entries: std::cell::RefCell<Vec<FakeEntry>>,
    fail_next: std::cell::Cell<bool>,
}

/// One recorded call to [`FakeHistory::add`] or [`FakeHistory::replace`].
#[derive(Debug, Clone, PartialEq)]
pub enum FakeEntry {
    /// An [`HistoryBackend::add`] call.
    Add {
        /// The pushed URL.
        url: String,
        /// The pushed state.
        state: HistoryState,
    },
    /// An [`HistoryBackend::replace`] call.
    Replace {
        /// The replaced URL, `None` if the call left the URL untouched.
        url: Option<String>,
        /// The replaced state.
        state: HistoryState,
    },
}

impl FakeHistory {
    /// Creates an empty double.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `add`/`replace` call fail with [`SpfError::History`],
    /// simulating a serialization failure or an unsupported API.
    pub fn fail_next_call(&self) {
        self.fail_next.set(true);
    }

    /// Every call recorded so far, in order.
    #[must_use]
    pub fn entries(&self) -> Vec<FakeEntry> {
        self.entries.borrow().clone()
    }

    /// Invokes the registered `on_change` handler as if the browser fired
    /// `popstate`. No-op if [`HistoryBackend::init`] was never called.
    pub fn simulate_popstate(&self, url: impl Into<String>, state: Option<HistoryState>) {
        if let Some(on_change) = self.on_change.borrow_mut().as_mut() {
            on_change(url.into(), state);
        }
    }
}

impl HistoryBackend for FakeHistory {
    fn init(&self, on_change: Box<dyn FnMut(String, Option<HistoryState>)>) {
        *self.on_change.borrow_mut() = Some(on_change);
    }

    fn add(&self, url: &str, state: &HistoryState) -> Result<()> {
        if self.fail_next.take() {
            return Err(SpfError::History("simulated pushState failure".to_owned()));
        }
        self.entries.borrow_mut().push(FakeEntry::Add {
            url: url.to_owned(),
            state: state.clone(),
        });
        Ok(())
    }

    fn replace(&self, url: Option<&str>, state: &HistoryState) -> Result<()> {
        if self.fail_next.take() {
            return Err(SpfError::History("simulated replaceState failure".to_owned()));
        }
        self.entries.borrow_mut().push(FakeEntry::Replace {
            url: url.map(str::to_owned),
            state: state.clone(),
        });
        Ok(())
    }
}

#[cfg(feature = "wasm")]
pub mod web {
    //! `web_sys`-backed [`super::HistoryBackend`].

    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::JsCast;
    use web_sys::{PopStateEvent, Window};

    use super::{HistoryBackend, HistoryState};
    use crate::error::{Result, SpfError};

    /// A [`HistoryBackend`] implementation over the real
    /// `window.history`/`popstate`.
    pub struct WebHistory {
        window: Window,
    }

    impl WebHistory {
        /// Binds to `web_sys::window()`.
        ///
        /// # Panics
        /// Panics if called outside a browser context.
        #[must_use]
        #[allow(clippy::expect_used, reason = "binding to a non-existent window is unrecoverable")]
        pub fn new() -> Self {
            Self {
                window: web_sys::window().expect("no global `window` exists"),
            }
        }

        fn state_to_js(state: &HistoryState) -> std::result::Result<wasm_bindgen::JsValue, SpfError> {
            let json = serde_json::to_string(state)
                .map_err(|err| SpfError::History(format!("state serialization failed: {err}")))?;
            js_sys::JSON::parse(&json)
                .map_err(|_| SpfError::History("state is not valid JSON".to_owned()))
        }
    }

    impl Default for WebHistory {
        fn default() -> Self {
            Self::new()
        }
    }

    impl HistoryBackend for WebHistory {
        fn init(&self, mut on_change: Box<dyn FnMut(String, Option<HistoryState>)>) {
            let window = self.window.clone();
            let closure = Closure::<dyn FnMut(PopStateEvent)>::new(move |event: PopStateEvent| {
                let url = window
                    .location()
                    .href()
                    .unwrap_or_default();
                let state = js_sys::JSON::stringify(&event.state())
                    .ok()
                    .and_then(|value| value.as_string())
                    .and_then(|json| serde_json::from_str(&json).ok());
                on_change(url, state);
            });
            let _ = self
                .window
                .add_event_listener_with_callback("popstate", closure.as_ref().unchecked_ref());
            // The listener must outlive this call; `init` is only called
            // once per page so leaking it here is the page's lifetime.
            closure.forget();
        }

        fn add(&self, url: &str, state: &HistoryState) -> Result<()> {
            let js_state = Self::state_to_js(state)?;
            let history = self
                .window
                .history()
                .map_err(|_| SpfError::History("History API unsupported".to_owned()))?;
            history
                .push_state_with_url(&js_state, "", Some(url))
                .map_err(|_| SpfError::History(format!("pushState failed for {url}")))
        }

        fn replace(&self, url: Option<&str>, state: &HistoryState) -> Result<()> {
            let js_state = Self::state_to_js(state)?;
            let history = self
                .window
                .history()
                .map_err(|_| SpfError::History("History API unsupported".to_owned()))?;
            history
                .replace_state_with_url(&js_state, "", url)
                .map_err(|_| SpfError::History("replaceState failed".to_owned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_records_the_pushed_url_and_state() {
        let history = FakeHistory::new();
        history
            .add(
                "/a",
                &HistoryState {
                    referer: "/origin".to_owned(),
                    ..HistoryState::default()
                },
            )
            .unwrap();
        assert_eq!(
            history.entries(),
            vec![FakeEntry::Add {
                url: "/a".to_owned(),
                state: HistoryState {
                    referer: "/origin".to_owned(),
                    ..HistoryState::default()
                },
            }]
        );
    }

    #[test]
    fn replace_can_skip_the_url() {
        let history = FakeHistory::new();
        history.replace(None, &HistoryState::default()).unwrap();
        assert_eq!(
            history.entries(),
            vec![FakeEntry::Replace {
                url: None,
                state: HistoryState::default(),
            }]
        );
    }

    #[test]
    fn failure_is_reported_and_does_not_record_an_entry() {
        let history = FakeHistory::new();
        history.fail_next_call();
        assert!(history.add("/a", &HistoryState::default()).is_err());
        assert!(history.entries().is_empty());
    }

    #[test]
    fn popstate_invokes_the_registered_handler() {
        let history = FakeHistory::new();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(None));
        let seen_clone = std::rc::Rc::clone(&seen);
        history.init(Box::new(move |url, state| {
            *seen_clone.borrow_mut() = Some((url, state));
        }));
        history.simulate_popstate(
            "/b",
            Some(HistoryState {
                referer: "/a".to_owned(),
                back: Some(true),
                ..HistoryState::default()
            }),
        );
        let (url, state) = seen.borrow().clone().unwrap();
        assert_eq!(url, "/b");
        assert_eq!(state.unwrap().back, Some(true));
    }
}
