//! DOM custom event dispatch and the reload-reason taxonomy.
//!
//! The navigation controller (`crate::navigation`) dispatches a fixed set of
//! custom events on `document` at well-defined points in a navigation's
//! lifecycle (spec.md §6 "DOM events"). This module owns the event names,
//! the `detail` payload shape, and the dispatch helper that goes through
//! [`crate::dom::Dom`] so it stays testable without a real `document`.

use std::collections::HashMap;

use serde::Serialize;

use crate::response::SingleResponse;

/// The reason a full-page reload fallback was triggered, serialized as the
/// decimal code the original wire protocol stamps into the
/// `reload-identifier` query parameter (spec.md §4.K "Reload reasons").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    /// The navigation failed an eligibility gate (counter or lifetime).
    Ineligible,
    /// The in-flight request was cancelled.
    RequestCancelled,
    /// The part-process phase was cancelled.
    PartProcessCancelled,
    /// The process phase was cancelled.
    ProcessCancelled,
    /// The response itself requested a reload (`reload: true`).
    ReloadResponse,
    /// The target URL failed a same-origin check.
    ForbiddenOrigin,
    /// An error escaped the pipeline uncaught.
    UncaughtError,
}

impl ReloadReason {
    /// The numeric code stamped into the reload-identifier query parameter.
    #[must_use]
    pub const fn as_code(self) -> u8 {
        match self {
            Self::Ineligible => 1,
            Self::RequestCancelled => 2,
            Self::PartProcessCancelled => 3,
            Self::ProcessCancelled => 4,
            Self::ReloadResponse => 5,
            Self::ForbiddenOrigin => 9,
            Self::UncaughtError => 10,
        }
    }
}

impl core::fmt::Display for ReloadReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_code())
    }
}

/// The fixed set of custom DOM events the navigation pipeline dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavEvent {
    /// Dispatched when a pipeline error occurs.
    Error,
    /// Dispatched immediately before a full-page reload.
    Reload,
    /// Dispatched when an eligible link click is intercepted.
    Click,
    /// Dispatched when a `popstate`-driven navigation is routed.
    History,
    /// Dispatched when a navigation request is sent.
    Request,
    /// Dispatched once per processed multipart part.
    PartProcess,
    /// Dispatched once a processed part finishes applying to the DOM.
    PartDone,
    /// Dispatched when a (non-multipart) response finishes processing.
    Process,
    /// Dispatched when a navigation completes successfully.
    Done,
}

impl NavEvent {
    /// The event name dispatched on `document`, matching spec.md §6.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Error => "spferror",
            Self::Reload => "spfreload",
            Self::Click => "spfclick",
            Self::History => "spfhistory",
            Self::Request => "spfrequest",
            Self::PartProcess => "spfpartprocess",
            Self::PartDone => "spfpartdone",
            Self::Process => "spfprocess",
            Self::Done => "spfdone",
        }
    }
}

/// A JSON-serializable `detail` payload carried by a dispatched event.
///
/// Fields are optional because each event only populates the subset the
/// spec documents for it (`url` and `referer` are near-universal; `part`,
/// `reason`, `err`, `name` are event-specific).
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventDetail {
    /// The URL associated with the navigation.
    pub url: Option<String>,
    /// The referring URL, when known.
    pub referer: Option<String>,
    /// The previously-current URL, when known.
    pub previous: Option<String>,
    /// The index of the multipart part this event concerns, if any.
    pub part: Option<usize>,
    /// The response applied, for `spfprocess`/`spfdone`/`spfpartprocess`/`spfpartdone`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<SingleResponse>,
    /// A short error message, for `spferror`.
    pub err: Option<String>,
    /// The target element id a resource-loader event concerns.
    pub target: Option<String>,
    /// The resource `name` a resource-loader event concerns.
    pub name: Option<String>,
    /// The numeric reload reason code, for `spfreload`.
    pub reason: Option<u8>,
    /// Extra named values some call sites attach (kept generic so this
    /// struct doesn't need to grow a field per caller).
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl EventDetail {
    /// A detail carrying just a URL, the common case for most dispatches.
    #[must_use]
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }
}

/// Dispatches a [`NavEvent`] on the document via the supplied [`crate::dom::Dom`].
///
/// Returns `false` if a listener cancelled the event (called
/// `preventDefault`), matching the "callback returning `false` cancels"
/// convention from spec.md §9 Design Notes.
pub fn dispatch(dom: &dyn crate::dom::Dom, event: NavEvent, detail: &EventDetail) -> bool {
    let payload = serde_json::to_string(detail).unwrap_or_default();
    dom.dispatch_custom_event(event.name(), &payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_reason_codes_match_spec() {
        assert_eq!(ReloadReason::Ineligible.as_code(), 1);
        assert_eq!(ReloadReason::RequestCancelled.as_code(), 2);
        assert_eq!(ReloadReason::PartProcessCancelled.as_code(), 3);
        assert_eq!(ReloadReason::ProcessCancelled.as_code(), 4);
        assert_eq!(ReloadReason::ReloadResponse.as_code(), 5);
        assert_eq!(ReloadReason::ForbiddenOrigin.as_code(), 9);
        assert_eq!(ReloadReason::UncaughtError.as_code(), 10);
    }

    #[test]
    fn event_names_match_spec() {
        assert_eq!(NavEvent::Error.name(), "spferror");
        assert_eq!(NavEvent::Done.name(), "spfdone");
        assert_eq!(NavEvent::PartProcess.name(), "spfpartprocess");
    }

    #[test]
    fn detail_omits_empty_extra() {
        let detail = EventDetail::for_url("/a");
        let json = serde_json::to_string(&detail).unwrap();
        assert!(!json.contains("extra"));
    }
}
