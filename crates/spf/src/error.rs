//! Error taxonomy for the SPF navigation engine.
//!
//! Mirrors the classification in the specification's error-handling design:
//! transport, parse, origin, eligibility, cancellation, processing and
//! history errors each get their own variant so callers (and the `onError`
//! callbacks exposed at the public boundary) can match on cause rather than
//! parse a message string.

use thiserror::Error;

/// The result type used throughout the public API.
pub type Result<T> = core::result::Result<T, SpfError>;

/// A classified failure from the navigation pipeline.
#[derive(Debug, Error)]
pub enum SpfError {
    /// The underlying transport (XHR/fetch) failed, was aborted, or timed out.
    #[error("transport error for {url}: {message}")]
    Transport {
        /// The URL that was being requested.
        url: String,
        /// A human-readable description of the transport failure.
        message: String,
    },

    /// A JSON document or multipart stream could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// A navigation target failed a same-origin check.
    #[error("origin denied for {0}")]
    Origin(String),

    /// The navigation counter or lifetime window was exceeded.
    #[error("navigation ineligible: {0}")]
    Eligibility(String),

    /// An `onX` callback or event listener returned `false`, cancelling the
    /// operation in progress.
    #[error("cancelled during {0}")]
    Cancel(&'static str),

    /// An exception was raised while applying a response to the DOM.
    #[error("processing error: {0}")]
    Processing(String),

    /// `pushState`/`replaceState` failed (quota exceeded, cross-domain, or
    /// the History API is unsupported).
    #[error("history error: {0}")]
    History(String),
}

impl SpfError {
    /// Returns the [`crate::events::ReloadReason`] a reload fallback should
    /// use when this error terminates a navigation, if any.
    #[must_use]
    pub const fn reload_reason(&self) -> Option<crate::events::ReloadReason> {
        use crate::events::ReloadReason;
        match self {
            Self::Origin(_) => Some(ReloadReason::ForbiddenOrigin),
            Self::Eligibility(_) => Some(ReloadReason::Ineligible),
            Self::Transport { .. } | Self::Parse(_) | Self::Processing(_) => {
                Some(ReloadReason::UncaughtError)
            }
            Self::Cancel(phase) => match *phase {
                "request" => Some(ReloadReason::RequestCancelled),
                "partprocess" => Some(ReloadReason::PartProcessCancelled),
                "process" => Some(ReloadReason::ProcessCancelled),
                _ => None,
            },
            Self::History(_) => None,
        }
    }
}
