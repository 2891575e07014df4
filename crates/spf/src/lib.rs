//! A client-side "structured page fragment" (SPF) navigation engine.
//!
//! Instead of full-page reloads, this crate intercepts in-app link clicks,
//! fetches a structured JSON description of the destination page, applies
//! that description to the DOM in place, and keeps the browser's history
//! stack in sync so back/forward behave like native navigation.
//!
//! [`NavContext`] is the single entry point an embedder constructs: it owns
//! every process-wide collaborator (the response cache, the task queues,
//! the resource loader, the script dependency graph, the prefetch
//! registry) behind the typed replacement for the original's string-keyed
//! global object (spec.md §9 "Shared mutable state"). Everything else in
//! this crate is a component [`NavContext`] wires together; most embedders
//! only need the `spf::*`-shaped methods on it.

pub mod cache;
pub mod config;
pub mod context;
pub mod dom;
pub mod error;
pub mod events;
pub mod history;
pub mod navigation;
pub mod process;
pub mod pubsub;
pub mod request;
pub mod resources;
pub mod response;
pub mod scripts;
pub mod tasks;
pub mod transport;
pub mod url;

pub use cache::Cache;
pub use config::SpfConfig;
pub use context::NavContext;
pub use error::{Result, SpfError};
pub use events::{EventDetail, NavEvent, ReloadReason};
pub use navigation::{ClickContext, NavigateOptions};
pub use request::RequestCallbacks;
pub use response::{MultipartResponse, Response, SingleResponse};
