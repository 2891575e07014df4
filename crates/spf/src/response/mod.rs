//! The SPF response data model (spec.md §3) and its wire-format handling
//! (spec.md §4.H): JSON/multipart parsing in [`parser`], HTML extraction in
//! [`extract`].

pub mod extract;
pub mod parser;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One server-produced page update — one "part" of a multipart response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SingleResponse {
    /// New document title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Canonical URL the server considers current.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// HTML conceptually inserted into the head region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
    /// HTML conceptually inserted into the footer region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foot: Option<String>,
    /// Mapping from element id to replacement inner-HTML.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<HashMap<String, String>>,
    /// Mapping from element id to attribute-name/value pairs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attr: Option<HashMap<String, HashMap<String, String>>>,
    /// URL the client should navigate to instead; terminates processing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    /// Forces a full-page reload.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reload: Option<bool>,
    /// Scope under which this response may be cached.
    #[serde(skip_serializing_if = "Option::is_none", rename = "cacheType")]
    pub cache_type: Option<CacheType>,
    /// Server-assigned cache key.
    #[serde(skip_serializing_if = "Option::is_none", rename = "cacheKey")]
    pub cache_key: Option<String>,
    /// Identifier used by animated transitions to pick from/to classes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Timestamps and flags filled in by the client during request handling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
}

/// The cache scope a response declares via `cacheType` (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    /// Cacheable regardless of the referring page.
    Global,
    /// Cacheable only when referred from the same path.
    Path,
    /// Cacheable only when referred from the same full URL.
    Url,
}

/// `{ type: "multipart", parts: SingleResponse[], timing?, cacheKey?, cacheType? }`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MultipartResponse {
    /// The ordered parts making up this response.
    pub parts: Vec<SingleResponse>,
    /// Timing filled in by the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
    /// Server-assigned cache key, if any part carried one.
    #[serde(skip_serializing_if = "Option::is_none", rename = "cacheKey")]
    pub cache_key: Option<String>,
    /// Cache scope, if any part carried one.
    #[serde(skip_serializing_if = "Option::is_none", rename = "cacheType")]
    pub cache_type: Option<CacheType>,
}

/// Either flavor of response, as stored in the cache and passed to
/// [`crate::process`].
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// A single-part response.
    Single(SingleResponse),
    /// A multi-part response.
    Multipart(MultipartResponse),
}

impl Response {
    /// Returns the parts making up this response, as a slice (a `Single`
    /// response is treated as a one-element sequence).
    #[must_use]
    pub fn parts(&self) -> Vec<&SingleResponse> {
        match self {
            Self::Single(single) => vec![single],
            Self::Multipart(multi) => multi.parts.iter().collect(),
        }
    }

    /// The `cacheType` carried by this response, if any.
    #[must_use]
    pub fn cache_type(&self) -> Option<CacheType> {
        match self {
            Self::Single(single) => single.cache_type,
            Self::Multipart(multi) => multi.cache_type,
        }
    }

    /// The `cacheKey` carried by this response, if any.
    #[must_use]
    pub fn cache_key(&self) -> Option<&str> {
        match self {
            Self::Single(single) => single.cache_key.as_deref(),
            Self::Multipart(multi) => multi.cache_key.as_deref(),
        }
    }

    /// Stamps `timing` onto every part (single response, or every part of a
    /// multipart response) that doesn't already carry one of its own.
    pub fn stamp_timing(&mut self, timing: &Timing) {
        match self {
            Self::Single(single) => single.timing.get_or_insert_with(|| timing.clone()),
            Self::Multipart(multi) => multi.timing.get_or_insert_with(|| timing.clone()),
        };
    }
}

/// Timestamps and flags the client fills in while handling a request
/// (spec.md §3 `timing`, §4.J "Timing").
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Timing {
    /// `true` if this response was served from the cache.
    #[serde(rename = "spfCached", skip_serializing_if = "Option::is_none")]
    pub spf_cached: Option<bool>,
    /// `true` if the cache entry that served this response was a prefetch.
    #[serde(rename = "spfPrefetched", skip_serializing_if = "Option::is_none")]
    pub spf_prefetched: Option<bool>,
    /// The absolute timestamp (ms) the navigation started at.
    #[serde(rename = "navigationStart", skip_serializing_if = "Option::is_none")]
    pub navigation_start: Option<f64>,
    /// Any other server- or client-supplied named timing value.
    #[serde(flatten)]
    pub extra: HashMap<String, TimingValue>,
}

/// A single entry in the open-ended timing map: either a timestamp or a
/// boolean flag (spec.md §3: "mapping from name to number ... and
/// booleans").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimingValue {
    /// A millisecond timestamp or duration.
    Number(f64),
    /// A boolean flag.
    Bool(bool),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parts_flattens_single_and_multipart() {
        let single = Response::Single(SingleResponse {
            title: Some("A".to_owned()),
            ..SingleResponse::default()
        });
        assert_eq!(single.parts().len(), 1);

        let multi = Response::Multipart(MultipartResponse {
            parts: vec![SingleResponse::default(), SingleResponse::default()],
            ..MultipartResponse::default()
        });
        assert_eq!(multi.parts().len(), 2);
    }

    #[test]
    fn stamp_timing_does_not_overwrite_existing() {
        let mut response = Response::Single(SingleResponse {
            timing: Some(Timing {
                spf_cached: Some(true),
                ..Timing::default()
            }),
            ..SingleResponse::default()
        });
        response.stamp_timing(&Timing {
            spf_cached: Some(false),
            ..Timing::default()
        });
        let Response::Single(single) = response else {
            unreachable!()
        };
        assert_eq!(single.timing.unwrap().spf_cached, Some(true));
    }
}
