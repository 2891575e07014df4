//! URL utilities (spec.md §4.A): absolute/origin/path normalization,
//! identifier append/strip, and hash partitioning.
//!
//! Wraps the `url` crate the same way `page_handler::url::stream_url` does
//! rather than hand-rolling parsing — only the navigation-specific
//! convenience operations live here.

use url::Url;

/// Resolves `href` against `base`, returning the absolute URL as a string.
/// Returns `None` if either string fails to parse.
#[must_use]
pub fn absolute(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    let resolved = base.join(href).ok()?;
    Some(resolved.to_string())
}

/// Returns the scheme+host+port "origin" portion of `url`, e.g.
/// `https://example.com:8080` for `https://example.com:8080/a/b?c#d`.
#[must_use]
pub fn origin(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    Some(parsed.origin().ascii_serialization())
}

/// Returns the origin-stripped path portion of `url`, keeping the query
/// string but dropping the fragment, e.g. `/a/b?c` for
/// `https://example.com/a/b?c#d`.
#[must_use]
pub fn path(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    parsed.set_fragment(None);
    Some(format!(
        "{}{}",
        parsed.path(),
        parsed.query().map(|query| format!("?{query}")).unwrap_or_default()
    ))
}

/// Returns `true` if `left` and `right` share the same origin.
#[must_use]
pub fn same_origin(left: &str, right: &str) -> bool {
    matches!((origin(left), origin(right)), (Some(left), Some(right)) if left == right)
}

/// Splits `url` into its `(without_hash, hash_including_pound)` halves. The
/// second element is `None` if there is no `#` fragment.
#[must_use]
pub fn partition_hash(url: &str) -> (&str, Option<&str>) {
    match url.find('#') {
        Some(index) => (&url[..index], Some(&url[index..])),
        None => (url, None),
    }
}

/// Returns `url` with its current hash fragment replaced by `hash` (which
/// should already include the leading `#`, or be empty to strip it).
#[must_use]
pub fn with_hash(url: &str, hash: Option<&str>) -> String {
    let (base, _) = partition_hash(url);
    match hash {
        Some(hash) if !hash.is_empty() => format!("{base}{hash}"),
        _ => base.to_owned(),
    }
}

/// Appends the configured request identifier to `url`, substituting
/// `__type__` for `request_type` (spec.md §6 `url-identifier`).
///
/// If `pattern` is `None`, `url` is returned unchanged.
#[must_use]
pub fn append_identifier(url: &str, pattern: Option<&str>, request_type: &str) -> String {
    let Some(pattern) = pattern else {
        return url.to_owned();
    };
    let suffix = pattern.replace("__type__", request_type);
    if url.contains('?') {
        format!("{url}&{}", suffix.trim_start_matches('?'))
    } else {
        format!("{url}{suffix}")
    }
}

/// Removes a previously-appended identifier query parameter (matched by
/// `param_name`) from `url`, returning the stripped URL. Used to compute
/// the base cache key, which must be identifier-independent.
#[must_use]
pub fn strip_identifier(url: &str, param_name: &str) -> String {
    let Some(query_start) = url.find('?') else {
        return url.to_owned();
    };
    let (base, query) = url.split_at(query_start);
    let query = &query[1..];
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            pair.split('=')
                .next()
                .is_none_or(|key| key != param_name)
        })
        .collect();
    if kept.is_empty() {
        base.to_owned()
    } else {
        format!("{base}?{}", kept.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_resolves_relative_paths() {
        assert_eq!(
            absolute("https://example.com/a/b", "c").as_deref(),
            Some("https://example.com/a/c")
        );
    }

    #[test]
    fn origin_ignores_path_and_query() {
        assert_eq!(
            origin("https://example.com:8080/a/b?c#d").as_deref(),
            Some("https://example.com:8080")
        );
    }

    #[test]
    fn path_keeps_query_drops_fragment() {
        assert_eq!(
            path("https://example.com/a/b?c=1#frag").as_deref(),
            Some("/a/b?c=1")
        );
    }

    #[test]
    fn same_origin_compares_scheme_host_port() {
        assert!(same_origin(
            "https://example.com/a",
            "https://example.com/b"
        ));
        assert!(!same_origin("https://example.com/a", "http://example.com/a"));
        assert!(!same_origin(
            "https://example.com/a",
            "https://other.com/a"
        ));
    }

    #[test]
    fn partition_hash_splits_fragment() {
        assert_eq!(
            partition_hash("https://example.com/a#frag"),
            ("https://example.com/a", Some("#frag"))
        );
        assert_eq!(
            partition_hash("https://example.com/a"),
            ("https://example.com/a", None)
        );
    }

    #[test]
    fn with_hash_replaces_existing_fragment() {
        assert_eq!(
            with_hash("https://example.com/a#old", Some("#new")),
            "https://example.com/a#new"
        );
        assert_eq!(
            with_hash("https://example.com/a#old", None),
            "https://example.com/a"
        );
    }

    #[test]
    fn append_identifier_substitutes_type_and_joins_query() {
        assert_eq!(
            append_identifier("/a", Some("?spf=__type__"), "navigate"),
            "/a?spf=navigate"
        );
        assert_eq!(
            append_identifier("/a?x=1", Some("?spf=__type__"), "navigate"),
            "/a?x=1&spf=navigate"
        );
        assert_eq!(append_identifier("/a", None, "navigate"), "/a");
    }

    #[test]
    fn strip_identifier_removes_only_the_named_param() {
        assert_eq!(strip_identifier("/a?spf=navigate&x=1", "spf"), "/a?x=1");
        assert_eq!(strip_identifier("/a?spf=navigate", "spf"), "/a");
        assert_eq!(strip_identifier("/a", "spf"), "/a");
    }
}
