//! Extraction of `<script>`, `<style>`, and `<link>` elements out of a
//! fragment of response HTML (spec.md §4.H "Extraction", §9 Design Notes:
//! "a conservative tokenizer ... ignore elements inside comments and
//! CDATA" rather than a full HTML5 parse).
//!
//! This is deliberately not a DOM parser: it scans for the handful of tags
//! `spf::resources` and `spf::scripts` care about and leaves everything
//! else in the returned `html` untouched, byte-for-byte.

/// A `<script>` pulled out of a fragment, either inline or external.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractedScript {
    /// The `src` attribute, if this is an external script.
    pub src: Option<String>,
    /// The `name` attribute, used as the dependency-graph key.
    pub name: Option<String>,
    /// Inline script body; `None` for an external script.
    pub text: Option<String>,
    /// Whether the script was marked `async`.
    pub is_async: bool,
}

/// An inline `<style>` pulled out of a fragment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractedStyle {
    /// The `name` attribute, used as the dependency-graph key.
    pub name: Option<String>,
    /// The stylesheet body.
    pub text: String,
}

/// A `<link rel="stylesheet">` pulled out of a fragment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractedLink {
    /// The `href` attribute.
    pub href: String,
    /// The `name` attribute, used as the dependency-graph key.
    pub name: Option<String>,
}

/// The result of scanning a fragment: the extracted elements, plus the
/// remaining HTML with those elements removed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Extracted {
    /// `html` with every recognized `<script>`/`<style>`/`<link>` removed.
    pub html: String,
    /// Extracted scripts, in document order.
    pub scripts: Vec<ExtractedScript>,
    /// Extracted inline styles, in document order.
    pub styles: Vec<ExtractedStyle>,
    /// Extracted stylesheet links, in document order.
    pub links: Vec<ExtractedLink>,
    /// `href` values from `<link rel="spf-preconnect">` hints.
    pub preconnects: Vec<String>,
}

const ALLOWED_SCRIPT_TYPES: [&str; 4] = ["text/javascript", "application/javascript", "module", ""];
const ALLOWED_STYLE_TYPES: [&str; 2] = ["text/css", ""];

/// Scans `html` and pulls out every recognized element, per spec.md §4.H.
///
/// Tags inside HTML comments (`<!-- -->`) or CDATA sections
/// (`<![CDATA[ ]]>`) are left untouched — they are copied through to the
/// output verbatim and never matched as real elements.
#[must_use]
pub fn extract(html: &str) -> Extracted {
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len());
    let mut scripts = Vec::new();
    let mut styles = Vec::new();
    let mut links = Vec::new();
    let mut preconnects = Vec::new();

    let mut cursor = 0usize;
    while cursor < html.len() {
        let Some(rel) = html[cursor..].find('<') else {
            out.push_str(&html[cursor..]);
            break;
        };
        let lt = cursor + rel;
        out.push_str(&html[cursor..lt]);

        if lower[lt..].starts_with("<!--") {
            let close = lower[lt..]
                .find("-->")
                .map_or(html.len(), |pos| lt + pos + 3);
            out.push_str(&html[lt..close]);
            cursor = close;
            continue;
        }
        if lower[lt..].starts_with("<![cdata[") {
            let close = lower[lt..]
                .find("]]>")
                .map_or(html.len(), |pos| lt + pos + 3);
            out.push_str(&html[lt..close]);
            cursor = close;
            continue;
        }

        if let Some(after_name) = starts_tag(&lower, lt, "script") {
            let Some(tag_close) = tag_end(html, after_name) else {
                out.push_str(&html[lt..]);
                break;
            };
            let open_tag = &html[lt..=tag_close];
            let Some((close_start, close_end)) = find_closing(&lower, tag_close + 1, html, "script")
            else {
                out.push_str(&html[lt..]);
                break;
            };
            if mime_allowed(open_tag, &ALLOWED_SCRIPT_TYPES) {
                let src = attr_value(open_tag, "src");
                let name = attr_value(open_tag, "name");
                let is_async = has_flag(open_tag, "async");
                let text = if src.is_none() {
                    Some(html[tag_close + 1..close_start].to_owned())
                } else {
                    None
                };
                scripts.push(ExtractedScript {
                    src,
                    name,
                    text,
                    is_async,
                });
            } else {
                out.push_str(&html[lt..close_end]);
            }
            cursor = close_end;
            continue;
        }

        if let Some(after_name) = starts_tag(&lower, lt, "style") {
            let Some(tag_close) = tag_end(html, after_name) else {
                out.push_str(&html[lt..]);
                break;
            };
            let open_tag = &html[lt..=tag_close];
            let Some((close_start, close_end)) = find_closing(&lower, tag_close + 1, html, "style")
            else {
                out.push_str(&html[lt..]);
                break;
            };
            if mime_allowed(open_tag, &ALLOWED_STYLE_TYPES) {
                styles.push(ExtractedStyle {
                    name: attr_value(open_tag, "name"),
                    text: html[tag_close + 1..close_start].to_owned(),
                });
            } else {
                out.push_str(&html[lt..close_end]);
            }
            cursor = close_end;
            continue;
        }

        if let Some(after_name) = starts_tag(&lower, lt, "link") {
            let Some(tag_close) = tag_end(html, after_name) else {
                out.push_str(&html[lt..]);
                break;
            };
            let open_tag = &html[lt..=tag_close];
            let rel = attr_value(open_tag, "rel").unwrap_or_default();
            match (rel.to_ascii_lowercase().as_str(), attr_value(open_tag, "href")) {
                ("stylesheet", Some(href)) => links.push(ExtractedLink {
                    href,
                    name: attr_value(open_tag, "name"),
                }),
                ("spf-preconnect", Some(href)) => preconnects.push(href),
                _ => out.push_str(open_tag),
            }
            cursor = tag_close + 1;
            continue;
        }

        out.push('<');
        cursor = lt + 1;
    }

    Extracted {
        html: out,
        scripts,
        styles,
        links,
        preconnects,
    }
}

/// If `lower[lt..]` opens tag `name` (immediately followed by whitespace,
/// `>`, `/`, or end of input), returns the index just past the tag name.
fn starts_tag(lower: &str, lt: usize, name: &str) -> Option<usize> {
    let rest = lower.get(lt + 1..)?;
    let rest = rest.strip_prefix(name)?;
    match rest.as_bytes().first() {
        None | Some(b'>' | b'/') => Some(lt + 1 + name.len()),
        Some(byte) if byte.is_ascii_whitespace() => Some(lt + 1 + name.len()),
        _ => None,
    }
}

/// Finds the `>` that closes the tag whose name ends at `from`, honoring
/// quoted attribute values that may themselves contain `>`.
fn tag_end(html: &str, from: usize) -> Option<usize> {
    let bytes = html.as_bytes();
    let mut quote: Option<u8> = None;
    let mut index = from;
    while index < bytes.len() {
        let byte = bytes[index];
        match quote {
            Some(open) if byte == open => quote = None,
            Some(_) => {}
            None if byte == b'"' || byte == b'\'' => quote = Some(byte),
            None if byte == b'>' => return Some(index),
            None => {}
        }
        index += 1;
    }
    None
}

/// Finds `</name` at or after `from` in `lower`, returning
/// `(start_of_close_tag, index_past_its_closing '>')`.
fn find_closing(lower: &str, from: usize, html: &str, name: &str) -> Option<(usize, usize)> {
    let needle = format!("</{name}");
    let relative = lower.get(from..)?.find(&needle)?;
    let start = from + relative;
    let end = tag_end(html, start)? + 1;
    Some((start, end))
}

/// Extracts `name="value"` / `name='value'` / `name=value` from a tag's
/// source text, matching only a whole attribute name (not a substring of a
/// longer one).
fn attr_value(tag: &str, name: &str) -> Option<String> {
    let lower = tag.to_ascii_lowercase();
    let needle = format!("{name}=");
    let mut search_from = 0;
    while let Some(relative) = lower.get(search_from..)?.find(&needle) {
        let pos = search_from + relative;
        let boundary_ok = pos == 0
            || !lower.as_bytes()[pos - 1].is_ascii_alphanumeric() && lower.as_bytes()[pos - 1] != b'-';
        if boundary_ok {
            let rest = &tag[pos + needle.len()..];
            let value = if let Some(stripped) = rest.strip_prefix('"') {
                stripped.split('"').next().unwrap_or_default()
            } else if let Some(stripped) = rest.strip_prefix('\'') {
                stripped.split('\'').next().unwrap_or_default()
            } else {
                rest.split(|c: char| c.is_whitespace() || c == '>')
                    .next()
                    .unwrap_or_default()
            };
            return Some(value.to_owned());
        }
        search_from = pos + needle.len();
    }
    None
}

/// Whether boolean attribute `name` (e.g. `async`) is present on the tag.
fn has_flag(tag: &str, name: &str) -> bool {
    let lower = tag.to_ascii_lowercase();
    let mut search_from = 0;
    while let Some(relative) = lower.get(search_from..).and_then(|slice| slice.find(name)) {
        let pos = search_from + relative;
        let before_ok = pos == 0 || !lower.as_bytes()[pos - 1].is_ascii_alphanumeric();
        let after = pos + name.len();
        let after_ok = lower.as_bytes().get(after).is_none_or(|byte| {
            matches!(byte, b'=' | b'>' | b'/') || byte.is_ascii_whitespace()
        });
        if before_ok && after_ok {
            return true;
        }
        search_from = after;
    }
    false
}

fn mime_allowed(tag: &str, allowed: &[&str]) -> bool {
    match attr_value(tag, "type") {
        Some(found) => allowed.contains(&found.to_ascii_lowercase().as_str()),
        None => allowed.contains(&""),
    }
}
