//! JSON and multipart-stream parsing (spec.md §4.H "Parsing a JSON
//! payload").
//!
//! The multipart parser is implemented exactly as spec.md §9 Design Notes
//! prescribes: "a pure function `feed(state, bytes) -> (state', parts)`"
//! plus a `finish(state) -> parts | error`, decoupled from any transport so
//! it is trivially unit-testable and reusable for both the streaming XHR
//! path (`crate::request`) and the cache-replay path.

use crate::error::SpfError;
use crate::response::{MultipartResponse, Response, SingleResponse};

const BEGIN: &str = "[\r\n";
const DELIMITER: &str = ",\r\n";
const END: &str = "]\r\n";

/// The result of a single-shot (non-streaming) JSON parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPayload {
    /// The parts contained in the payload (a single object parses to a
    /// one-element vector).
    pub parts: Vec<SingleResponse>,
    /// Unconsumed trailing text, always empty for single-shot parsing —
    /// present so single-shot and streaming parses share the same result
    /// shape, per spec.md §4.H.
    pub extra: String,
}

/// Parses a complete (non-streamed) JSON payload: `JSON.parse(text)`; an
/// array is the parts list, anything else is a single part.
///
/// # Errors
/// Returns [`SpfError::Parse`] if `text` is not valid JSON, or is valid
/// JSON but not an object or array of objects.
pub fn parse(text: &str) -> Result<ParsedPayload, SpfError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|err| SpfError::Parse(err.to_string()))?;
    let parts = match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(|err| SpfError::Parse(err.to_string())))
            .collect::<Result<Vec<_>, _>>()?,
        other => vec![serde_json::from_value(other).map_err(|err| SpfError::Parse(err.to_string()))?],
    };
    Ok(ParsedPayload {
        parts,
        extra: String::new(),
    })
}

/// Assembles a [`Response`] from a list of parts the way the request
/// engine does at the end of a stream: two or more parts become a
/// [`Response::Multipart`] (preserving a `cacheType`/`cacheKey` carried by
/// any part), otherwise a single [`Response::Single`].
#[must_use]
pub fn assemble(mut parts: Vec<SingleResponse>) -> Response {
    if parts.len() >= 2 {
        let cache_type = parts.iter().find_map(|part| part.cache_type);
        let cache_key = parts.iter().find_map(|part| part.cache_key.clone());
        Response::Multipart(MultipartResponse {
            parts,
            timing: None,
            cache_key,
            cache_type,
        })
    } else {
        Response::Single(parts.pop().unwrap_or_default())
    }
}

/// Incremental multipart-stream parser state (spec.md §4.H "Multipart
/// streaming").
///
/// Feed it chunks as they arrive over the wire with [`MultipartParser::feed`];
/// once the stream ends, call [`MultipartParser::finish`] to parse the
/// trailing part.
#[derive(Debug, Default)]
pub struct MultipartParser {
    buffer: String,
    began: bool,
}

impl MultipartParser {
    /// Creates a fresh parser with no buffered state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The unconsumed text carried between calls (what spec.md §4.H calls
    /// `extra`): prepend it to the next chunk, or pass it to
    /// [`MultipartParser::finish`] once the stream is done.
    #[must_use]
    pub fn extra(&self) -> &str {
        &self.buffer
    }

    /// Feeds `chunk` into the parser, returning any newly-completed parts.
    ///
    /// # Errors
    /// Returns [`SpfError::Parse`] if a framed part's JSON body fails to
    /// parse. The parser's internal buffer is left as-is on error so the
    /// caller can decide whether to abort or retry.
    pub fn feed(&mut self, chunk: &str) -> Result<Vec<SingleResponse>, SpfError> {
        self.buffer.push_str(chunk);
        let mut produced = Vec::new();

        if !self.began {
            let Some(pos) = self.buffer.find(BEGIN) else {
                return Ok(produced);
            };
            self.buffer = self.buffer[pos + BEGIN.len()..].to_owned();
            self.began = true;
        }

        while let Some(pos) = self.buffer.find(DELIMITER) {
            let part_text = self.buffer[..pos].to_owned();
            let part: SingleResponse = serde_json::from_str(part_text.trim())
                .map_err(|err| SpfError::Parse(err.to_string()))?;
            produced.push(part);
            self.buffer = self.buffer[pos + DELIMITER.len()..].to_owned();
        }

        Ok(produced)
    }

    /// Consumes the parser, parsing the trailing part after the stream has
    /// ended.
    ///
    /// When `last_ditch` is `true`, a `"\r\n"` is appended to the buffered
    /// tail before parsing, letting a final part whose closing bracket
    /// arrived without a trailing CRLF still succeed (spec.md §4.H
    /// `lastDitch`). If the buffered tail is empty, this returns no parts
    /// rather than an error — a clean stream end with nothing left over is
    /// not a failure.
    ///
    /// # Errors
    /// Returns [`SpfError::Parse`] if the trailing text is non-empty but
    /// does not parse as a JSON object.
    pub fn finish(mut self, last_ditch: bool) -> Result<Vec<SingleResponse>, SpfError> {
        if last_ditch {
            self.buffer.push_str("\r\n");
        }
        let tail = match self.buffer.find(END) {
            Some(pos) => self.buffer[..pos].to_owned(),
            None => self.buffer,
        };
        let trimmed = tail.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        let part: SingleResponse =
            serde_json::from_str(trimmed).map_err(|err| SpfError::Parse(err.to_string()))?;
        Ok(vec![part])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title_response(title: &str) -> SingleResponse {
        SingleResponse {
            title: Some(title.to_owned()),
            ..SingleResponse::default()
        }
    }

    #[test]
    fn single_shot_parses_object_as_one_part() {
        let parsed = parse(r#"{"title":"A"}"#).unwrap();
        assert_eq!(parsed.parts, vec![title_response("A")]);
    }

    #[test]
    fn single_shot_parses_array_as_parts_list() {
        let parsed = parse(r#"[{"title":"A"},{"title":"B"}]"#).unwrap();
        assert_eq!(parsed.parts, vec![title_response("A"), title_response("B")]);
    }

    #[test]
    fn single_shot_rejects_malformed_json() {
        assert!(parse("{not json}").is_err());
    }

    /// Scenario from spec.md §8.3: a multipart stream delivered in three
    /// chunks split at bytes 5 and 25.
    #[test]
    fn streaming_matches_single_shot_on_concatenated_payload() {
        let payload = "[\r\n{\"title\":\"T1\"},\r\n{\"title\":\"T2\"}]\r\n";
        let chunks = [&payload[..5], &payload[5..25], &payload[25..]];

        let mut parser = MultipartParser::new();
        let mut streamed = Vec::new();
        for chunk in chunks {
            streamed.extend(parser.feed(chunk).unwrap());
        }
        streamed.extend(parser.finish(false).unwrap());

        let single_shot = parse(payload.trim_start_matches("[\r\n").trim_end_matches("]\r\n"));
        // The raw payload isn't itself single-shot JSON (it's CRLF-framed),
        // so compare against the expected parts directly instead.
        let _ = single_shot;
        assert_eq!(streamed, vec![title_response("T1"), title_response("T2")]);
    }

    #[test]
    fn truncation_yields_partial_parts_and_extra_not_a_mis_framed_part() {
        let payload = "[\r\n{\"title\":\"T1\"},\r\n{\"title\":\"T2\"}]\r\n";
        for cut in 0..payload.len() {
            let mut parser = MultipartParser::new();
            let result = parser.feed(&payload[..cut]);
            // Truncating mid-stream must never itself produce an error —
            // only a finish() on a truncated-mid-part tail can fail, and
            // even that only with a syntactically broken fragment.
            assert!(result.is_ok(), "feed should not error on truncation at {cut}");
        }
    }

    #[test]
    fn last_ditch_recovers_a_final_part_missing_trailing_crlf() {
        let mut parser = MultipartParser::new();
        parser.feed("[\r\n{\"title\":\"T1\"},\r\n{\"title\":\"T2\"}]").unwrap();
        let tail = parser.finish(true).unwrap();
        assert_eq!(tail, vec![title_response("T2")]);
    }

    #[test]
    fn clean_end_with_no_trailing_part_is_not_an_error() {
        let mut parser = MultipartParser::new();
        parser
            .feed("[\r\n{\"title\":\"T1\"},\r\n{\"title\":\"T2\"},\r\n]\r\n")
            .unwrap();
        assert_eq!(parser.finish(false).unwrap(), Vec::new());
    }

    #[test]
    fn assemble_single_part_is_not_wrapped_as_multipart() {
        let response = assemble(vec![title_response("A")]);
        assert_eq!(response, Response::Single(title_response("A")));
    }

    #[test]
    fn assemble_multiple_parts_becomes_multipart() {
        let response = assemble(vec![title_response("A"), title_response("B")]);
        assert!(matches!(response, Response::Multipart(_)));
    }
}
