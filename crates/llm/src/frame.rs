//! SSE-style delta frame decoding
//!
//! The generation transport delivers newline-separated frames in the
//! server-sent-events shape: `data: {"delta": "..."}` payload lines, a
//! `data: [DONE]` end marker, and an optional in-band error payload.
//! Malformed or unrecognized frames are skipped silently.

use serde_json::Value;
use tokio_stream::Stream;

use crate::generator::{StreamEvent, TokenStream};

/// End-of-stream marker payload
const DONE_MARKER: &str = "[DONE]";

/// Decode a single transport frame into a stream event.
///
/// Returns `None` for frames that carry nothing for the consumer: blank
/// keep-alives, comment lines, non-data fields, and unparseable payloads.
pub fn decode_frame(line: &str) -> Option<StreamEvent> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let payload = line.strip_prefix("data:")?.trim();
    if payload == DONE_MARKER {
        return Some(StreamEvent::Done);
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::trace!(error = %e, "skipping unparseable frame");
            return None;
        }
    };

    if let Some(err) = value.get("error") {
        let message = err
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Some(StreamEvent::Error(message));
    }

    match value.get("delta").and_then(Value::as_str) {
        Some(delta) => Some(StreamEvent::Delta(delta.to_string())),
        None => {
            tracing::trace!("skipping frame without delta field");
            None
        }
    }
}

/// Adapt a stream of raw transport lines into a [`TokenStream`].
///
/// The returned stream ends after the first `Done` or `Error` event even
/// if the transport keeps producing lines.
pub fn sse_token_stream<S>(lines: S) -> TokenStream
where
    S: Stream<Item = String> + Send + 'static,
{
    use futures::StreamExt;

    let events = lines.filter_map(|line| futures::future::ready(decode_frame(&line)));
    let mut terminated = false;
    events
        .take_while(move |event| {
            let keep = !terminated;
            if matches!(event, StreamEvent::Done | StreamEvent::Error(_)) {
                terminated = true;
            }
            futures::future::ready(keep)
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[test]
    fn test_delta_frame() {
        let event = decode_frame(r#"data: {"delta": "Hello"}"#);
        assert_eq!(event, Some(StreamEvent::Delta("Hello".to_string())));
    }

    #[test]
    fn test_done_marker() {
        assert_eq!(decode_frame("data: [DONE]"), Some(StreamEvent::Done));
    }

    #[test]
    fn test_error_marker() {
        let event = decode_frame(r#"data: {"error": "overloaded"}"#);
        assert_eq!(event, Some(StreamEvent::Error("overloaded".to_string())));
    }

    #[test]
    fn test_malformed_frames_skipped() {
        assert_eq!(decode_frame(""), None);
        assert_eq!(decode_frame(": keep-alive"), None);
        assert_eq!(decode_frame("event: ping"), None);
        assert_eq!(decode_frame("data: {not json"), None);
        assert_eq!(decode_frame(r#"data: {"unrelated": 1}"#), None);
    }

    #[tokio::test]
    async fn test_line_stream_decoding() {
        let lines = tokio_stream::iter(vec![
            r#"data: {"delta": "Hi"}"#.to_string(),
            "garbage".to_string(),
            r#"data: {"delta": " there"}"#.to_string(),
            "data: [DONE]".to_string(),
            r#"data: {"delta": "late"}"#.to_string(),
        ]);

        let events: Vec<StreamEvent> = sse_token_stream(lines).collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Delta("Hi".to_string()),
                StreamEvent::Delta(" there".to_string()),
                StreamEvent::Done,
            ]
        );
    }
}
