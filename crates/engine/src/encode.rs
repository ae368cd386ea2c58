//! Transport-agnostic event encoding.
//!
//! Serializes `TurnEvent`s into SSE frames: the enum tag becomes the event
//! name, everything else is the JSON payload.

use crate::event::TurnEvent;

/// Render an event as a Server-Sent Events frame:
/// `event: <type>\ndata: <json>\n\n`.
pub fn encode_sse(event: &TurnEvent) -> String {
    format!(
        "event: {}\ndata: {}\n\n",
        event.event_type(),
        payload_json(event)
    )
}

/// The event payload as JSON, without the type tag.
pub fn payload_json(event: &TurnEvent) -> String {
    let mut value = serde_json::to_value(event).unwrap_or_default();
    if let Some(map) = value.as_object_mut() {
        map.remove("type");
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_frame_shape() {
        let frame = encode_sse(&TurnEvent::Chunk {
            content: "Hello".into(),
        });
        assert!(frame.starts_with("event: chunk\ndata: "));
        assert!(frame.ends_with("\n\n"));
        assert!(frame.contains(r#""content":"Hello""#));
    }

    #[test]
    fn payload_omits_type_tag() {
        let payload = payload_json(&TurnEvent::complete(2));
        assert!(!payload.contains(r#""type""#));
        assert!(payload.contains(r#""status":"complete""#));
        assert!(payload.contains(r#""message_count":2"#));
    }

    #[test]
    fn error_frame() {
        let frame = encode_sse(&TurnEvent::error("boom", "Streaming error occurred"));
        assert!(frame.starts_with("event: error\n"));
        assert!(frame.contains(r#""error":"boom""#));
        assert!(frame.contains(r#""message":"Streaming error occurred""#));
    }
}
