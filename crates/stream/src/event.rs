use serde_json::Value;

use crate::record::Record;

pub const MESSAGE_TYPE_FIELD: &str = "messageType";
pub const MESSAGE_FIELD: &str = "message";

/// Semantic kind of one stream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Generation started; status line only.
    Start,
    /// Upstream accepted the outbound user message; status line only.
    UserEcho,
    /// Incremental fragment of the generated answer.
    Delta,
    /// Final status label. Stream end is signalled by the transport, not by this.
    Complete,
    /// Well-formed payload with an unrecognized `messageType`; rendered like a delta.
    Unknown,
    /// Payload that was not a structured object; rendered verbatim.
    Raw,
}

impl EventKind {
    /// Maps a wire `messageType` value to its kind.
    pub fn from_message_type(message_type: Option<&str>) -> Self {
        match message_type {
            Some("start") => Self::Start,
            Some("user_message") => Self::UserEcho,
            Some("ai_message") => Self::Delta,
            Some("complete") => Self::Complete,
            Some(_) | None => Self::Unknown,
        }
    }

    /// Kinds that replace the status line.
    pub fn is_status(self) -> bool {
        matches!(self, Self::Start | Self::UserEcho | Self::Complete)
    }

    /// Kinds that append to the message body.
    pub fn is_body(self) -> bool {
        !self.is_status()
    }
}

/// One classified event; consumed exactly once by the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub kind: EventKind,
    pub text: String,
}

impl StreamEvent {
    pub fn new(kind: EventKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Classifies one record. Never fails: anything that is not a JSON object degrades to
/// [`EventKind::Raw`] carrying the record verbatim.
pub fn classify(record: Record) -> StreamEvent {
    let object = match serde_json::from_str::<Value>(record.as_str()) {
        Ok(Value::Object(object)) => object,
        Ok(_) | Err(_) => {
            tracing::warn!(
                record_len = record.as_str().len(),
                "stream record is not a structured object; rendering it as raw text"
            );
            return StreamEvent::new(EventKind::Raw, record.into_inner());
        }
    };

    let message_type = object.get(MESSAGE_TYPE_FIELD).and_then(Value::as_str);
    let kind = EventKind::from_message_type(message_type);
    if kind == EventKind::Unknown {
        tracing::warn!(
            message_type = ?object.get(MESSAGE_TYPE_FIELD),
            "unrecognized stream message type; appending its message to the body"
        );
    }

    let text = match object.get(MESSAGE_FIELD) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(message)) => message.clone(),
        Some(other) => other.to_string(),
    };

    StreamEvent { kind, text }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::extract_record;

    fn classify_line(line: &str) -> StreamEvent {
        classify(extract_record(line).unwrap())
    }

    #[test]
    fn maps_every_known_message_type() {
        let cases = [
            ("start", EventKind::Start),
            ("user_message", EventKind::UserEcho),
            ("ai_message", EventKind::Delta),
            ("complete", EventKind::Complete),
        ];

        for (message_type, expected) in cases {
            let line = format!(
                "data: {{\"messageType\":\"{message_type}\",\"message\":\"payload\"}}"
            );
            assert_eq!(
                classify_line(&line),
                StreamEvent::new(expected, "payload"),
                "{message_type}"
            );
        }
    }

    #[test]
    fn unknown_or_missing_type_falls_back_to_unknown() {
        let event = classify_line(r#"data: {"messageType":"tool_call","message":"x"}"#);
        assert_eq!(event, StreamEvent::new(EventKind::Unknown, "x"));

        let event = classify_line(r#"data: {"message":"y"}"#);
        assert_eq!(event, StreamEvent::new(EventKind::Unknown, "y"));

        let event = classify_line(r#"data: {"messageType":7,"message":"z"}"#);
        assert_eq!(event.kind, EventKind::Unknown);
    }

    #[test]
    fn malformed_payload_becomes_raw_verbatim() {
        assert_eq!(
            classify_line("data: not-json"),
            StreamEvent::new(EventKind::Raw, "not-json")
        );
        assert_eq!(
            classify_line(r#"data: {"messageType":"ai_message","message":"cut"#),
            StreamEvent::new(EventKind::Raw, r#"{"messageType":"ai_message","message":"cut"#)
        );
    }

    #[test]
    fn non_object_json_is_raw() {
        assert_eq!(classify_line("data: 42").kind, EventKind::Raw);
        assert_eq!(
            classify_line(r#"data: "quoted""#),
            StreamEvent::new(EventKind::Raw, r#""quoted""#)
        );
    }

    #[test]
    fn missing_or_non_string_message_is_tolerated() {
        assert_eq!(classify_line(r#"data: {"messageType":"start"}"#).text, "");
        assert_eq!(
            classify_line(r#"data: {"messageType":"start","message":null}"#).text,
            ""
        );
        assert_eq!(
            classify_line(r#"data: {"messageType":"ai_message","message":12}"#),
            StreamEvent::new(EventKind::Delta, "12")
        );
    }

    #[test]
    fn status_and_body_kinds_partition_the_set() {
        assert!(EventKind::Start.is_status());
        assert!(EventKind::UserEcho.is_status());
        assert!(EventKind::Complete.is_status());
        assert!(EventKind::Delta.is_body());
        assert!(EventKind::Unknown.is_body());
        assert!(EventKind::Raw.is_body());
    }
}
