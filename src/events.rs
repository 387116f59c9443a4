use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::context::SessionInfo;
use crate::extractor::GenerationResult;

/// One unit of the progress/result protocol pushed to the UI. A request
/// emits any number of `Status` events followed by exactly one terminal
/// `FinalResult` or `Error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Status { message: String },
    FinalResult { data: FinalResultData },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalResultData {
    pub result: GenerationResult,
    pub session_info: SessionInfo,
}

impl StreamEvent {
    pub fn status(message: impl Into<String>) -> Self {
        StreamEvent::Status {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }

    pub fn final_result(result: GenerationResult, session_info: SessionInfo) -> Self {
        StreamEvent::FinalResult {
            data: FinalResultData {
                result,
                session_info,
            },
        }
    }
}

/// One-directional sink for stream events. Emission is synchronous and
/// fire-and-forget: the generator never awaits delivery confirmation.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StreamEvent);
}

/// Sink backed by an unbounded channel, for consumers that forward events
/// to a network writer.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: StreamEvent) {
        // A dropped receiver just means nobody is watching anymore.
        let _ = self.tx.send(event);
    }
}

/// Sink that discards everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: StreamEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = StreamEvent::status("Processing request...");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["message"], "Processing request...");

        let event = StreamEvent::error("rate limited");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
    }

    #[test]
    fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(StreamEvent::status("one"));
        sink.emit(StreamEvent::status("two"));

        match rx.try_recv().unwrap() {
            StreamEvent::Status { message } => assert_eq!(message, "one"),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.try_recv().unwrap() {
            StreamEvent::Status { message } => assert_eq!(message, "two"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
