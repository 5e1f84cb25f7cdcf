use serde::Deserialize;
use tracing::{debug, warn};

use crate::content::{FinishReason, Usage, Warning};
use crate::convert::map_finish_reason;
use crate::errors::AdapterError;
use crate::stream::{EventMapper, EventStream, StreamEvent, translate_stream};
use crate::transport::ChunkStream;

use super::response::ChatUsage;

/// Sentinel payload that closes a chat event stream.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    id: Option<String>,
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    name: Option<String>,
    arguments: Option<String>,
}

/// Translates raw chat stream chunks into normalized events, one chunk at a
/// time.
///
/// The first chunk, whatever it holds, is preceded by `StreamStart`. A
/// `Finish` without usage is held back until a trailing usage-only chunk,
/// `[DONE]` or the end of the source, whichever comes first.
pub struct ChatStreamMapper {
    start: Option<Vec<Warning>>,
    pending_finish: Option<FinishReason>,
}

impl ChatStreamMapper {
    pub fn new(warnings: Vec<Warning>) -> Self {
        Self {
            start: Some(warnings),
            pending_finish: None,
        }
    }

    /// Maps one raw chunk to zero or more events.
    pub fn map_chunk(&mut self, chunk: &str) -> Vec<StreamEvent> {
        let mut events = self.start_event();
        if chunk.trim() == DONE_SENTINEL {
            events.extend(self.flush_finish(None));
            return events;
        }

        let parsed: ChatChunk = match serde_json::from_str(chunk) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "malformed stream chunk");
                events.push(StreamEvent::Error {
                    error: AdapterError::invalid_response(
                        format!("malformed stream chunk: {e}"),
                        serde_json::Value::String(chunk.to_string()),
                    ),
                });
                return events;
            }
        };
        let usage = parsed.usage.map(Usage::from);

        let Some(choice) = parsed.choices.into_iter().next() else {
            // Standalone usage chunk sent after the finish chunk.
            if usage.is_some() {
                events.extend(self.flush_finish(usage));
            }
            return events;
        };
        let delta = choice.delta.unwrap_or_default();
        // Role-only opening chunks carry `content: ""` and produce no event.
        if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
            events.push(StreamEvent::TextDelta { delta: text });
        }
        for call in delta.tool_calls.unwrap_or_default() {
            let Some(function) = call.function else {
                continue;
            };
            match (function.name, function.arguments) {
                (Some(name), Some(arguments)) if !name.is_empty() && !arguments.is_empty() => {
                    events.push(StreamEvent::ToolCall {
                        tool_call_id: call.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                        tool_name: name,
                        input: arguments,
                    });
                }
                _ => debug!("skipping partial tool call delta"),
            }
        }
        if let Some(reason) = choice.finish_reason {
            self.pending_finish = Some(map_finish_reason(Some(&reason)));
            if usage.is_some() {
                events.extend(self.flush_finish(usage));
            }
        }
        events
    }

    /// Maps a failure of the chunk source itself.
    pub fn map_failure(&mut self, error: AdapterError) -> Vec<StreamEvent> {
        let mut events = self.start_event();
        events.extend(self.flush_finish(None));
        events.push(StreamEvent::Error { error });
        events
    }

    /// Closing events once the chunk source has ended.
    pub fn end(&mut self) -> Vec<StreamEvent> {
        self.flush_finish(None).into_iter().collect()
    }

    fn flush_finish(&mut self, usage: Option<Usage>) -> Option<StreamEvent> {
        self.pending_finish
            .take()
            .map(|finish_reason| StreamEvent::Finish {
                finish_reason,
                usage,
            })
    }

    fn start_event(&mut self) -> Vec<StreamEvent> {
        self.start
            .take()
            .map(|warnings| StreamEvent::StreamStart { warnings })
            .into_iter()
            .collect()
    }
}

impl EventMapper<Result<String, AdapterError>> for ChatStreamMapper {
    fn map(&mut self, item: Result<String, AdapterError>) -> Vec<StreamEvent> {
        match item {
            Ok(chunk) => self.map_chunk(&chunk),
            Err(error) => self.map_failure(error),
        }
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        self.end()
    }
}

/// Lazily maps a raw chunk stream to normalized events.
///
/// A failure of the chunk source is reported in-band as an `Error` event.
pub fn map_chunk_stream(chunks: ChunkStream, warnings: Vec<Warning>) -> EventStream {
    translate_stream(chunks, ChatStreamMapper::new(warnings))
}
