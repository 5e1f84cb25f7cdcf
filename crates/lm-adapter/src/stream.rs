use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;

use crate::content::{FinishReason, RawRequest, Usage, Warning};
use crate::errors::AdapterError;

/// Normalized events produced by a `stream` call.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Always the first event; carries the conversion warnings.
    StreamStart { warnings: Vec<Warning> },
    /// Incremental text, forwarded exactly as the backend delivered it.
    TextDelta { delta: String },
    /// A complete tool call.
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: String,
    },
    /// Generation finished.
    Finish {
        finish_reason: FinishReason,
        usage: Option<Usage>,
    },
    /// A recoverable failure; the stream keeps going until the source ends.
    Error { error: AdapterError },
}

/// Lazy sequence of normalized stream events.
pub type EventStream = Pin<Box<dyn futures::Stream<Item = StreamEvent> + Send + 'static>>;

/// Handle returned by `LanguageModel::stream`.
pub struct StreamResult {
    pub stream: EventStream,
    pub request: RawRequest,
    /// Same warnings as carried by the `StreamStart` event.
    pub warnings: Vec<Warning>,
}

impl std::fmt::Debug for StreamResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResult")
            .field("request", &self.request)
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}

/// Incremental translation of one source item at a time into stream events.
pub(crate) trait EventMapper<T> {
    /// Events for one source item, in order.
    fn map(&mut self, item: T) -> Vec<StreamEvent>;

    /// Events owed once the source has ended.
    fn finish(&mut self) -> Vec<StreamEvent> {
        Vec::new()
    }
}

/// Pulls `source` one item at a time and yields the events `mapper` produces
/// for it, in order, followed by the mapper's closing events.
///
/// Only the events of the item being translated are buffered; the source is
/// not polled again until they have all been consumed.
pub(crate) fn translate_stream<S, T, M>(source: S, mapper: M) -> EventStream
where
    S: futures::Stream<Item = T> + Send + Unpin + 'static,
    T: Send + 'static,
    M: EventMapper<T> + Send + 'static,
{
    struct State<S, M> {
        source: S,
        mapper: M,
        pending: VecDeque<StreamEvent>,
        ended: bool,
    }

    Box::pin(stream::unfold(
        State {
            source,
            mapper,
            pending: VecDeque::new(),
            ended: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Some((event, state));
                }
                if state.ended {
                    return None;
                }
                match state.source.next().await {
                    Some(item) => {
                        let events = state.mapper.map(item);
                        state.pending.extend(events);
                    }
                    None => {
                        state.ended = true;
                        let events = state.mapper.finish();
                        state.pending.extend(events);
                    }
                }
            }
        },
    ))
}
