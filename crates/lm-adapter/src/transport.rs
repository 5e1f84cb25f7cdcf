//! HTTP transport: JSON posts and server-sent-event chunk streams.
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::StreamExt as _;
use futures::stream;
use tracing::debug;

use crate::abort::AbortSignal;
use crate::errors::AdapterError;

/// Request headers, ordered so identical calls send identical requests.
pub type Headers = BTreeMap<String, String>;

/// Raw SSE `data:` payloads in arrival order.
pub type ChunkStream = Pin<Box<dyn futures::Stream<Item = Result<String, AdapterError>> + Send>>;

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// "Post JSON, get JSON or an event stream" capability used by the chat backend.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Posts `body` and parses the response as JSON.
    async fn post_json(
        &self,
        url: &str,
        headers: &Headers,
        body: &serde_json::Value,
        abort: Option<&AbortSignal>,
    ) -> Result<serde_json::Value, AdapterError>;

    /// Posts `body` and returns the response's SSE data payloads.
    ///
    /// The `[DONE]` sentinel is forwarded as a regular chunk. The stream ends
    /// early, without an error, once `abort` fires.
    async fn post_json_for_event_stream(
        &self,
        url: &str,
        headers: &Headers,
        body: &serde_json::Value,
        abort: Option<&AbortSignal>,
    ) -> Result<ChunkStream, AdapterError>;
}

/// `Transport` backed by `reqwest`.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn send(
        &self,
        url: &str,
        headers: &Headers,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, AdapterError> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("request to {url} failed: {e}")))?;
        check_status(url, response).await
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn post_json(
        &self,
        url: &str,
        headers: &Headers,
        body: &serde_json::Value,
        abort: Option<&AbortSignal>,
    ) -> Result<serde_json::Value, AdapterError> {
        with_abort(abort, async {
            let response = self.send(url, headers, body).await?;
            let text = response
                .text()
                .await
                .map_err(|e| AdapterError::Network(format!("reading response from {url} failed: {e}")))?;
            serde_json::from_str(&text).map_err(|e| {
                AdapterError::invalid_response(
                    format!("response is not valid JSON: {e}"),
                    serde_json::Value::String(text),
                )
            })
        })
        .await
    }

    async fn post_json_for_event_stream(
        &self,
        url: &str,
        headers: &Headers,
        body: &serde_json::Value,
        abort: Option<&AbortSignal>,
    ) -> Result<ChunkStream, AdapterError> {
        let response = with_abort(abort, self.send(url, headers, body)).await?;
        debug!(url, status = %response.status(), "event stream opened");
        let chunks = sse_chunk_stream(Box::pin(response.bytes_stream()));
        Ok(until_aborted(chunks, abort))
    }
}

async fn check_status(
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, AdapterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);
        return Err(AdapterError::RateLimited {
            url: url.to_string(),
            retry_after,
        });
    }
    let status_text = status.canonical_reason().unwrap_or_default().to_string();
    let body = response.text().await.ok().filter(|b| !b.is_empty());
    Err(AdapterError::api(url, status.as_u16(), status_text, body))
}

/// Races `fut` against the abort signal.
pub(crate) async fn with_abort<T>(
    abort: Option<&AbortSignal>,
    fut: impl Future<Output = Result<T, AdapterError>>,
) -> Result<T, AdapterError> {
    let Some(signal) = abort else {
        return fut.await;
    };
    if signal.is_aborted() {
        return Err(AdapterError::Cancelled);
    }
    tokio::select! {
        result = fut => result,
        _ = signal.cancelled() => Err(AdapterError::Cancelled),
    }
}

/// Ends `stream` as soon as the abort signal fires.
pub(crate) fn until_aborted<T: Send + 'static>(
    stream: Pin<Box<dyn futures::Stream<Item = T> + Send>>,
    abort: Option<&AbortSignal>,
) -> Pin<Box<dyn futures::Stream<Item = T> + Send>> {
    match abort.cloned() {
        Some(signal) => Box::pin(stream.take_until(async move { signal.cancelled().await })),
        None => stream,
    }
}

fn sse_chunk_stream(bytes_stream: ByteStream) -> ChunkStream {
    struct State {
        bytes_stream: ByteStream,
        decoder: SseDecoder,
        pending: VecDeque<String>,
        done: bool,
    }

    Box::pin(stream::try_unfold(
        State {
            bytes_stream,
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(chunk) = state.pending.pop_front() {
                    return Ok(Some((chunk, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes_stream.next().await {
                    Some(Ok(bytes)) => {
                        for frame in state.decoder.push_chunk(&bytes) {
                            if !frame.data.is_empty() {
                                state.pending.push_back(frame.data);
                            }
                        }
                    }
                    Some(Err(e)) => {
                        return Err(AdapterError::Network(format!("event stream read failed: {e}")));
                    }
                    None => {
                        state.done = true;
                    }
                }
            }
        },
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

#[derive(Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some((idx, delim_len)) = find_frame_delimiter(&self.buf) {
            let frame_bytes: Vec<u8> = self.buf.drain(..idx + delim_len).take(idx).collect();
            if let Some(frame) = parse_sse_frame(&frame_bytes) {
                frames.push(frame);
            }
        }
        frames
    }
}

fn find_frame_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    (0..buf.len()).find_map(|i| {
        if buf[i..].starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else if buf[i..].starts_with(b"\n\n") {
            Some((i, 2))
        } else {
            None
        }
    })
}

fn parse_sse_frame(bytes: &[u8]) -> Option<SseFrame> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    let mut event = None;
    let mut data_lines: Vec<&str> = Vec::new();
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim_start().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt as _;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> HttpTransport {
        HttpTransport::new(Duration::from_secs(5)).expect("transport")
    }

    fn headers() -> Headers {
        Headers::from([("authorization".to_string(), "Bearer test".to_string())])
    }

    #[test]
    fn sse_decoder_handles_partial_chunk_boundaries() {
        let mut decoder = SseDecoder::default();
        let frames1 = decoder.push_chunk(b"data: {\"choices\":[{\"delta\":{\"content\":\"hel");
        assert!(frames1.is_empty());
        let frames2 = decoder.push_chunk(b"lo\"}}]}\n\ndata: [DONE]\r\n\r\n");
        assert_eq!(frames2.len(), 2);
        assert!(frames2[0].data.contains("hello"));
        assert_eq!(frames2[1].data, "[DONE]");
    }

    #[test]
    fn sse_decoder_skips_comments_and_keeps_event_name() {
        let mut decoder = SseDecoder::default();
        let frames = decoder.push_chunk(b": keep-alive\n\nevent: message\ndata: {}\n\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: Some("message".into()),
                data: "{}".into()
            }]
        );
    }

    #[tokio::test]
    async fn post_json_returns_parsed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test"))
            .and(body_partial_json(serde_json::json!({"model": "m"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let value = transport()
            .post_json(
                &format!("{}/chat/completions", server.uri()),
                &headers(),
                &serde_json::json!({"model": "m"}),
                None,
            )
            .await
            .expect("json");
        assert_eq!(value, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn too_many_requests_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "12"))
            .mount(&server)
            .await;

        let err = transport()
            .post_json(&server.uri(), &headers(), &serde_json::json!({}), None)
            .await
            .expect_err("429");
        assert!(matches!(
            err,
            AdapterError::RateLimited { retry_after: Some(ref v), .. } if v == "12"
        ));
    }

    #[tokio::test]
    async fn server_error_is_retryable_not_found_is_not() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let busy = transport()
            .post_json(
                &format!("{}/busy", server.uri()),
                &headers(),
                &serde_json::json!({}),
                None,
            )
            .await
            .expect_err("503");
        assert!(matches!(
            busy,
            AdapterError::Api { status: 503, is_retryable: true, ref body, .. } if body.as_deref() == Some("overloaded")
        ));

        let missing = transport()
            .post_json_for_event_stream(
                &format!("{}/missing", server.uri()),
                &headers(),
                &serde_json::json!({}),
                None,
            )
            .await
            .err()
            .expect("404");
        assert!(matches!(
            missing,
            AdapterError::Api { status: 404, is_retryable: false, .. }
        ));
    }

    #[tokio::test]
    async fn invalid_json_body_is_a_protocol_violation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = transport()
            .post_json(&server.uri(), &headers(), &serde_json::json!({}), None)
            .await
            .expect_err("bad json");
        assert!(matches!(
            err,
            AdapterError::InvalidResponseData { ref data, .. } if data == &serde_json::json!("<html>")
        ));
    }

    #[tokio::test]
    async fn event_stream_yields_one_chunk_per_data_frame() {
        let server = MockServer::start().await;
        let body = "data: {\"a\":1}\n\n: ping\n\ndata: {\"b\":2}\n\ndata: [DONE]\n\n";
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let chunks: Vec<_> = transport()
            .post_json_for_event_stream(&server.uri(), &headers(), &serde_json::json!({}), None)
            .await
            .expect("stream")
            .collect()
            .await;
        let chunks: Vec<String> = chunks.into_iter().map(|c| c.expect("chunk")).collect();
        assert_eq!(chunks, vec!["{\"a\":1}", "{\"b\":2}", "[DONE]"]);
    }

    #[tokio::test]
    async fn aborted_signal_cancels_before_sending() {
        let (handle, signal) = crate::abort::abort_pair();
        handle.abort();
        let err = transport()
            .post_json("http://127.0.0.1:9", &headers(), &serde_json::json!({}), Some(&signal))
            .await
            .expect_err("cancelled");
        assert_eq!(err, AdapterError::Cancelled);
    }

    #[tokio::test]
    async fn aborting_ends_chunk_stream() {
        let (handle, signal) = crate::abort::abort_pair();
        let source: Pin<Box<dyn futures::Stream<Item = u32> + Send>> =
            Box::pin(stream::iter(vec![1, 2]).chain(stream::pending()));
        let mut limited = until_aborted(source, Some(&signal));
        assert_eq!(limited.next().await, Some(1));
        assert_eq!(limited.next().await, Some(2));
        handle.abort();
        assert_eq!(limited.next().await, None);
    }
}
