//! One SSE generate session: open, classify, decode, reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use podium_client_core::event::{
    ProtocolViolation, RawServerRecord, ServerEvent, interpret_record,
};
use podium_client_core::geo::GeoPoint;

use crate::{RetryPolicy, StreamClientConfig, error_detail};

const EVENT_CHANNEL_CAPACITY: usize = 64;
const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Body of `POST /api/generate`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub input: String,
    pub location: GeoPoint,
}

/// What the reader task delivers to the session owner.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The open handshake was accepted as an event stream.
    Opened,
    /// One decoded and interpreted data record.
    Record(ServerEvent),
    /// Terminal failure; the task stops and nothing follows.
    Fatal { message: String },
}

/// How a finished open handshake is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenDisposition {
    /// Success with an event-stream content type; start reading.
    Stream,
    /// 401: surface the body's detail message and stop. Never retried.
    Unauthorized,
    /// Everything else: reconnect silently.
    Retriable,
}

pub fn classify_open(status: StatusCode, content_type: Option<&str>) -> OpenDisposition {
    if status == StatusCode::UNAUTHORIZED {
        return OpenDisposition::Unauthorized;
    }
    let is_event_stream = content_type.is_some_and(|value| {
        value
            .to_ascii_lowercase()
            .contains(EVENT_STREAM_CONTENT_TYPE)
    });
    if status.is_success() && is_event_stream {
        OpenDisposition::Stream
    } else {
        OpenDisposition::Retriable
    }
}

/// Handle to one running generate stream. Events arrive in server order
/// through [`StreamSession::next_event`]; the reader task stops on its own
/// after the first terminal record or fatal failure, and dropping the
/// handle aborts it mid-retry.
#[derive(Debug)]
pub struct StreamSession {
    events: mpsc::Receiver<StreamEvent>,
    retries: Arc<AtomicU32>,
    task: JoinHandle<()>,
}

impl StreamSession {
    pub fn open(
        http: reqwest::Client,
        config: &StreamClientConfig,
        request: &GenerateRequest,
        access_token: &str,
    ) -> Self {
        let (tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let retries = Arc::new(AtomicU32::new(0));
        let task = tokio::spawn(run_stream(
            http,
            config.generate_url(),
            config.retry.clone(),
            request.clone(),
            access_token.to_string(),
            tx,
            Arc::clone(&retries),
        ));
        Self {
            events,
            retries,
            task,
        }
    }

    /// `None` once the reader task is gone and the channel drained.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Reconnects performed so far for this session.
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    /// Stops reading immediately; a pending reconnect sleep is cancelled.
    pub fn close(&mut self) {
        self.task.abort();
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_stream(
    http: reqwest::Client,
    url: String,
    policy: RetryPolicy,
    request: GenerateRequest,
    access_token: String,
    tx: mpsc::Sender<StreamEvent>,
    retries: Arc<AtomicU32>,
) {
    let session_id = Uuid::new_v4();
    let mut retries_done: u32 = 0;

    loop {
        let attempt = http
            .post(&url)
            .bearer_auth(&access_token)
            .json(&request)
            .send()
            .await;

        let retriable_reason = match attempt {
            Ok(response) => {
                let status = response.status();
                let content_type = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned);
                match classify_open(status, content_type.as_deref()) {
                    OpenDisposition::Stream => {
                        if tx.send(StreamEvent::Opened).await.is_err() {
                            return;
                        }
                        debug!(session = %session_id, "generate stream open");
                        match read_records(response, &tx, session_id).await {
                            ReadOutcome::Terminal | ReadOutcome::ChannelClosed => return,
                            ReadOutcome::Disconnected { reason } => reason,
                        }
                    }
                    OpenDisposition::Unauthorized => {
                        let body = response.bytes().await.unwrap_or_default();
                        let message =
                            error_detail(&body).unwrap_or_else(|| fallback_unauthorized(&body));
                        let _ = tx.send(StreamEvent::Fatal { message }).await;
                        return;
                    }
                    OpenDisposition::Retriable => {
                        format!("unexpected open response: status {status}")
                    }
                }
            }
            Err(error) => format!("request failed: {error}"),
        };

        if policy.attempts_exhausted(retries_done) {
            let message = format!(
                "stream failed after {retries_done} reconnect attempts: {retriable_reason}"
            );
            let _ = tx.send(StreamEvent::Fatal { message }).await;
            return;
        }
        let delay = policy.backoff_for(retries_done);
        retries_done += 1;
        retries.fetch_add(1, Ordering::SeqCst);
        warn!(
            session = %session_id,
            reason = %retriable_reason,
            retry = retries_done,
            "generate stream interrupted; reconnecting"
        );
        tokio::time::sleep(delay).await;
    }
}

enum ReadOutcome {
    Terminal,
    ChannelClosed,
    Disconnected { reason: String },
}

enum LineOutcome {
    Continue,
    Terminal,
    ChannelClosed,
}

async fn read_records(
    response: reqwest::Response,
    tx: &mpsc::Sender<StreamEvent>,
    session_id: Uuid,
) -> ReadOutcome {
    let mut body = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(error) => {
                return ReadOutcome::Disconnected {
                    reason: format!("read failed: {error}"),
                };
            }
        };
        buffer.extend_from_slice(&chunk);
        for line in take_complete_lines(&mut buffer) {
            match forward_line(&line, tx, session_id).await {
                LineOutcome::Continue => {}
                LineOutcome::Terminal => return ReadOutcome::Terminal,
                LineOutcome::ChannelClosed => return ReadOutcome::ChannelClosed,
            }
        }
    }

    if !buffer.is_empty() {
        let tail = std::mem::take(&mut buffer);
        match forward_line(&tail, tx, session_id).await {
            LineOutcome::Continue => {}
            LineOutcome::Terminal => return ReadOutcome::Terminal,
            LineOutcome::ChannelClosed => return ReadOutcome::ChannelClosed,
        }
    }

    ReadOutcome::Disconnected {
        reason: "stream closed before a terminal record".to_string(),
    }
}

async fn forward_line(
    line: &[u8],
    tx: &mpsc::Sender<StreamEvent>,
    session_id: Uuid,
) -> LineOutcome {
    match decode_data_line(line) {
        None => LineOutcome::Continue,
        Some(Err(violation)) => {
            warn!(session = %session_id, violation = %violation, "dropping stream record");
            LineOutcome::Continue
        }
        Some(Ok(event)) => {
            let terminal = matches!(
                event,
                ServerEvent::Complete { .. } | ServerEvent::RateLimited { .. }
            );
            if tx.send(StreamEvent::Record(event)).await.is_err() {
                return LineOutcome::ChannelClosed;
            }
            if terminal {
                LineOutcome::Terminal
            } else {
                LineOutcome::Continue
            }
        }
    }
}

/// Drains every full line out of the buffer, leaving a partial trailing
/// line (if any) for the next chunk. Strips the newline and an optional
/// carriage return.
fn take_complete_lines(buffer: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    while let Some(newline_index) = buffer.iter().position(|byte| *byte == b'\n') {
        let mut line: Vec<u8> = buffer.drain(..=newline_index).collect();
        if matches!(line.last(), Some(b'\n')) {
            line.pop();
        }
        if matches!(line.last(), Some(b'\r')) {
            line.pop();
        }
        lines.push(line);
    }
    lines
}

/// `data:` lines carry one JSON record each. Blank separators, comments,
/// and other SSE fields are skipped.
fn decode_data_line(line: &[u8]) -> Option<Result<ServerEvent, ProtocolViolation>> {
    if line.is_empty() || line.first() == Some(&b':') {
        return None;
    }
    let payload = line.strip_prefix(b"data:")?;
    let payload = payload.strip_prefix(b" ").unwrap_or(payload);
    match serde_json::from_slice::<RawServerRecord>(payload) {
        Ok(record) => Some(interpret_record(record)),
        Err(error) => Some(Err(ProtocolViolation::MalformedRecord {
            detail: error.to_string(),
        })),
    }
}

fn fallback_unauthorized(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "authentication failed (401)".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_succeeds_only_with_an_event_stream_content_type() {
        assert_eq!(
            classify_open(StatusCode::OK, Some("text/event-stream")),
            OpenDisposition::Stream
        );
        assert_eq!(
            classify_open(StatusCode::OK, Some("Text/Event-Stream; charset=utf-8")),
            OpenDisposition::Stream
        );
        assert_eq!(
            classify_open(StatusCode::OK, Some("application/json")),
            OpenDisposition::Retriable
        );
        assert_eq!(classify_open(StatusCode::OK, None), OpenDisposition::Retriable);
    }

    #[test]
    fn unauthorized_open_is_fatal_not_retriable() {
        assert_eq!(
            classify_open(StatusCode::UNAUTHORIZED, Some("application/json")),
            OpenDisposition::Unauthorized
        );
        assert_eq!(
            classify_open(StatusCode::UNAUTHORIZED, Some("text/event-stream")),
            OpenDisposition::Unauthorized
        );
    }

    #[test]
    fn non_success_open_is_retriable() {
        assert_eq!(
            classify_open(StatusCode::INTERNAL_SERVER_ERROR, None),
            OpenDisposition::Retriable
        );
        assert_eq!(
            classify_open(StatusCode::TOO_MANY_REQUESTS, Some("application/json")),
            OpenDisposition::Retriable
        );
    }

    #[test]
    fn lines_reassemble_across_chunk_boundaries() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(b"data: one\nda");
        let lines = take_complete_lines(&mut buffer);
        assert_eq!(lines, vec![b"data: one".to_vec()]);
        assert_eq!(buffer, b"da".to_vec());

        buffer.extend_from_slice(b"ta: two\r\n\n");
        let lines = take_complete_lines(&mut buffer);
        assert_eq!(lines, vec![b"data: two".to_vec(), Vec::new()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn data_lines_decode_into_events() {
        let decoded = decode_data_line(br#"data: {"status": "processing", "output": "thinking"}"#)
            .expect("data line")
            .expect("valid record");
        assert_eq!(
            decoded,
            ServerEvent::Progress {
                text: "thinking".to_string()
            }
        );
    }

    #[test]
    fn data_prefix_without_space_is_accepted() {
        let decoded = decode_data_line(br#"data:{"status": "end", "output": "done"}"#)
            .expect("data line")
            .expect("valid record");
        assert_eq!(
            decoded,
            ServerEvent::Progress {
                text: "done".to_string()
            }
        );
    }

    #[test]
    fn separators_comments_and_other_fields_are_skipped() {
        assert!(decode_data_line(b"").is_none());
        assert!(decode_data_line(b": keepalive").is_none());
        assert!(decode_data_line(b"event: update").is_none());
        assert!(decode_data_line(b"retry: 1000").is_none());
    }

    #[test]
    fn undecodable_data_lines_are_violations() {
        let violation = decode_data_line(b"data: not json")
            .expect("data line")
            .expect_err("malformed");
        assert!(matches!(violation, ProtocolViolation::MalformedRecord { .. }));
    }

    #[test]
    fn unauthorized_fallback_uses_the_raw_body_when_present() {
        assert_eq!(fallback_unauthorized(b""), "authentication failed (401)");
        assert_eq!(fallback_unauthorized(b"  Unauthorized  "), "Unauthorized");
    }
}
