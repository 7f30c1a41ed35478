//! Event streams and the legacy SSE transport
//!
//! With the SSE transport the client keeps a GET request open on the
//! server's event stream. The first `endpoint` event names the URL that
//! requests are POSTed to. Replies arrive later as `message` events on the
//! open stream and are matched to their request by JSON-RPC id.

use crate::Result;
use crate::error::McpError;
use futures::{Stream, StreamExt};
use reqwest::Url;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One dispatched event; `event` is `message` when the server names none
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental event-stream parser
///
/// Bytes may be fed in arbitrary chunks. Lines end in `\n` or `\r\n`, and
/// a blank line dispatches the event collected so far.
#[derive(Debug, Default)]
pub(crate) struct EventParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl EventParser {
    /// Feed a chunk and return every event it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            // A newline byte never occurs inside a UTF-8 sequence
            let line = String::from_utf8_lossy(&raw);
            if let Some(event) = self.line(line.trim_end_matches(['\n', '\r'])) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line and event at end of input
    pub fn finish(&mut self) -> Vec<SseEvent> {
        self.feed(b"\n\n")
    }

    fn line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// An open event stream and the endpoint that accepts its requests
pub(crate) struct SseSession {
    endpoint: Url,
    pending: Pending,
    reader: JoinHandle<()>,
}

impl SseSession {
    /// Open the event stream at `url` and wait for the endpoint announcement
    pub(crate) async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(url)
            .map_err(|e| McpError::ConfigError(format!("Invalid SSE url '{url}': {e}")))?;

        // The stream stays open for the whole session; only connecting is bounded
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| McpError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        let response = client
            .get(base.clone())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .send()
            .await
            .map_err(|e| McpError::from_reqwest("open event stream", &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::from_status("open event stream", status, &body));
        }

        let mut stream = Box::pin(response.bytes_stream());
        let mut parser = EventParser::default();
        let endpoint = tokio::time::timeout(
            timeout,
            wait_for_endpoint(&mut stream, &mut parser, &base),
        )
        .await
        .map_err(|_| McpError::Timeout(format!("no endpoint announced by {url}")))??;
        debug!(%endpoint, "Event stream open");

        let pending = Pending::default();
        let reader = tokio::spawn(read_replies(stream, parser, Arc::clone(&pending)));

        Ok(Self {
            endpoint,
            pending,
            reader,
        })
    }

    pub(crate) fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// POST `message` and wait for the reply with the same `id` on the stream
    pub(crate) async fn request(
        &self,
        http: &reqwest::Client,
        headers: HeaderMap,
        id: u64,
        method: &str,
        message: &Value,
        timeout: Duration,
    ) -> Result<Value> {
        if self.reader.is_finished() {
            return Err(McpError::Unavailable(format!(
                "event stream closed before {method}"
            )));
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(err) = self.post(http, headers, method, message).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(McpError::Unavailable(format!(
                "event stream closed before the reply to {method}"
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::Timeout(format!(
                    "no reply to {method} within {}s",
                    timeout.as_secs()
                )))
            }
        }
    }

    /// POST a message to the announced endpoint without waiting for a reply
    pub(crate) async fn post(
        &self,
        http: &reqwest::Client,
        headers: HeaderMap,
        method: &str,
        message: &Value,
    ) -> Result<()> {
        let response = http
            .post(self.endpoint.clone())
            .headers(headers)
            .json(message)
            .send()
            .await
            .map_err(|e| McpError::from_reqwest(method, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::from_status(method, status, &body));
        }
        Ok(())
    }
}

impl Drop for SseSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn wait_for_endpoint<S, B>(stream: &mut S, parser: &mut EventParser, base: &Url) -> Result<Url>
where
    S: Stream<Item = reqwest::Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| McpError::from_reqwest("read event stream", &e))?;
        let announced = parser
            .feed(chunk.as_ref())
            .into_iter()
            .find(|event| event.event == "endpoint");

        if let Some(event) = announced {
            return base.join(event.data.trim()).map_err(|e| {
                McpError::InvalidResponse(format!("bad endpoint '{}': {e}", event.data))
            });
        }
    }
    Err(McpError::Unavailable(
        "event stream closed before announcing an endpoint".to_string(),
    ))
}

async fn read_replies<S, B>(mut stream: S, mut parser: EventParser, pending: Pending)
where
    S: Stream<Item = reqwest::Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Event stream failed: {}", e);
                break;
            }
        };
        for event in parser.feed(chunk.as_ref()) {
            deliver(&pending, &event).await;
        }
    }

    // Dropping the senders wakes every waiter
    pending.lock().await.clear();
    debug!("Event stream closed");
}

async fn deliver(pending: &Pending, event: &SseEvent) {
    if event.event != "message" {
        return;
    }
    let Ok(message) = serde_json::from_str::<Value>(&event.data) else {
        debug!("Ignoring malformed event: {}", event.data);
        return;
    };
    let Some(id) = message.get("id").and_then(Value::as_u64) else {
        return;
    };
    if let Some(waiter) = pending.lock().await.remove(&id) {
        let _ = waiter.send(message);
    }
}
