//! JSON-RPC 2.0 client for the remote tool service
//!
//! With streamable HTTP, requests are POSTed to the transport URL and the
//! reply body is either a plain JSON-RPC message or an event stream whose
//! `data:` lines carry one. With SSE, requests are POSTed to the endpoint
//! the server announces on its event stream and replies arrive on that
//! stream, matched to their request by id.

use crate::config::TransportConfig;
use crate::error::McpError;
use crate::sse::{EventParser, SseSession};
use crate::Result;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

/// Protocol revision announced in `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const SESSION_HEADER: &str = "mcp-session-id";

/// Tool definition as listed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// One content block of a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
    Image { data: String, #[serde(rename = "mimeType")] mime_type: String },
    Resource { resource: Value },
}

/// Result of `tools/call`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ToolContent>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Text blocks joined by newlines; other blocks are rendered as JSON
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|block| match block {
                ToolContent::Text { text } => text.clone(),
                ToolContent::Image { mime_type, .. } => format!("[{mime_type} image]"),
                ToolContent::Resource { resource } => resource.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Server identity returned by `initialize`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub protocol_version: String,
}

/// Client for one tool service endpoint
pub struct McpHttpClient {
    transport: TransportConfig,
    http_client: reqwest::Client,
    request_id: AtomicU64,
    session_id: Mutex<Option<String>>,
    sse: OnceCell<SseSession>,
    server_info: OnceCell<ServerInfo>,
}

impl McpHttpClient {
    /// Create a client; no request is sent until first use
    pub fn new(transport: TransportConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(transport.timeout())
            .build()
            .map_err(|e| McpError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            transport,
            http_client,
            request_id: AtomicU64::new(0),
            session_id: Mutex::new(None),
            sse: OnceCell::new(),
            server_info: OnceCell::new(),
        })
    }

    pub fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    /// Perform the handshake once and return the server identity
    pub async fn initialize(&self) -> Result<&ServerInfo> {
        self.server_info.get_or_try_init(|| self.handshake()).await
    }

    /// List the tools the server offers
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        self.initialize().await?;
        let result = self.send_request("tools/list", serde_json::json!({})).await?;
        serde_json::from_value(result.get("tools").cloned().unwrap_or(Value::Array(vec![])))
            .map_err(|e| McpError::InvalidResponse(format!("failed to parse tools: {e}")))
    }

    /// Invoke a tool by name
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult> {
        self.initialize().await?;
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let result = self.send_request("tools/call", params).await?;
        serde_json::from_value(result)
            .map_err(|e| McpError::ToolCallFailed(format!("failed to parse result of '{name}': {e}")))
    }

    async fn handshake(&self) -> Result<ServerInfo> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION")
            }
        });

        let result = self.send_request("initialize", params).await.map_err(|e| match e {
            // Something other than a tool service answered
            McpError::InvalidResponse(msg) => McpError::Unavailable(msg),
            other => other,
        })?;

        let server_info = ServerInfo {
            name: result["serverInfo"]["name"]
                .as_str()
                .unwrap_or("unknown")
                .to_string(),
            version: result["serverInfo"]["version"]
                .as_str()
                .unwrap_or("unknown")
                .to_string(),
            protocol_version: result["protocolVersion"]
                .as_str()
                .unwrap_or(PROTOCOL_VERSION)
                .to_string(),
        };

        info!(
            transport = self.transport.kind(),
            url = self.transport.url(),
            "Connected to tool service: {} v{}",
            server_info.name,
            server_info.version
        );

        self.notify("notifications/initialized").await;
        Ok(server_info)
    }

    /// The open event stream of the SSE transport, connected on first use
    async fn sse_session(&self) -> Result<&SseSession> {
        self.sse
            .get_or_try_init(|| async {
                let session =
                    SseSession::connect(self.transport.url(), self.transport.timeout()).await?;
                debug!(endpoint = %session.endpoint(), "Posting requests to announced endpoint");
                Ok(session)
            })
            .await
    }

    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn build_headers(&self) -> Result<HeaderMap> {
        let mut header_map = HeaderMap::new();
        header_map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        header_map.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );

        if let Some(headers) = self.transport.headers() {
            for (key, value) in headers {
                let name = HeaderName::from_str(key).map_err(|e| {
                    McpError::ConfigError(format!("Invalid header name '{key}': {e}"))
                })?;
                let value = HeaderValue::from_str(value).map_err(|e| {
                    McpError::ConfigError(format!("Invalid header value for '{key}': {e}"))
                })?;
                header_map.insert(name, value);
            }
        }

        if let Some(session) = self.session_id.lock().await.as_deref() {
            let value = HeaderValue::from_str(session)
                .map_err(|e| McpError::InvalidResponse(format!("Invalid session id: {e}")))?;
            header_map.insert(SESSION_HEADER, value);
        }

        Ok(header_map)
    }

    /// Send a JSON-RPC request and return its `result`
    async fn send_request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_request_id();
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });

        debug!(url = self.transport.url(), id, "Sending request: {}", method);

        if matches!(self.transport, TransportConfig::Sse { .. }) {
            let session = self.sse_session().await?;
            let headers = self.build_headers().await?;
            let message = session
                .request(&self.http_client, headers, id, method, &request, self.transport.timeout())
                .await?;
            debug!(id, "Received response for: {}", method);
            return into_result(method, message);
        }

        let response = self
            .http_client
            .post(self.transport.url())
            .headers(self.build_headers().await?)
            .json(&request)
            .send()
            .await
            .map_err(|e| McpError::from_reqwest(method, &e))?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().await = Some(session.to_string());
        }

        let status = response.status();
        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = response
            .text()
            .await
            .map_err(|e| McpError::from_reqwest(method, &e))?;

        if !status.is_success() {
            return Err(McpError::from_status(method, status, &body));
        }

        let message = if is_event_stream {
            parse_event_stream(&body, id)?
        } else {
            serde_json::from_str(&body)
                .map_err(|e| McpError::InvalidResponse(format!("{method}: {e}")))?
        };

        debug!(id, "Received response for: {}", method);
        into_result(method, message)
    }

    /// Fire-and-forget notification
    async fn notify(&self, method: &str) {
        let notification = serde_json::json!({ "jsonrpc": "2.0", "method": method });
        let Ok(headers) = self.build_headers().await else {
            return;
        };

        if matches!(self.transport, TransportConfig::Sse { .. }) {
            if let Ok(session) = self.sse_session().await {
                if let Err(e) = session.post(&self.http_client, headers, method, &notification).await {
                    debug!("Notification {} not delivered: {}", method, e);
                }
            }
            return;
        }

        if let Err(e) = self
            .http_client
            .post(self.transport.url())
            .headers(headers)
            .json(&notification)
            .send()
            .await
        {
            debug!("Notification {} not delivered: {}", method, e);
        }
    }
}

/// Extract the reply to request `id` from an event-stream body
pub(crate) fn parse_event_stream(body: &str, id: u64) -> Result<Value> {
    let mut parser = EventParser::default();
    let mut events = parser.feed(body.as_bytes());
    events.extend(parser.finish());

    events
        .iter()
        .filter_map(|event| serde_json::from_str::<Value>(&event.data).ok())
        .find(|message| message.get("id").and_then(Value::as_u64) == Some(id))
        .ok_or_else(|| McpError::InvalidResponse(format!("no reply to request {id} in event stream")))
}

fn into_result(method: &str, message: Value) -> Result<Value> {
    if let Some(error) = message.get("error") {
        let detail = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(if method == "tools/call" {
            McpError::ToolCallFailed(detail)
        } else {
            McpError::RequestFailed(format!("{method}: {detail}"))
        });
    }

    message
        .get("result")
        .cloned()
        .ok_or_else(|| McpError::InvalidResponse(format!("{method}: no result in response")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_core::TaskError;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex as StdMutex};
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;

    type RequestLog = Arc<StdMutex<Vec<String>>>;

    /// Read one HTTP/1.1 request: `(method, path, body)`
    async fn read_request(conn: &mut BufReader<TcpStream>) -> Option<(String, String, Vec<u8>)> {
        let mut request_line = String::new();
        if conn.read_line(&mut request_line).await.ok()? == 0 {
            return None;
        }

        let mut content_length = 0;
        loop {
            let mut header = String::new();
            conn.read_line(&mut header).await.ok()?;
            let header = header.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().ok()?;
                }
            }
        }

        let mut body = vec![0; content_length];
        conn.read_exact(&mut body).await.ok()?;

        let mut parts = request_line.split_whitespace();
        let method = parts.next()?.to_string();
        let path = parts.next()?.to_string();
        Some((method, path, body))
    }

    /// Server answering every request with `status`
    async fn status_server(status: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut conn = BufReader::new(socket);
                    while read_request(&mut conn).await.is_some() {
                        let response =
                            format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\n\r\n");
                        if conn.get_mut().write_all(response.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });
        format!("http://{addr}/mcp")
    }

    /// Tool service speaking the legacy SSE transport
    ///
    /// `GET /sse` opens the stream and announces `/messages`. POSTs to the
    /// announced endpoint are accepted with 202 and answered on the stream.
    /// Anything else gets 405.
    async fn legacy_sse_server() -> (String, RequestLog) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let log = RequestLog::default();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel::<String>();
        let frames_rx = Arc::new(Mutex::new(Some(frames_rx)));

        let seen = Arc::clone(&log);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let seen = Arc::clone(&seen);
                let frames_tx = frames_tx.clone();
                let frames_rx = Arc::clone(&frames_rx);

                tokio::spawn(async move {
                    let mut conn = BufReader::new(socket);
                    while let Some((method, path, body)) = read_request(&mut conn).await {
                        seen.lock().unwrap().push(format!("{method} {path}"));
                        let route = path.split('?').next().unwrap_or_default().to_string();

                        match (method.as_str(), route.as_str()) {
                            ("GET", "/sse") => {
                                let Some(mut frames) = frames_rx.lock().await.take() else {
                                    return;
                                };
                                let socket = conn.get_mut();
                                socket
                                    .write_all(
                                        b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\
                                          Cache-Control: no-cache\r\nConnection: close\r\n\r\n",
                                    )
                                    .await
                                    .unwrap();
                                socket
                                    .write_all(b": ready\n\nevent: endpoint\ndata: /messages?session_id=abc\n\n")
                                    .await
                                    .unwrap();
                                while let Some(frame) = frames.recv().await {
                                    if socket.write_all(frame.as_bytes()).await.is_err() {
                                        return;
                                    }
                                }
                                return;
                            }
                            ("POST", "/messages") => {
                                let message: Value = serde_json::from_slice(&body).unwrap();
                                conn.get_mut()
                                    .write_all(b"HTTP/1.1 202 Accepted\r\nContent-Length: 8\r\n\r\nAccepted")
                                    .await
                                    .unwrap();
                                if let Some(reply) = legacy_reply(&message) {
                                    let _ = frames_tx.send(format!("event: message\r\ndata: {reply}\r\n\r\n"));
                                }
                            }
                            _ => {
                                conn.get_mut()
                                    .write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n")
                                    .await
                                    .unwrap();
                            }
                        }
                    }
                });
            }
        });

        (format!("http://{addr}/sse"), log)
    }

    fn legacy_reply(message: &Value) -> Option<String> {
        let id = message.get("id")?.clone();
        let result = match message["method"].as_str()? {
            "initialize" => json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "serverInfo": { "name": "tushare", "version": "1.2.0" }
            }),
            "tools/list" => json!({
                "tools": [{ "name": "stock_data", "inputSchema": { "type": "object" } }]
            }),
            "tools/call" => json!({
                "content": [{
                    "type": "text",
                    "text": format!(
                        "close of {}: 10.5",
                        message["params"]["arguments"]["ts_code"].as_str().unwrap_or("?")
                    )
                }]
            }),
            _ => {
                return Some(
                    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": -32601, "message": "method not found" } })
                        .to_string(),
                );
            }
        };
        Some(json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string())
    }

    #[tokio::test]
    async fn test_sse_transport_posts_to_announced_endpoint() {
        let (url, log) = legacy_sse_server().await;
        let client = McpHttpClient::new(TransportConfig::Sse {
            url,
            timeout_secs: 5,
        })
        .unwrap();

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "stock_data");
        assert_eq!(client.initialize().await.unwrap().name, "tushare");

        let result = client
            .call_tool("stock_data", json!({ "ts_code": "600519.SH" }))
            .await
            .unwrap();
        assert_eq!(result.text(), "close of 600519.SH: 10.5");

        let requests = log.lock().unwrap().clone();
        assert_eq!(requests[0], "GET /sse");
        // initialize, notifications/initialized, tools/list, tools/call
        assert_eq!(requests.len(), 5);
        assert!(
            requests[1..]
                .iter()
                .all(|r| r == "POST /messages?session_id=abc")
        );
    }

    #[tokio::test]
    async fn test_rejected_token_is_a_failed_request() {
        let client = McpHttpClient::new(TransportConfig::StreamableHttp {
            url: status_server("401 Unauthorized").await,
            headers: HashMap::from([("X-Tushare-Token".to_string(), "wrong".to_string())]),
            timeout_secs: 5,
        })
        .unwrap();

        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, McpError::RequestFailed(_)), "unexpected error: {err}");
        assert_eq!(TaskError::from(err).category(), "tool");
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let client = McpHttpClient::new(TransportConfig::StreamableHttp {
            url: status_server("503 Service Unavailable").await,
            headers: HashMap::new(),
            timeout_secs: 5,
        })
        .unwrap();

        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, McpError::Unavailable(_)), "unexpected error: {err}");
    }

    #[test]
    fn test_parse_event_stream_picks_matching_id() {
        let body = "event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\
                    \n\
                    event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"id\":3,\n\
                    data: \"result\":{\"tools\":[]}}\n\n";

        let message = parse_event_stream(body, 3).unwrap();
        assert_eq!(message["result"]["tools"], serde_json::json!([]));
    }

    #[test]
    fn test_parse_event_stream_without_reply() {
        let body = "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\r\n\r\n";
        assert!(parse_event_stream(body, 1).is_ok());
        assert!(matches!(
            parse_event_stream(body, 2),
            Err(McpError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_into_result_maps_errors() {
        let error = serde_json::json!({
            "jsonrpc": "2.0", "id": 1,
            "error": { "code": -32602, "message": "unknown tool" }
        });
        assert!(matches!(
            into_result("tools/call", error.clone()),
            Err(McpError::ToolCallFailed(msg)) if msg == "unknown tool"
        ));
        assert!(matches!(
            into_result("tools/list", error),
            Err(McpError::RequestFailed(_))
        ));
    }

    #[test]
    fn test_tool_definition_defaults() {
        let def: ToolDefinition =
            serde_json::from_value(serde_json::json!({ "name": "stock_news" })).unwrap();
        assert_eq!(def.name, "stock_news");
        assert!(def.description.is_none());
        assert_eq!(def.input_schema["type"], "object");
    }

    #[test]
    fn test_tool_call_result_text() {
        let result: ToolCallResult = serde_json::from_value(serde_json::json!({
            "content": [
                { "type": "text", "text": "close: 12.3" },
                { "type": "text", "text": "volume: 1000" }
            ]
        }))
        .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text(), "close: 12.3\nvolume: 1000");
    }

    #[test]
    fn test_client_creation() {
        let client = McpHttpClient::new(TransportConfig::StreamableHttp {
            url: "http://localhost:3100/mcp".to_string(),
            headers: HashMap::from([("X-Tushare-Token".to_string(), "t".to_string())]),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(client.transport().kind(), "streamable_http");
        assert_eq!(client.next_request_id(), 1);
        assert_eq!(client.next_request_id(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let client = McpHttpClient::new(TransportConfig::Sse {
            url: "http://127.0.0.1:9/sse".to_string(),
            timeout_secs: 2,
        })
        .unwrap();

        let err = client.list_tools().await.unwrap_err();
        assert!(
            matches!(err, McpError::Unavailable(_) | McpError::Timeout(_)),
            "unexpected error: {err}"
        );
    }
}
