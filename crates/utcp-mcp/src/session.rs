//! A live, per-`(manual, server)` connection to one MCP server — either a
//! spawned stdio subprocess or a streamable-HTTP client.
//!
//! The stdio variant uses newline-delimited JSON-RPC framing over a
//! `tokio::sync::Mutex`-guarded pair of I/O streams (the lock must survive
//! across `.await` points, so a std mutex won't do); the HTTP variant is a
//! single endpoint with configurable request/SSE-read timeouts and a
//! graceful-close step gated by `terminate_on_close`.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::time::timeout;
use tracing::{debug, warn};

use utcp_core::{Result, TransportErrorKind, UtcpError};
use utcp_types::McpServerConfig;

use crate::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListResourcesResult, ListToolsResult,
    ReadResourceParams, ReadResourceResult,
};

/// A live session to one MCP server, reused across calls and recreated by
/// the transport's auto-recovery logic on connection failure.
pub enum Session {
    Stdio(StdioSession),
    Http(HttpSession),
}

impl Session {
    pub async fn connect(server_name: &str, config: &McpServerConfig, bearer_token: Option<&str>) -> Result<Self> {
        match config {
            McpServerConfig::Stdio { command, args, cwd, env } => {
                Ok(Session::Stdio(StdioSession::spawn(server_name, command, args, cwd.as_deref(), env).await?))
            }
            McpServerConfig::Http { url, headers, timeout: timeout_secs, sse_read_timeout, terminate_on_close } => {
                Ok(Session::Http(HttpSession::connect(
                    url,
                    headers.clone().unwrap_or_default(),
                    bearer_token,
                    *timeout_secs,
                    *sse_read_timeout,
                    *terminate_on_close,
                )?))
            }
        }
    }

    pub async fn list_tools(&self, timeout_ms: u64) -> Result<ListToolsResult> {
        match self {
            Session::Stdio(s) => s.request("tools/list", None, timeout_ms).await,
            Session::Http(s) => s.request("tools/list", None, timeout_ms).await,
        }
    }

    pub async fn list_resources(&self, timeout_ms: u64) -> Result<ListResourcesResult> {
        match self {
            Session::Stdio(s) => s.request("resources/list", None, timeout_ms).await,
            Session::Http(s) => s.request("resources/list", None, timeout_ms).await,
        }
    }

    pub async fn call_tool(&self, name: &str, arguments: Value, timeout_ms: u64) -> Result<CallToolResult> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })
        .map_err(|e| UtcpError::configuration(e.to_string()))?;
        match self {
            Session::Stdio(s) => s.request("tools/call", Some(params), timeout_ms).await,
            Session::Http(s) => s.request("tools/call", Some(params), timeout_ms).await,
        }
    }

    pub async fn read_resource(&self, uri: &str, timeout_ms: u64) -> Result<ReadResourceResult> {
        let params = serde_json::to_value(ReadResourceParams { uri: uri.to_string() })
            .map_err(|e| UtcpError::configuration(e.to_string()))?;
        match self {
            Session::Stdio(s) => s.request("resources/read", Some(params), timeout_ms).await,
            Session::Http(s) => s.request("resources/read", Some(params), timeout_ms).await,
        }
    }

    pub async fn close(self) -> Result<()> {
        match self {
            Session::Stdio(s) => s.close().await,
            Session::Http(s) => s.close().await,
        }
    }
}

fn next_request_id(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::SeqCst)
}

async fn send_initialize_stdio(stdin: &mut ChildStdin, stdout: &mut BufReader<ChildStdout>, counter: &AtomicU64) -> Result<()> {
    let id = next_request_id(counter);
    let request = JsonRpcRequest::new(
        id,
        "initialize",
        Some(serde_json::to_value(InitializeParams::default()).unwrap()),
    );
    write_line(stdin, &request).await?;
    let _: InitializeResult = read_response(stdout, id).await?;

    let notification = JsonRpcNotification {
        jsonrpc: crate::protocol::JSONRPC_VERSION,
        method: "notifications/initialized".to_string(),
        params: None,
    };
    let line = serde_json::to_string(&notification).map_err(|e| UtcpError::configuration(e.to_string()))?;
    stdin
        .write_all(format!("{line}\n").as_bytes())
        .await
        .map_err(|e| UtcpError::transport(TransportErrorKind::Write, e.to_string()))?;
    Ok(())
}

async fn write_line(stdin: &mut ChildStdin, request: &JsonRpcRequest) -> Result<()> {
    let line = serde_json::to_string(request).map_err(|e| UtcpError::configuration(e.to_string()))?;
    if line.contains('\n') {
        return Err(UtcpError::configuration("MCP message must not contain embedded newlines"));
    }
    stdin
        .write_all(format!("{line}\n").as_bytes())
        .await
        .map_err(|e| UtcpError::transport(TransportErrorKind::Write, e.to_string()))?;
    stdin
        .flush()
        .await
        .map_err(|e| UtcpError::transport(TransportErrorKind::Write, e.to_string()))
}

async fn read_response<T: serde::de::DeserializeOwned>(stdout: &mut BufReader<ChildStdout>, id: u64) -> Result<T> {
    loop {
        let mut line = String::new();
        let bytes_read = stdout
            .read_line(&mut line)
            .await
            .map_err(|e| UtcpError::transport(TransportErrorKind::Read, e.to_string()))?;
        if bytes_read == 0 {
            return Err(UtcpError::transport(TransportErrorKind::Closed, "subprocess stdout closed"));
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let response: JsonRpcResponse = match serde_json::from_str(trimmed) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, line = trimmed, "skipping unparseable MCP line");
                continue;
            }
        };
        if response.method.is_some() {
            // Server-initiated notification/request; not what we're waiting for.
            continue;
        }
        let Some(response_id) = response.id.as_ref().and_then(Value::as_u64) else {
            continue;
        };
        if response_id != id {
            continue;
        }
        if let Some(error) = response.error {
            return Err(UtcpError::ToolCall {
                tool_name: String::new(),
                message: format!("{} (code {})", error.message, error.code),
            });
        }
        let result = response.result.unwrap_or(Value::Null);
        return serde_json::from_value(result).map_err(|e| UtcpError::configuration(e.to_string()));
    }
}

/// A session backed by a spawned child process communicating over
/// newline-delimited JSON-RPC on stdin/stdout.
pub struct StdioSession {
    child: tokio::sync::Mutex<Child>,
    stdin: tokio::sync::Mutex<ChildStdin>,
    stdout: tokio::sync::Mutex<BufReader<ChildStdout>>,
    next_id: AtomicU64,
}

impl StdioSession {
    pub async fn spawn(
        server_name: &str,
        command: &str,
        args: &[String],
        cwd: Option<&str>,
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        debug!(server = server_name, command, "spawning MCP stdio server");
        let mut cmd = tokio::process::Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .envs(env);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| UtcpError::transport(TransportErrorKind::Connect, e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| UtcpError::transport(TransportErrorKind::Connect, "no stdin pipe"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| UtcpError::transport(TransportErrorKind::Connect, "no stdout pipe"))?;
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_logger(server_name.to_string(), stderr);
        }

        let counter = AtomicU64::new(1);
        let mut stdin = stdin;
        let mut stdout = BufReader::new(stdout);
        send_initialize_stdio(&mut stdin, &mut stdout, &counter).await?;

        Ok(Self {
            child: tokio::sync::Mutex::new(child),
            stdin: tokio::sync::Mutex::new(stdin),
            stdout: tokio::sync::Mutex::new(stdout),
            next_id: counter,
        })
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
        timeout_ms: u64,
    ) -> Result<T> {
        let id = next_request_id(&self.next_id);
        let request = JsonRpcRequest::new(id, method, params);

        let fut = async {
            let mut stdin = self.stdin.lock().await;
            write_line(&mut stdin, &request).await?;
            drop(stdin);
            let mut stdout = self.stdout.lock().await;
            read_response(&mut stdout, id).await
        };

        match timeout(Duration::from_millis(timeout_ms), fut).await {
            Ok(result) => result,
            Err(_) => Err(UtcpError::Timeout {
                operation: method.to_string(),
                limit_ms: timeout_ms,
            }),
        }
    }

    pub async fn close(self) -> Result<()> {
        // Drop the actual `ChildStdin` handle, not just the mutex guard
        // around it — closing the pipe sends EOF, which is how a stdio MCP
        // server is told to shut down gracefully. Holding on to `self.stdin`
        // until the end of this function (as locking it would) keeps the
        // pipe open for the whole `child.wait()` window below.
        drop(self.stdin.into_inner());
        let mut child = self.child.lock().await;

        if timeout(Duration::from_secs(2), child.wait()).await.is_ok() {
            return Ok(());
        }

        warn!("MCP subprocess did not exit within 2s of stdin close, sending SIGTERM");
        request_termination(&mut child);
        if timeout(Duration::from_millis(500), child.wait()).await.is_ok() {
            return Ok(());
        }

        warn!("MCP subprocess did not exit after SIGTERM, killing");
        let _ = child.kill().await;
        Ok(())
    }
}

/// Asks the child to exit: SIGTERM on unix, `start_kill` (the platform
/// equivalent — `TerminateProcess` on Windows) elsewhere. A stubborn process
/// still gets escalated to a hard kill by the caller.
fn request_termination(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: `pid` is this child's own process id, obtained from
            // `Child::id()` just above; signalling it with SIGTERM is safe.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }
}

fn spawn_stderr_logger(server_name: String, stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(server = %server_name, stderr = %line, "MCP server stderr");
        }
    });
}

/// A session backed by a streamable-HTTP MCP endpoint. Each JSON-RPC request
/// is a single POST; both plain-JSON and `text/event-stream` responses are
/// accepted, matching the streamable-HTTP binding's two allowed content
/// types for a response to one request.
pub struct HttpSession {
    client: reqwest::Client,
    url: String,
    headers: HashMap<String, String>,
    bearer_token: Option<String>,
    request_timeout_ms: u64,
    sse_read_timeout_ms: u64,
    terminate_on_close: bool,
    next_id: AtomicU64,
    session_id: tokio::sync::Mutex<Option<String>>,
}

impl HttpSession {
    pub fn connect(
        url: &str,
        headers: HashMap<String, String>,
        bearer_token: Option<&str>,
        timeout_secs: u64,
        sse_read_timeout_secs: u64,
        terminate_on_close: bool,
    ) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            headers,
            bearer_token: bearer_token.map(str::to_string),
            request_timeout_ms: timeout_secs * 1000,
            sse_read_timeout_ms: sse_read_timeout_secs * 1000,
            terminate_on_close,
            next_id: AtomicU64::new(1),
            session_id: tokio::sync::Mutex::new(None),
        })
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
        timeout_ms: u64,
    ) -> Result<T> {
        let id = next_request_id(&self.next_id);
        let request = JsonRpcRequest::new(id, method, params);

        // `timeout_ms` is the per-call deadline (forwarded from the
        // server's `timeout`); `sse_read_timeout_ms` only bounds the SSE
        // read loop within a single request and is kept on the session for
        // that purpose even though this simplified binding issues one POST
        // per request rather than holding a long-lived SSE stream open.
        let fut = self.send_and_parse::<T>(&request);
        match timeout(Duration::from_millis(timeout_ms), fut).await {
            Ok(result) => result,
            Err(_) => Err(UtcpError::Timeout {
                operation: method.to_string(),
                limit_ms: timeout_ms,
            }),
        }
    }

    async fn send_and_parse<T: serde::de::DeserializeOwned>(&self, request: &JsonRpcRequest) -> Result<T> {
        let mut builder = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .json(request);

        for (k, v) in &self.headers {
            builder = builder.header(k, v);
        }
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(session_id) = self.session_id.lock().await.clone() {
            builder = builder.header("Mcp-Session-Id", session_id);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| UtcpError::transport(TransportErrorKind::Connect, e.to_string()))?;

        if let Some(session_id) = response.headers().get("Mcp-Session-Id") {
            if let Ok(value) = session_id.to_str() {
                *self.session_id.lock().await = Some(value.to_string());
            }
        }

        let status = response.status();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| UtcpError::transport(TransportErrorKind::Read, e.to_string()))?;

        if !status.is_success() {
            return Err(UtcpError::transport(TransportErrorKind::Read, format!("HTTP {status}: {body}")));
        }

        let json_text = if content_type.contains("text/event-stream") {
            extract_first_sse_data(&body).ok_or_else(|| {
                UtcpError::transport(TransportErrorKind::Read, "empty SSE response body")
            })?
        } else {
            body
        };

        let envelope: JsonRpcResponse =
            serde_json::from_str(&json_text).map_err(|e| UtcpError::configuration(e.to_string()))?;
        if let Some(error) = envelope.error {
            return Err(UtcpError::ToolCall {
                tool_name: String::new(),
                message: format!("{} (code {})", error.message, error.code),
            });
        }
        let result = envelope.result.unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| UtcpError::configuration(e.to_string()))
    }

    pub async fn close(self) -> Result<()> {
        if !self.terminate_on_close {
            return Ok(());
        }
        let session_id = self.session_id.lock().await.clone();
        if let Some(session_id) = session_id {
            let _ = self
                .client
                .delete(&self.url)
                .header("Mcp-Session-Id", session_id)
                .send()
                .await;
        }
        Ok(())
    }
}

fn extract_first_sse_data(body: &str) -> Option<String> {
    body.lines()
        .find_map(|line| line.strip_prefix("data:").map(|rest| rest.trim().to_string()))
}

impl std::fmt::Debug for StdioSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioSession").finish_non_exhaustive()
    }
}

impl std::fmt::Debug for HttpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSession").field("url", &self.url).finish()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Session::Stdio(s) => s.fmt(f),
            Session::Http(s) => s.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_data_line_from_sse_body() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n";
        let data = extract_first_sse_data(body).unwrap();
        assert!(data.contains("\"result\""));
    }
}
