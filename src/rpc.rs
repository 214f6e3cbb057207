//! JSON-RPC stdio client (C12): spawn a child process, speak
//! newline-delimited JSON-RPC 2.0 over its stdin/stdout, and expose an
//! MCP-style `initialize` handshake plus `call_tool`.
//!
//! Grounded on the teacher's poll-loop-with-deadline process management
//! (spawn, `try_wait` in a sleep loop until a deadline, then kill) and
//! its three-mutex discipline: reads, writes, and request-id generation
//! are serialized independently so a blocked read never blocks a
//! concurrent write, and vice versa.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Error, Diagnostic)]
pub enum RpcError {
    #[error("failed to spawn RPC server process: {0}")]
    #[diagnostic(code(noesis::rpc::spawn_failed))]
    SpawnFailed(std::io::Error),

    #[error("RPC server did not become ready within {0:?}")]
    #[diagnostic(
        code(noesis::rpc::not_ready),
        help("Set `assume_ready_on_timeout` to proceed anyway once the startup banner check is unreliable.")
    )]
    NotReady(Duration),

    #[error("transport error: {0}")]
    #[diagnostic(code(noesis::rpc::transport))]
    Transport(String),

    #[error("request \"{method}\" timed out after {timeout:?}")]
    #[diagnostic(code(noesis::rpc::timeout))]
    Timeout { method: String, timeout: Duration },

    #[error("tool \"{tool_name}\" call failed: {underlying}")]
    #[diagnostic(code(noesis::rpc::tool_call_failed))]
    ToolCallFailed {
        trace_id: String,
        request_id: u64,
        tool_name: String,
        latency: Duration,
        underlying: String,
    },

    #[error("RPC error response for \"{operation}\": {underlying}")]
    #[diagnostic(code(noesis::rpc::error_response))]
    ErrorResponse {
        trace_id: String,
        request_id: u64,
        operation: String,
        latency: Duration,
        underlying: String,
    },
}

pub type RpcResult<T> = std::result::Result<T, RpcError>;

impl RpcError {
    /// Whether a retry loop should try again for this error. RPC error
    /// *responses* (the server understood the request and rejected it)
    /// are never retried; transport-level failures and timeouts are.
    fn is_retryable(&self) -> bool {
        matches!(self, RpcError::Transport(_) | RpcError::Timeout { .. })
    }
}

#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub startup_timeout: Duration,
    pub request_timeout: Duration,
    pub shutdown_timeout: Duration,
    /// A substring expected on the child's stderr once it is ready to
    /// accept requests.
    pub ready_banner: Option<String>,
    /// If the ready banner never appears before `startup_timeout`,
    /// proceed anyway rather than failing the spawn outright. Readiness
    /// detection by stderr substring is inherently best-effort across
    /// server implementations; this flag trades a false negative for a
    /// false positive when that tradeoff is preferred.
    pub assume_ready_on_timeout: bool,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            ready_banner: None,
            assume_ready_on_timeout: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: JsonValue,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    #[allow(dead_code)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<JsonValue>,
    #[serde(default)]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<JsonValue>,
}

/// A JSON-RPC stdio client bound to one spawned child process.
pub struct RpcClient {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    next_id: AtomicU64,
    config: RpcClientConfig,
}

impl RpcClient {
    /// Spawn `command` with `args`, wait for readiness, and perform the
    /// MCP-style `initialize`/`initialized` handshake.
    pub fn spawn(command: &str, args: &[&str], config: RpcClientConfig) -> RpcResult<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(RpcError::SpawnFailed)?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = BufReader::new(child.stdout.take().expect("piped stdout"));
        let stderr = child.stderr.take();

        let ready = wait_for_ready(stderr, &config);
        if !ready && !config.assume_ready_on_timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(RpcError::NotReady(config.startup_timeout));
        }

        let client = Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(stdout),
            next_id: AtomicU64::new(1),
            config,
        };

        client.call("initialize", serde_json::json!({}))?;
        client.notify("initialized", serde_json::json!({}))?;
        Ok(client)
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Send a request and block for its response, retrying
    /// transport/timeout failures with capped exponential backoff.
    /// RPC error responses are never retried.
    pub fn call(&self, method: &str, params: JsonValue) -> RpcResult<JsonValue> {
        let mut backoff = INITIAL_BACKOFF;
        let mut last_err = None;

        for attempt in 0..=MAX_RETRIES {
            match self.call_once(method, &params) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < MAX_RETRIES => {
                    tracing::debug!(method, attempt, backoff_ms = backoff.as_millis() as u64, "retrying RPC call");
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.expect("loop always returns or sets last_err before exhausting retries"))
    }

    fn call_once(&self, method: &str, params: &JsonValue) -> RpcResult<JsonValue> {
        let id = self.next_request_id();
        let request = JsonRpcRequest { jsonrpc: "2.0", id, method, params: params.clone() };
        let line = serde_json::to_string(&request).map_err(|e| RpcError::Transport(e.to_string()))?;

        {
            let mut stdin = self.stdin.lock().expect("stdin lock poisoned");
            writeln!(stdin, "{line}").map_err(|e| RpcError::Transport(e.to_string()))?;
            stdin.flush().map_err(|e| RpcError::Transport(e.to_string()))?;
        }

        let deadline = Instant::now() + self.config.request_timeout;
        let mut response_line = String::new();
        {
            let mut stdout = self.stdout.lock().expect("stdout lock poisoned");
            loop {
                response_line.clear();
                let read = stdout
                    .read_line(&mut response_line)
                    .map_err(|e| RpcError::Transport(e.to_string()))?;
                if read == 0 {
                    return Err(RpcError::Transport("server closed stdout".to_string()));
                }
                if !response_line.trim().is_empty() {
                    break;
                }
                if Instant::now() >= deadline {
                    return Err(RpcError::Timeout { method: method.to_string(), timeout: self.config.request_timeout });
                }
            }
        }

        let response: JsonRpcResponse =
            serde_json::from_str(response_line.trim()).map_err(|e| RpcError::Transport(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(RpcError::ErrorResponse {
                trace_id: format!("trace_{id}"),
                request_id: id,
                operation: method.to_string(),
                latency: Duration::ZERO,
                underlying: format!("[{}] {}{}", error.code, error.message, error.data.map(|d| format!(" ({d})")).unwrap_or_default()),
            });
        }

        Ok(response.result.unwrap_or(JsonValue::Null))
    }

    /// Fire-and-forget notification: same wire shape as `call` but with
    /// no `id`, and no response read.
    fn notify(&self, method: &str, params: JsonValue) -> RpcResult<()> {
        #[derive(Serialize)]
        struct Notification<'a> {
            jsonrpc: &'static str,
            method: &'a str,
            params: JsonValue,
        }
        let notification = Notification { jsonrpc: "2.0", method, params };
        let line = serde_json::to_string(&notification).map_err(|e| RpcError::Transport(e.to_string()))?;
        let mut stdin = self.stdin.lock().expect("stdin lock poisoned");
        writeln!(stdin, "{line}").map_err(|e| RpcError::Transport(e.to_string()))?;
        stdin.flush().map_err(|e| RpcError::Transport(e.to_string()))
    }

    /// Invoke `tools/call` for `tool_name`, wrapping the generic
    /// `call` error with tool-call-specific context.
    pub fn call_tool(&self, tool_name: &str, arguments: JsonValue) -> RpcResult<JsonValue> {
        let started = Instant::now();
        self.call("tools/call", serde_json::json!({ "name": tool_name, "arguments": arguments })).map_err(|err| {
            if let RpcError::ErrorResponse { trace_id, request_id, underlying, .. } = err {
                RpcError::ToolCallFailed {
                    trace_id,
                    request_id,
                    tool_name: tool_name.to_string(),
                    latency: started.elapsed(),
                    underlying,
                }
            } else {
                err
            }
        })
    }

    /// Terminate the child process gracefully: a SIGINT-equivalent kill
    /// request, then a bounded wait, then a forceful kill if it hasn't
    /// exited. Mirrors the teacher's timeout poll loop for shell
    /// subprocess management.
    pub fn shutdown(&self) -> RpcResult<()> {
        let mut child = self.child.lock().expect("child lock poisoned");

        #[cfg(unix)]
        {
            let pid = child.id() as i32;
            unsafe {
                libc_kill(pid, 2); // SIGINT
            }
        }

        let deadline = Instant::now() + self.config.shutdown_timeout;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => return Ok(()),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Ok(());
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(RpcError::Transport(e.to_string())),
            }
        }
    }
}

#[cfg(unix)]
unsafe extern "C" {
    #[link_name = "kill"]
    fn libc_kill(pid: i32, sig: i32) -> i32;
}

/// Read the child's stderr looking for `config.ready_banner` until it
/// appears or `config.startup_timeout` elapses. Readiness detection is
/// best-effort: servers that print nothing recognizable on startup fall
/// through to the timeout, and the caller decides via
/// `assume_ready_on_timeout` whether that counts as ready.
fn wait_for_ready(stderr: Option<std::process::ChildStderr>, config: &RpcClientConfig) -> bool {
    let Some(banner) = &config.ready_banner else {
        return false;
    };
    let Some(stderr) = stderr else {
        return false;
    };

    let mut reader = BufReader::new(stderr);
    let deadline = Instant::now() + config.startup_timeout;
    let mut line = String::new();
    while Instant::now() < deadline {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) if line.contains(banner.as_str()) => return true,
            Ok(_) => continue,
            Err(_) => break,
        }
    }
    false
}

/// Structured error envelope surfaced to callers of a tool call, per
/// the spec's `{trace_id, request_id, operation, tool_name?, latency,
/// underlying}` shape. Constructed from [`RpcError`] variants that
/// carry this context.
#[derive(Debug, Clone, Serialize)]
pub struct RpcErrorEnvelope {
    pub trace_id: String,
    pub request_id: u64,
    pub operation: String,
    pub tool_name: Option<String>,
    pub latency: Duration,
    pub underlying: String,
}

impl From<&RpcError> for Option<RpcErrorEnvelope> {
    fn from(err: &RpcError) -> Self {
        match err {
            RpcError::ToolCallFailed { trace_id, request_id, tool_name, latency, underlying } => {
                Some(RpcErrorEnvelope {
                    trace_id: trace_id.clone(),
                    request_id: *request_id,
                    operation: "tools/call".to_string(),
                    tool_name: Some(tool_name.clone()),
                    latency: *latency,
                    underlying: underlying.clone(),
                })
            }
            RpcError::ErrorResponse { trace_id, request_id, operation, latency, underlying } => {
                Some(RpcErrorEnvelope {
                    trace_id: trace_id.clone(),
                    request_id: *request_id,
                    operation: operation.clone(),
                    tool_name: None,
                    latency: *latency,
                    underlying: underlying.clone(),
                })
            }
            _ => None,
        }
    }
}
