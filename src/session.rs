//! ProviderSession — one supervised child process speaking line-delimited
//! JSON-RPC on stdio.
//!
//! State is monotonic: `Spawned` → `Initialized` → `Ready` → `Dead`. Once
//! `Dead`, a session never recovers; the [`crate::Supervisor`] must load a
//! fresh one. Two locks guard concurrent access: the supervisor's registry
//! lock (not held here) and this session's own `io` lock, which serializes
//! the write-request/read-response pair of a single call so two concurrent
//! callers never interleave frames on the child's stdio.

use crate::codec::{self, Message};
use crate::config::ProviderDecl;
use crate::error::ProviderError;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::{watch, Mutex, RwLock};

/// Default deadline for the `initialize` handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);
/// Default deadline for `tools/list` discovery.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(2);
/// Default per-call deadline for `tools/call`.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// How many stale (mismatched-id) response lines a single call will skip
/// before giving up and declaring the provider dead. Bounds the cost of a
/// call that wins a race against a previous timed-out call whose response
/// arrives late.
const MAX_STALE_RESPONSES_SKIPPED: u32 = 8;

/// Grace window after spawning a child before polling whether it already
/// exited (a bad command often execs then exits almost immediately).
const SPAWN_GRACE: Duration = Duration::from_millis(500);

/// Pause after sending `notifications/initialized` to let the child settle
/// before `tools/list` is sent.
const INITIALIZED_SETTLE: Duration = Duration::from_millis(100);

/// A tool a provider has self-reported via `tools/list`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
}

/// Lifecycle state of a [`ProviderSession`]. Monotonic; `Dead` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Spawned,
    Initialized,
    Ready,
    Dead,
}

struct SessionIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// One live child tool-provider process and its JSON-RPC session.
pub struct ProviderSession {
    name: String,
    child: Mutex<Child>,
    io: Mutex<SessionIo>,
    next_id: AtomicU64,
    state_tx: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,
    tools: RwLock<HashMap<String, ToolDescriptor>>,
}

impl ProviderSession {
    /// Spawn the child process declared by `decl`. The session starts in
    /// `Spawned` state; callers must still call [`handshake`](Self::handshake)
    /// and [`discover`](Self::discover) before issuing calls.
    ///
    /// Waits a short grace window (≈500ms) then polls the child: a command
    /// that execs but exits almost immediately (typo'd binary, missing
    /// argument, etc.) is reported as `SpawnError` here rather than
    /// surfacing later as a confusing handshake failure.
    #[tracing::instrument(skip(decl), fields(provider = %decl.name))]
    pub async fn spawn(decl: &ProviderDecl) -> crate::Result<Arc<Self>> {
        let mut command = tokio::process::Command::new(&decl.command);
        command
            .args(&decl.args)
            .envs(&decl.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            ProviderError::SpawnError(decl.name.clone(), e.to_string())
        })?;

        tokio::time::sleep(SPAWN_GRACE).await;
        if let Ok(Some(status)) = child.try_wait() {
            return Err(ProviderError::SpawnError(
                decl.name.clone(),
                format!("exited during startup: {status}"),
            ));
        }

        let stdin = child.stdin.take().ok_or_else(|| {
            ProviderError::SpawnError(decl.name.clone(), "child has no stdin".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            ProviderError::SpawnError(decl.name.clone(), "child has no stdout".to_string())
        })?;

        let (state_tx, state_rx) = watch::channel(SessionState::Spawned);
        tracing::info!(provider = %decl.name, "provider spawned");

        Ok(Arc::new(Self {
            name: decl.name.clone(),
            child: Mutex::new(child),
            io: Mutex::new(SessionIo {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            next_id: AtomicU64::new(3),
            state_tx,
            state_rx,
            tools: RwLock::new(HashMap::new()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Whether the child process is still running, per a non-blocking poll.
    pub async fn is_alive(&self) -> bool {
        if self.state() == SessionState::Dead {
            return false;
        }
        let mut child = self.child.lock().await;
        matches!(child.try_wait(), Ok(None))
    }

    fn set_state(&self, state: SessionState) {
        let _ = self.state_tx.send(state);
    }

    fn mark_dead(&self, reason: &str) {
        tracing::warn!(provider = %self.name, reason, "provider marked dead");
        self.set_state(SessionState::Dead);
    }

    /// Send `initialize` (id=1) and wait for its response, then send
    /// `notifications/initialized`. Any malformed or error response kills
    /// the session.
    #[tracing::instrument(skip(self), fields(provider = %self.name))]
    pub async fn handshake(&self, timeout: Duration) -> crate::Result<()> {
        let request = codec::request(
            Value::from(1),
            "initialize",
            Some(serde_json::json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {"tools": {}, "resources": {}, "prompts": {}},
                "clientInfo": {"name": "tool-bridge", "version": env!("CARGO_PKG_VERSION")},
            })),
        );

        let response = tokio::time::timeout(timeout, self.write_and_read(&request))
            .await
            .map_err(|_| {
                self.mark_dead("handshake timeout");
                ProviderError::HandshakeError(self.name.clone(), "timed out".to_string())
            })??;

        match response {
            Message::Response { error: Some(e), .. } => {
                self.mark_dead("handshake error response");
                Err(ProviderError::HandshakeError(self.name.clone(), e.message))
            }
            Message::Response { result: Some(_), .. } => {
                let notice = codec::notification("notifications/initialized", None);
                self.write_only(&notice).await?;
                tokio::time::sleep(INITIALIZED_SETTLE).await;
                self.set_state(SessionState::Initialized);
                tracing::info!(provider = %self.name, "handshake complete");
                Ok(())
            }
            other => {
                self.mark_dead("malformed handshake response");
                Err(ProviderError::HandshakeError(
                    self.name.clone(),
                    format!("unexpected frame: {other:?}"),
                ))
            }
        }
    }

    /// Send `tools/list` (id=2) and populate the tool catalog from the result.
    ///
    /// Callable again on an already-`Ready` session to refresh its catalog
    /// (used by [`crate::Supervisor::refresh`]); only `Spawned` (handshake
    /// not yet done) and `Dead` sessions are rejected.
    #[tracing::instrument(skip(self), fields(provider = %self.name))]
    pub async fn discover(&self, timeout: Duration) -> crate::Result<()> {
        if matches!(self.state(), SessionState::Spawned | SessionState::Dead) {
            return Err(ProviderError::ProtocolError(
                self.name.clone(),
                "discover called before handshake completed, or after the provider died".to_string(),
            ));
        }

        let request = codec::request(Value::from(2), "tools/list", None);
        let response = tokio::time::timeout(timeout, self.write_and_read(&request))
            .await
            .map_err(|_| {
                self.mark_dead("discovery timeout");
                ProviderError::DiscoveryError(self.name.clone(), "timed out".to_string())
            })??;

        let tools = match response {
            Message::Response { error: Some(e), .. } => {
                self.mark_dead("discovery error response");
                return Err(ProviderError::DiscoveryError(self.name.clone(), e.message));
            }
            Message::Response { result: Some(result), .. } => {
                parse_tool_list(&result).ok_or_else(|| {
                    ProviderError::DiscoveryError(
                        self.name.clone(),
                        "result.tools was not an array of tool objects".to_string(),
                    )
                })?
            }
            other => {
                self.mark_dead("malformed discovery response");
                return Err(ProviderError::DiscoveryError(
                    self.name.clone(),
                    format!("unexpected frame: {other:?}"),
                ));
            }
        };

        let count = tools.len();
        {
            let mut catalog = self.tools.write().await;
            catalog.clear();
            for tool in tools {
                catalog.insert(tool.name.clone(), tool);
            }
        }
        self.set_state(SessionState::Ready);
        tracing::info!(provider = %self.name, tool_count = count, "tools discovered");
        Ok(())
    }

    /// Currently discovered tools, in no particular order.
    pub async fn tools(&self) -> Vec<ToolDescriptor> {
        self.tools.read().await.values().cloned().collect()
    }

    pub async fn tool_names(&self) -> Vec<String> {
        self.tools.read().await.keys().cloned().collect()
    }

    pub async fn has_tool(&self, tool_name: &str) -> bool {
        self.tools.read().await.contains_key(tool_name)
    }

    /// Invoke `tools/call` for `tool_name` with `arguments`, returning the
    /// unwrapped result.
    ///
    /// Per the result-unwrapping rule: if the response carries
    /// `result.content[0].text`, that text is parsed as JSON when possible,
    /// otherwise returned as a plain string value. If there is no `content`
    /// field, the raw `result` is returned as-is.
    #[tracing::instrument(skip(self, arguments), fields(provider = %self.name, tool = %tool_name))]
    pub async fn call(
        &self,
        tool_name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> crate::Result<Value> {
        let state = self.state();
        if state != SessionState::Ready {
            self.mark_dead("call issued while not ready");
            return Err(ProviderError::ProviderDead(
                self.name.clone(),
                format!("not ready for calls (state was {state:?})"),
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = codec::request(
            Value::from(id),
            "tools/call",
            Some(serde_json::json!({"name": tool_name, "arguments": arguments})),
        );

        let result = tokio::time::timeout(timeout, self.write_and_read_matching(&request, id))
            .await
            .map_err(|_| ProviderError::Timeout(self.name.clone(), timeout))?;

        match result {
            Ok(Message::Response { error: Some(e), .. }) => {
                Err(ProviderError::RemoteError(self.name.clone(), e.message))
            }
            Ok(Message::Response { result: Some(result), .. }) => Ok(unwrap_result(result)),
            Ok(Message::Response { result: None, error: None, .. }) => Ok(Value::Null),
            Ok(other) => {
                self.mark_dead("malformed call response");
                Err(ProviderError::ProtocolError(
                    self.name.clone(),
                    format!("unexpected frame: {other:?}"),
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Tear down the child process. Waits briefly for a natural exit (the
    /// child may already be dead), then force-kills if it's still running.
    #[tracing::instrument(skip(self), fields(provider = %self.name))]
    pub async fn terminate(&self, grace: Duration) {
        self.set_state(SessionState::Dead);
        let mut child = self.child.lock().await;
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(_) => tracing::info!(provider = %self.name, "provider exited"),
            Err(_) => {
                tracing::warn!(provider = %self.name, "provider did not exit in time, killing");
                let _ = child.kill().await;
            }
        }
    }

    async fn write_only(&self, message: &Message) -> crate::Result<()> {
        let mut io = self.io.lock().await;
        let bytes = codec::encode(message);
        io.stdin.write_all(&bytes).await.map_err(|e| {
            self.mark_dead("stdin write failed");
            ProviderError::ProviderDead(self.name.clone(), e.to_string())
        })?;
        io.stdin.flush().await.map_err(|e| {
            self.mark_dead("stdin flush failed");
            ProviderError::ProviderDead(self.name.clone(), e.to_string())
        })
    }

    async fn write_and_read(&self, message: &Message) -> crate::Result<Message> {
        let mut io = self.io.lock().await;
        let bytes = codec::encode(message);
        io.stdin.write_all(&bytes).await.map_err(|e| {
            ProviderError::ProviderDead(self.name.clone(), e.to_string())
        })?;
        io.stdin.flush().await.map_err(|e| {
            ProviderError::ProviderDead(self.name.clone(), e.to_string())
        })?;
        read_one_frame(&mut io.stdout, &self.name).await
    }

    /// Like [`write_and_read`](Self::write_and_read), but skips any response
    /// lines whose `id` doesn't match `expected_id` (bounded), to tolerate a
    /// late response from a previous call that timed out.
    async fn write_and_read_matching(
        &self,
        message: &Message,
        expected_id: u64,
    ) -> crate::Result<Message> {
        let mut io = self.io.lock().await;
        let bytes = codec::encode(message);
        io.stdin.write_all(&bytes).await.map_err(|e| {
            ProviderError::ProviderDead(self.name.clone(), e.to_string())
        })?;
        io.stdin.flush().await.map_err(|e| {
            ProviderError::ProviderDead(self.name.clone(), e.to_string())
        })?;

        for _ in 0..=MAX_STALE_RESPONSES_SKIPPED {
            let frame = read_one_frame(&mut io.stdout, &self.name).await?;
            match &frame {
                Message::Response { id, .. } if id == &Value::from(expected_id) => {
                    return Ok(frame);
                }
                Message::Response { .. } => {
                    tracing::warn!(provider = %self.name, "skipping stale response");
                    continue;
                }
                _ => continue,
            }
        }
        drop(io);
        self.mark_dead("exhausted stale-response skip budget");
        Err(ProviderError::ProviderDead(
            self.name.clone(),
            "no matching response after skipping stale frames".to_string(),
        ))
    }
}

async fn read_one_frame(
    stdout: &mut BufReader<ChildStdout>,
    provider_name: &str,
) -> crate::Result<Message> {
    loop {
        let mut line = String::new();
        let n = stdout.read_line(&mut line).await.map_err(|e| {
            ProviderError::ProviderDead(provider_name.to_string(), e.to_string())
        })?;
        if n == 0 {
            return Err(ProviderError::ProviderDead(
                provider_name.to_string(),
                "stdout closed".to_string(),
            ));
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match codec::decode_line(trimmed) {
            Ok(message) => return Ok(message),
            Err(_) => {
                tracing::debug!(provider = %provider_name, "discarding non-JSON-RPC line");
                continue;
            }
        }
    }
}

fn parse_tool_list(result: &Value) -> Option<Vec<ToolDescriptor>> {
    let tools = result.get("tools")?.as_array()?;
    let mut out = Vec::with_capacity(tools.len());
    for entry in tools {
        let name = entry.get("name")?.as_str()?.to_string();
        let description = entry
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        let input_schema = entry.get("inputSchema").cloned();
        out.push(ToolDescriptor {
            name,
            description,
            input_schema,
        });
    }
    Some(out)
}

/// Unwrap `result.content[0].text`, parsing it as JSON when possible and
/// falling back to the raw string otherwise. If there is no `content` array,
/// the result is returned unchanged.
fn unwrap_result(result: Value) -> Value {
    let Some(text) = result
        .get("content")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|item| item.get("text"))
        .and_then(Value::as_str)
    else {
        return result;
    };
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
