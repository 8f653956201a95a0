//! JSON-lines transport over a backend process's stdin/stdout.
//!
//! Each request is one line on the backend's stdin; each response is one
//! line on its stdout carrying the request's id. A single reader task routes
//! responses to callers through the in-flight table, so concurrent calls may
//! be answered in any order. When the stream ends every waiting caller fails
//! with a transport error naming its method, and later calls fail
//! immediately.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use metrics::{counter, histogram};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::Transport;
use crate::errors::{Result, RpcError};
use crate::types::{RpcRequest, RpcResponse};

/// Longest response line accepted from the backend.
const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Calls slower than this are logged at `warn`.
const SLOW_CALL_THRESHOLD: Duration = Duration::from_secs(5);

type LineWriter = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, LinesCodec>;

// ── In-flight table ─────────────────────────────────────────────────

struct InFlight {
    method: String,
    started: Instant,
    reply: oneshot::Sender<Result<Value>>,
}

/// Requests written to the backend and not yet answered, keyed by id.
///
/// Once closed it stays closed: every new request is refused.
#[derive(Default)]
struct InFlightTable {
    calls: HashMap<String, InFlight>,
    closed: bool,
}

impl InFlightTable {
    fn open(&mut self, id: &str, method: &str) -> Result<oneshot::Receiver<Result<Value>>> {
        if self.closed {
            return Err(RpcError::transport("backend connection closed"));
        }
        let (reply, rx) = oneshot::channel();
        let _ = self.calls.insert(
            id.to_owned(),
            InFlight {
                method: method.to_owned(),
                started: Instant::now(),
                reply,
            },
        );
        Ok(rx)
    }

    /// Hand a response to its caller. Returns the method and how long the
    /// backend took, or `None` for an unknown or abandoned id.
    fn complete(&mut self, response: RpcResponse) -> Option<(String, Duration)> {
        let call = self.calls.remove(&response.id)?;
        let elapsed = call.started.elapsed();
        call.reply.send(response.into_result()).ok()?;
        Some((call.method, elapsed))
    }

    fn abandon(&mut self, id: &str) {
        let _ = self.calls.remove(id);
    }

    /// Refuse further requests and fail every waiting caller. Returns how
    /// many callers were failed.
    fn close(&mut self, reason: &str) -> usize {
        self.closed = true;
        let orphaned = self.calls.len();
        for (_, call) in self.calls.drain() {
            let _ = call.reply.send(Err(RpcError::transport(format!(
                "{reason} before responding to {}",
                call.method
            ))));
        }
        orphaned
    }

    fn len(&self) -> usize {
        self.calls.len()
    }
}

// ── Transport ───────────────────────────────────────────────────────

/// Transport speaking newline-delimited JSON to a child process.
pub struct StdioTransport {
    writer: tokio::sync::Mutex<LineWriter>,
    in_flight: Arc<Mutex<InFlightTable>>,
    timeout: Duration,
    shutdown: CancellationToken,
    child: Mutex<Option<Child>>,
}

impl StdioTransport {
    /// Spawn `command` and speak to it over its stdio pipes.
    ///
    /// The backend's stderr is inherited so its logs reach the terminal.
    pub fn spawn(command: &str, args: &[String], timeout: Duration) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RpcError::transport(format!("failed to spawn '{command}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RpcError::transport("backend stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RpcError::transport("backend stdout unavailable"))?;

        debug!(command, pid = child.id(), "spawned backend process");
        let transport = Self::from_io(stdout, stdin, timeout);
        *transport.child.lock() = Some(child);
        Ok(transport)
    }

    /// Speak to an already-connected reader/writer pair.
    ///
    /// Must be called inside a tokio runtime: the reader task is spawned here.
    pub fn from_io<R, W>(reader: R, writer: W, timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let in_flight = Arc::new(Mutex::new(InFlightTable::default()));
        let shutdown = CancellationToken::new();

        let lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
        drop(tokio::spawn(read_loop(
            lines,
            Arc::clone(&in_flight),
            shutdown.clone(),
        )));

        let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        Self {
            writer: tokio::sync::Mutex::new(FramedWrite::new(boxed, LinesCodec::new())),
            in_flight,
            timeout,
            shutdown,
            child: Mutex::new(None),
        }
    }

    /// Whether the response stream has ended.
    pub fn is_closed(&self) -> bool {
        self.in_flight.lock().closed
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Stop the reader task and kill the child process, if any.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(mut child) = self.child.lock().take() {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "backend already exited");
            }
        }
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl Transport for StdioTransport {
    #[instrument(skip(self, params))]
    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let request = RpcRequest::new(method, params);
        let line = serde_json::to_string(&request)?;
        let rx = self.in_flight.lock().open(&request.id, method)?;

        counter!("backend_requests_total", "method" => method.to_owned()).increment(1);
        let start = Instant::now();

        if let Err(e) = self.writer.lock().await.send(line).await {
            self.in_flight.lock().abandon(&request.id);
            counter!("backend_errors_total", "method" => method.to_owned(), "error_type" => "write").increment(1);
            return Err(RpcError::transport(format!("failed to write request: {e}")));
        }

        let outcome = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RpcError::transport("backend closed before responding")),
            Err(_elapsed) => {
                self.in_flight.lock().abandon(&request.id);
                Err(RpcError::Timeout {
                    method: method.to_owned(),
                    after: self.timeout,
                })
            }
        };

        let duration = start.elapsed();
        histogram!("backend_request_duration_seconds", "method" => method.to_owned())
            .record(duration.as_secs_f64());
        if duration >= SLOW_CALL_THRESHOLD {
            warn!(method, duration_secs = duration.as_secs_f64(), "slow backend request");
        }
        if let Err(ref err) = outcome {
            counter!("backend_errors_total", "method" => method.to_owned(), "error_type" => err.code().to_owned()).increment(1);
            debug!(method, code = err.code(), error = %err, "backend call failed");
        }
        outcome
    }
}

async fn read_loop<R>(
    mut lines: FramedRead<R, LinesCodec>,
    in_flight: Arc<Mutex<InFlightTable>>,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Send + Unpin,
{
    let reason = loop {
        tokio::select! {
            () = shutdown.cancelled() => break "transport shut down",
            next = lines.next() => match next {
                Some(Ok(line)) => route_line(&in_flight, &line),
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    warn!(limit = MAX_LINE_BYTES, "backend response line too long, discarding");
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    warn!(error = %e, "backend stdout read failed");
                    break "backend stdout failed";
                }
                None => {
                    debug!("backend stdout closed");
                    break "backend exited";
                }
            },
        }
    };

    let orphaned = in_flight.lock().close(reason);
    if orphaned > 0 {
        warn!(orphaned, reason, "backend stream ended with requests in flight");
    }
}

fn route_line(in_flight: &Mutex<InFlightTable>, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<RpcResponse>(line) {
        Ok(response) => {
            let id = response.id.clone();
            match in_flight.lock().complete(response) {
                Some((method, elapsed)) => {
                    debug!(id, method, backend_ms = elapsed.as_millis(), "response routed");
                }
                None => debug!(id, "response for unknown or abandoned request"),
            }
        }
        Err(e) => warn!(error = %e, "ignoring malformed backend line"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
