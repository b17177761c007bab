//! Interpreter process driver.
//!
//! One process per invocation: the request document goes to stdin, the
//! bootstrap writes a single JSON envelope to stdout, and anything the
//! handler prints ends up on stderr.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::adapter::{BUNDLE_ENV, ENTRYPOINT_ENV, ScriptAdapter};
use crate::policy::HostPolicy;
use polyglot_common::{InvocationRequest, InvocationResponse, RuntimeError};
use polyglot_core::LoggingHost;

/// Interpreter stderr kept per invocation; the rest is drained and discarded.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Request document handed to the bootstrap.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRequest {
    /// HTTP method.
    pub method: String,
    /// Request URI including the query string.
    pub uri: String,
    /// Path component of the URI.
    pub path: String,
    /// Request headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Body decoded as UTF-8.
    pub body: String,
    /// Route parameters; `name` is the bundle name.
    pub path_params: BTreeMap<String, String>,
}

impl ScriptRequest {
    /// Build the document for an invocation of `bundle`.
    pub fn new(bundle: &str, request: &InvocationRequest) -> Self {
        let path = request
            .uri
            .split_once('?')
            .map_or(request.uri.as_str(), |(path, _)| path)
            .to_string();

        Self {
            method: request.method.clone(),
            uri: request.uri.clone(),
            path,
            headers: request.headers.clone(),
            body: request.body_text(),
            path_params: BTreeMap::from([("name".to_string(), bundle.to_string())]),
        }
    }
}

/// Envelope written by the bootstrap.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    ok: bool,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    headers: Vec<(String, String)>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl Envelope {
    /// Convert into the handler's response or the failure it reported.
    pub fn into_response(self, adapter: ScriptAdapter) -> Result<InvocationResponse, RuntimeError> {
        if self.ok {
            return Ok(InvocationResponse {
                status: self.status.unwrap_or(200),
                headers: self.headers,
                body: self.body.into_bytes(),
            });
        }

        let reason = self
            .message
            .unwrap_or_else(|| "handler failed without a message".to_string());

        match self.stage.as_deref() {
            Some("load") => Err(RuntimeError::HandlerLoadFailed {
                language: adapter.language().to_string(),
                reason,
            }),
            _ => Err(RuntimeError::execution_failed(reason)),
        }
    }
}

/// Everything needed to start one interpreter process.
#[derive(Debug, Clone)]
pub struct Launch {
    /// Language adapter.
    pub adapter: ScriptAdapter,
    /// Interpreter program.
    pub program: String,
    /// Bundle name.
    pub bundle: String,
    /// Bundle root, the working directory.
    pub directory: PathBuf,
    /// Absolute entrypoint path.
    pub entrypoint: PathBuf,
    /// Trust policy.
    pub policy: HostPolicy,
    /// Deadline for the whole process.
    pub timeout: Duration,
    /// Upper bound on the envelope size.
    pub max_output_bytes: usize,
}

/// Run the interpreter for one request.
///
/// The child is killed when the deadline passes or the future is dropped.
///
/// # Errors
///
/// Returns [`RuntimeError::InterpreterUnavailable`] if the program cannot be
/// started, [`RuntimeError::ExecutionTimeout`] on deadline expiry, and the
/// failure reported by the bootstrap otherwise.
pub async fn run(
    launch: &Launch,
    request: &ScriptRequest,
    logs: &mut LoggingHost,
) -> Result<InvocationResponse, RuntimeError> {
    let input = serde_json::to_vec(request)
        .map_err(|e| RuntimeError::execution_failed(format!("Failed to encode request: {e}")))?;

    let mut command = Command::new(&launch.program);
    command
        .args(launch.adapter.args())
        .current_dir(&launch.directory)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    launch.policy.apply(&mut command, &launch.directory);
    command
        .env(ENTRYPOINT_ENV, &launch.entrypoint)
        .env(BUNDLE_ENV, &launch.bundle);

    let start = Instant::now();
    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RuntimeError::InterpreterUnavailable {
                language: launch.adapter.language().to_string(),
                program: launch.program.clone(),
            }
        } else {
            RuntimeError::Io(e)
        }
    })?;

    if let Some(mut stdin) = child.stdin.take() {
        tokio::spawn(async move {
            // A handler that exits without reading stdin closes the pipe early.
            if let Err(e) = stdin.write_all(&input).await {
                debug!(error = %e, "Interpreter stdin closed early");
            }
        });
    }

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(RuntimeError::execution_failed(
            "interpreter output streams were not captured",
        ));
    };

    let exchange = async {
        let (stdout, stderr) = tokio::try_join!(
            read_stdout(stdout, launch.max_output_bytes),
            read_stderr(stderr),
        )?;
        let status = child.wait().await?;
        Ok::<_, RuntimeError>((status, stdout, stderr))
    };
    let outcome = tokio::time::timeout(launch.timeout, exchange).await;

    let (status, stdout, stderr) = match outcome {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            if let Err(kill) = child.start_kill() {
                debug!(error = %kill, "Interpreter already exited");
            }
            warn!(bundle = %launch.bundle, error = %e, "Interpreter killed");
            return Err(e);
        }
        Err(_) => {
            warn!(
                bundle = %launch.bundle,
                timeout_ms = launch.timeout.as_millis(),
                "Interpreter killed after deadline"
            );
            return Err(RuntimeError::ExecutionTimeout {
                duration_ms: u64::try_from(launch.timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }
    };

    logs.log_stream(&stderr);
    debug!(
        bundle = %launch.bundle,
        status = ?status.code(),
        duration_ms = start.elapsed().as_millis(),
        stdout_len = stdout.len(),
        "Interpreter exited"
    );

    let envelope: Envelope = serde_json::from_slice(&stdout).map_err(|e| {
        let mut reason = format!("interpreter exited ({status}) without a response envelope: {e}");
        if let Some(entry) = logs.entries().last() {
            reason.push_str("; last stderr line: ");
            reason.push_str(&entry.message);
        }
        RuntimeError::execution_failed(reason)
    })?;

    envelope.into_response(launch.adapter)
}

/// Read the envelope, failing as soon as it grows past `limit`.
async fn read_stdout<R: AsyncRead + Unpin>(
    reader: R,
    limit: usize,
) -> Result<Vec<u8>, RuntimeError> {
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut buf = Vec::new();
    reader.take(cap).read_to_end(&mut buf).await?;

    if buf.len() > limit {
        return Err(RuntimeError::execution_failed(format!(
            "handler output exceeds {limit} bytes"
        )));
    }
    Ok(buf)
}

/// Keep the first [`MAX_STDERR_BYTES`] of stderr; the rest is drained.
async fn read_stderr<R: AsyncRead + Unpin>(mut reader: R) -> Result<Vec<u8>, RuntimeError> {
    let mut buf = Vec::new();
    (&mut reader)
        .take(MAX_STDERR_BYTES as u64)
        .read_to_end(&mut buf)
        .await?;
    tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok(buf)
}
