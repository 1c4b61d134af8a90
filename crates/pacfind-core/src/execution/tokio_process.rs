use std::future::pending;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::PrivilegedConfig;
use crate::execution::{
    ActionFuture, ActionOutcome, ExecutionResult, PrivilegedAction, PrivilegedExecutor,
    ProcessExitStatus, command_for,
};
use crate::models::{CoreError, CoreErrorKind};
use crate::orchestration::CancellationToken;

/// Captured output keeps only the last bytes of each stream.
const MAX_STREAM_BYTES: usize = 128 * 1024;
const READ_CHUNK_BYTES: usize = 8 * 1024;
const OUTPUT_READ_DEADLINE: Duration = Duration::from_millis(250);
const REAP_DEADLINE: Duration = Duration::from_secs(1);

/// Runs privileged actions as `<elevation> <helper> ...` child processes in
/// their own process group, so cancellation reaches the helper too.
pub struct ProcessPrivilegedExecutor {
    config: PrivilegedConfig,
    timeout: Option<Duration>,
}

impl ProcessPrivilegedExecutor {
    pub fn new(config: PrivilegedConfig) -> Self {
        Self {
            config,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl PrivilegedExecutor for ProcessPrivilegedExecutor {
    fn run(&self, action: PrivilegedAction, cancellation: CancellationToken) -> ActionFuture {
        let config = self.config.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let spec = command_for(&config, &action)?;
            cancellation.check()?;

            let mut cmd = tokio::process::Command::new(&spec.program);
            cmd.args(&spec.args);
            cmd.stdin(Stdio::null());
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
            cmd.process_group(0);

            let mut child = cmd.spawn().map_err(|error| {
                process_failure(format!("failed to spawn '{}': {error}", spec.program))
            })?;
            let pid = child.id();
            info!(action = %action, program = %spec.program, pid, "started privileged action");

            let stdout_reader = capture(child.stdout.take());
            let stderr_reader = capture(child.stderr.take());

            let deadline = async {
                match timeout {
                    Some(duration) => tokio::time::sleep(duration).await,
                    None => pending::<()>().await,
                }
            };

            let status = tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    warn!(action = %action, "cancelling privileged action");
                    signal_process_group(pid, libc::SIGTERM)?;
                    let _ = tokio::time::timeout(REAP_DEADLINE, child.wait()).await;
                    stdout_reader.abort();
                    stderr_reader.abort();
                    return Err(CoreError::cancelled());
                }
                _ = deadline => {
                    signal_process_group(pid, libc::SIGKILL)?;
                    let _ = tokio::time::timeout(REAP_DEADLINE, child.wait()).await;
                    stdout_reader.abort();
                    stderr_reader.abort();
                    return Err(process_failure(format!(
                        "{action} timed out after {}ms",
                        timeout.map(|t| t.as_millis()).unwrap_or_default()
                    )));
                }
                result = child.wait() => result.map_err(|error| {
                    process_failure(format!("failed to wait for process: {error}"))
                })?,
            };

            // Descendants may keep the pipes open; bound the final read.
            let stdout = collect(stdout_reader).await;
            let stderr = collect(stderr_reader).await;

            let status = match status.code() {
                Some(code) => ProcessExitStatus::ExitCode(code),
                None => ProcessExitStatus::Terminated,
            };
            info!(action = %action, ?status, "privileged action finished");

            Ok(ActionOutcome {
                action,
                status,
                stdout,
                stderr,
            })
        })
    }
}

fn capture<R>(stream: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        match stream {
            Some(handle) => read_tail(handle, MAX_STREAM_BYTES).await,
            None => Vec::new(),
        }
    })
}

/// Reads `reader` to the end, holding at most about twice `limit` bytes and
/// returning the last `limit`.
async fn read_tail<R>(mut reader: R, limit: usize) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_BYTES];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => {
                buffer.extend_from_slice(&chunk[..read]);
                if buffer.len() > limit * 2 {
                    buffer.drain(..buffer.len() - limit);
                }
            }
        }
    }
    if buffer.len() > limit {
        buffer.drain(..buffer.len() - limit);
    }
    buffer
}

async fn collect(reader: JoinHandle<Vec<u8>>) -> String {
    match tokio::time::timeout(OUTPUT_READ_DEADLINE, reader).await {
        Ok(Ok(buffer)) => tail_lossy(&buffer),
        _ => String::new(),
    }
}

fn tail_lossy(buffer: &[u8]) -> String {
    let start = buffer.len().saturating_sub(MAX_STREAM_BYTES);
    String::from_utf8_lossy(&buffer[start..]).into_owned()
}

fn signal_process_group(pid: Option<u32>, signal: libc::c_int) -> ExecutionResult<()> {
    let Some(pid) = pid else {
        return Ok(());
    };

    let pgid = -(pid as libc::pid_t);
    let result = unsafe { libc::kill(pgid, signal) };

    if result != 0 {
        let os_error = std::io::Error::last_os_error();
        if os_error.raw_os_error() != Some(libc::ESRCH) {
            return Err(process_failure(format!(
                "failed to send signal {signal} to process group {pid}: {os_error}"
            )));
        }
    }

    Ok(())
}

fn process_failure(message: String) -> CoreError {
    CoreError::new(CoreErrorKind::ProcessFailure, message)
}
