//! Wraps the external encoder binary. Three roles (Splitter, Transcoder,
//! Segmentor) each build a full ffmpeg argument vector; all three share the
//! run/cancel contract in [`run_encoder`].
//!
//! Grounded on `orchestrator.rs`'s `transcode_media` (spawn, stream stderr
//! via `BufReader::lines()`, cancel via a `oneshot` channel racing the reader
//! in a `tokio::select!`, kill on cancel, capture the last N stderr lines for
//! the error message) and on `media/ffmpeg/mod.rs`'s `FFmpegCommandBuilder`
//! fluent-builder-to-`Command` pattern, generalized across the three roles.

mod segmentor;
mod splitter;
mod transcoder;

pub use segmentor::{Segmentor, VariantInput};
pub use splitter::{enumerate_chunks, SplitResult, Splitter};
pub use transcoder::Transcoder;

use std::collections::VecDeque;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;

use crate::error::{Result, WorkerError};

const TAIL_LINES: usize = 10;

static ENCODER_VERSION: OnceLock<String> = OnceLock::new();

/// First line of `ffmpeg -version`, cached for the life of the process.
/// Recorded into each chunk's sentinel for forensic/upgrade purposes (see
/// DESIGN.md open question decision #3) -- not currently compared against a
/// prior run's recorded version to invalidate a sentinel.
pub async fn encoder_version() -> Result<String> {
    if let Some(v) = ENCODER_VERSION.get() {
        return Ok(v.clone());
    }
    let output = tokio::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
        .map_err(|e| WorkerError::Encode("ffmpeg".into(), format!("-version failed: {e}")))?;
    let first_line = String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or("unknown")
        .to_string();
    Ok(ENCODER_VERSION.get_or_init(|| first_line).clone())
}

/// Cancellation handle for a single in-flight encoder invocation.
pub struct CancelHandle {
    tx: oneshot::Sender<()>,
}

impl CancelHandle {
    pub fn cancel(self) {
        let _ = self.tx.send(());
    }
}

/// Launches `cmd` on a background task and returns immediately with a handle
/// to cancel it and a `JoinHandle` that resolves once the encoder exits.
///
/// The background task relays stderr through a `[error]` filter. Exit 0 with
/// no error-marked lines is success; anything else is `EncodeError` carrying
/// the last `TAIL_LINES` stderr lines.
///
/// On cancellation (`CancelHandle::cancel`) the soft-stop signal is sent to
/// the child immediately; if the process has not exited within `grace` it is
/// hard-killed. Either path resolves to `WorkerError::Cancelled`, never
/// `EncodeError` -- the caller (Job Runner) treats cancellation as
/// "requeue, not fail" per §7.
///
/// `timeout` is the operator-configured wall-clock budget for this one
/// invocation (`WorkerConfig::encode_timeout`). Exceeding it is treated the
/// same as an explicit cancellation, not as an `EncodeError`.
pub fn run_encoder(
    mut cmd: Command,
    role: String,
    grace: Duration,
    timeout: Duration,
) -> (tokio::task::JoinHandle<Result<()>>, CancelHandle) {
    let (cancel_tx, mut cancel_rx) = oneshot::channel();
    cmd.stdout(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::piped());

    #[cfg(unix)]
    unsafe {
        use std::os::unix::process::CommandExt;
        cmd.as_std_mut()
            .pre_exec(|| crate::signal::detach_into_new_process_group());
    }

    let handle = tokio::spawn(async move {
        let mut child = cmd
            .spawn()
            .map_err(|e| WorkerError::Encode(role.clone(), format!("spawn failed: {e}")))?;

        let stderr = child.stderr.take().expect("stderr was piped");
        let mut lines = BufReader::new(stderr).lines();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);
        let mut saw_error_line = false;
        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if line.contains("[error]") {
                                saw_error_line = true;
                                tracing::warn!(role = %role, %line, "encoder reported an error line");
                            } else {
                                tracing::debug!(role = %role, %line, "encoder stderr");
                            }
                            if tail.len() == TAIL_LINES {
                                tail.pop_front();
                            }
                            tail.push_back(line);
                        }
                        Ok(None) => {
                            return wait_for_exit(&mut child, &role, saw_error_line, &tail).await;
                        }
                        Err(e) => {
                            return Err(WorkerError::Encode(role.clone(), format!("stderr read failed: {e}")));
                        }
                    }
                }
                _ = &mut cancel_rx => {
                    return cancel_and_wait(&mut child, &role, grace).await;
                }
                _ = &mut sleep => {
                    tracing::warn!(role = %role, ?timeout, "encoder exceeded its wall-clock budget, cancelling");
                    return cancel_and_wait(&mut child, &role, grace).await;
                }
            }
        }
    });

    (handle, CancelHandle { tx: cancel_tx })
}

async fn wait_for_exit(
    child: &mut tokio::process::Child,
    role: &str,
    saw_error_line: bool,
    tail: &VecDeque<String>,
) -> Result<()> {
    let status = child
        .wait()
        .await
        .map_err(|e| WorkerError::Encode(role.to_string(), format!("wait failed: {e}")))?;
    if status.success() && !saw_error_line {
        Ok(())
    } else {
        let detail = tail.iter().cloned().collect::<Vec<_>>().join("\n");
        Err(WorkerError::Encode(
            role.to_string(),
            format!("exit status {status}; last output:\n{detail}"),
        ))
    }
}

#[cfg(unix)]
async fn cancel_and_wait(
    child: &mut tokio::process::Child,
    role: &str,
    grace: Duration,
) -> Result<()> {
    if let Some(pid) = child.id() {
        let _ = crate::signal::soft_stop_group(pid as i32);
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => {}
        Err(_) => {
            if let Some(pid) = child.id() {
                let _ = crate::signal::hard_kill_group(pid as i32);
            }
            let _ = child.wait().await;
        }
    }
    Err(WorkerError::Cancelled(format!("{role} cancelled")))
}

#[cfg(not(unix))]
async fn cancel_and_wait(
    child: &mut tokio::process::Child,
    role: &str,
    _grace: Duration,
) -> Result<()> {
    let _ = child.kill().await;
    Err(WorkerError::Cancelled(format!("{role} cancelled")))
}
