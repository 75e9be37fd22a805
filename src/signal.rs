//! Process-group supervision: every encoder child is launched into its own
//! process group so a single soft-stop broadcast reaches it and any
//! grandchildren ffmpeg spawns, without disturbing the worker itself.
//!
//! Unix-only (process groups are a POSIX concept); no Windows fallback is
//! attempted here, matching §4.7's explicit scope.

use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::sync::broadcast;

use crate::error::{Result, WorkerError};

/// Broadcasts the cooperative shutdown signal to every subscriber in this
/// worker process: each in-flight job's cancellation observer (§4.5/§4.6)
/// reacts by tearing down its own encoder child and re-queuing.
#[derive(Clone)]
pub struct ShutdownBroadcast {
    tx: broadcast::Sender<()>,
}

impl ShutdownBroadcast {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fires once; late subscribers after this call will not observe it, so
    /// callers must subscribe before the signal can plausibly arrive.
    pub fn fire(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for ShutdownBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for SIGTERM or SIGINT (Ctrl-C) and fires `broadcast` exactly once.
/// Intended to be spawned as a background task for the lifetime of the
/// worker process.
pub async fn watch_for_shutdown(broadcast: ShutdownBroadcast) -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, broadcasting cooperative shutdown");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl-C, broadcasting cooperative shutdown");
        }
    }
    broadcast.fire();
    Ok(())
}

/// Sends the soft-stop signal (SIGTERM) to every process in `pgid`'s group.
/// `killpg` against a group with no remaining members is not an error --
/// the encoder may have already exited on its own.
pub fn soft_stop_group(pgid: i32) -> Result<()> {
    match kill(Pid::from_raw(-pgid), Signal::SIGTERM) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(WorkerError::Io(std::io::Error::from(e))),
    }
}

/// Hard-kills every process in `pgid`'s group; used only after `grace` has
/// elapsed with no exit following `soft_stop_group`.
pub fn hard_kill_group(pgid: i32) -> Result<()> {
    match kill(Pid::from_raw(-pgid), Signal::SIGKILL) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(WorkerError::Io(std::io::Error::from(e))),
    }
}

/// Places the about-to-spawn child into its own new process group, so a
/// single `killpg` reaches it and any subprocess it spawns. Must be called
/// from the `pre_exec` hook of the `Command` that launches the encoder.
///
/// # Safety
/// Only async-signal-safe calls may run between `fork` and `exec`; `setpgid`
/// with pid 0 is async-signal-safe.
pub unsafe fn detach_into_new_process_group() -> std::io::Result<()> {
    nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0)).map_err(std::io::Error::from)
}

/// Soft-stop then hard-kill escalation with the configured grace period.
pub async fn escalate_stop(pgid: i32, grace: Duration) -> Result<()> {
    soft_stop_group(pgid)?;
    tokio::time::sleep(grace).await;
    hard_kill_group(pgid)
}
