use super::{TransportControl, TransportEvent, TransportExit, TransportHandle};
use crate::error::{PipelineError, Result};
use std::process::Stdio;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const READ_CHUNK_SIZE: usize = 8192;
const EVENT_BUFFER: usize = 64;

// Pipes can outlive the child when it forked helpers; don't wait on them forever.
const IO_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
enum Signal {
    Interrupt,
    Kill,
}

/// Control side of a spawned process; owns the artifacts the process reads.
struct ProcessControl {
    signals: mpsc::UnboundedSender<Signal>,
    artifacts: Vec<NamedTempFile>,
}

impl TransportControl for ProcessControl {
    fn interrupt(&mut self) {
        let _ = self.signals.send(Signal::Interrupt);
    }

    fn kill(&mut self) {
        let _ = self.signals.send(Signal::Kill);
    }

    fn release(&mut self) {
        for artifact in self.artifacts.drain(..) {
            let path = artifact.path().to_path_buf();
            if let Err(e) = artifact.close() {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove transport artifact");
            }
        }
    }
}

impl Drop for ProcessControl {
    fn drop(&mut self) {
        // No-op once the process has exited and the waiter is gone.
        let _ = self.signals.send(Signal::Kill);
        self.release();
    }
}

/// Spawn `cmd` with piped output and wrap it in a [`TransportHandle`].
///
/// `artifacts` stay alive until the handle is released.
pub fn spawn_process(mut cmd: Command, artifacts: Vec<NamedTempFile>) -> Result<TransportHandle> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        let program = cmd.as_std().get_program().to_string_lossy().into_owned();
        PipelineError::TransportUnavailable(format!("{program}: {e}"))
    })?;
    tracing::debug!(pid = ?child.id(), "transport process started");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| PipelineError::TransportUnavailable("child stdout missing".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| PipelineError::TransportUnavailable("child stderr missing".into()))?;

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let (sig_tx, sig_rx) = mpsc::unbounded_channel();

    let out_task = tokio::spawn(pump(stdout, tx.clone(), TransportEvent::Stdout));
    let err_task = tokio::spawn(pump(stderr, tx.clone(), TransportEvent::Stderr));
    tokio::spawn(supervise(child, sig_rx, [out_task, err_task], tx));

    Ok(TransportHandle::new(
        rx,
        Box::new(ProcessControl {
            signals: sig_tx,
            artifacts,
        }),
    ))
}

async fn pump<R: AsyncRead + Unpin>(
    mut reader: R,
    tx: mpsc::Sender<TransportEvent>,
    wrap: fn(Vec<u8>) -> TransportEvent,
) {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(wrap(buf[..n].to_vec())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "transport pipe read failed");
                break;
            }
        }
    }
}

/// Wait for the child while honouring signals, then flush both pipes before
/// reporting the exit so that `Exited` is always the last event.
async fn supervise(
    mut child: Child,
    mut signals: mpsc::UnboundedReceiver<Signal>,
    readers: [JoinHandle<()>; 2],
    tx: mpsc::Sender<TransportEvent>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(sig) = signals.recv() => match sig {
                Signal::Interrupt => interrupt(&mut child),
                Signal::Kill => {
                    if let Err(e) = child.start_kill() {
                        tracing::debug!(error = %e, "kill failed; process likely gone");
                    }
                }
            },
        }
    };

    for mut reader in readers {
        if tokio::time::timeout(IO_DRAIN_TIMEOUT, &mut reader).await.is_err() {
            tracing::warn!("transport pipe still open after exit; abandoning it");
            reader.abort();
        }
    }

    let exit = match status {
        Ok(status) => TransportExit::from_status(status),
        Err(e) => {
            tracing::warn!(error = %e, "failed to reap transport process");
            TransportExit::lost()
        }
    };
    tracing::debug!(%exit, "transport process finished");
    let _ = tx.send(TransportEvent::Exited(exit)).await;
}

#[cfg(unix)]
fn interrupt(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    // SAFETY: plain kill(2) on a pid we spawned and have not yet reaped.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    if rc == -1 {
        tracing::debug!(error = %std::io::Error::last_os_error(), "SIGINT failed");
    }
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "kill failed; process likely gone");
    }
}
