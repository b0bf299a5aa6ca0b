use std::process::ExitStatus;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::registry::Job;

/// Why a worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCause {
    /// Stop was requested through the worker's kill signal
    Killed,
    /// The process exited on its own, whatever the exit code
    Crashed,
}

impl std::fmt::Display for ExitCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitCause::Killed => write!(f, "killed"),
            ExitCause::Crashed => write!(f, "crashed"),
        }
    }
}

/// Delivered exactly once per worker when its process is gone.
#[derive(Debug, Clone)]
pub struct ExitEvent {
    pub job: Job,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub cause: ExitCause,
}

/// Take ownership of `child` and report its exit on `events`.
///
/// Cancelling `kill` sends SIGTERM, then SIGKILL if the process is still
/// around after `stop_grace`. The exit is reported either way.
pub fn watch(
    mut job: Job,
    mut child: Child,
    kill: CancellationToken,
    stop_grace: Duration,
    events: mpsc::UnboundedSender<ExitEvent>,
) -> JoinHandle<()> {
    if let Some(stdout) = child.stdout.take() {
        forward_output(job.id.to_string(), "stdout", stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        forward_output(job.id.to_string(), "stderr", stderr);
    }

    tokio::spawn(async move {
        let exited = tokio::select! {
            status = child.wait() => Some(status),
            _ = kill.cancelled() => None,
        };

        let status = match exited {
            Some(status) => status,
            None => stop(&job, &mut child, stop_grace).await,
        };

        // A kill racing a natural exit still counts as a kill
        let cause = if kill.is_cancelled() {
            ExitCause::Killed
        } else {
            ExitCause::Crashed
        };

        let (exit_code, signal) = match status {
            Ok(status) => (status.code(), exit_signal(&status)),
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to wait for game server");
                (None, None)
            }
        };

        job.mark_terminated();
        let event = ExitEvent {
            job,
            exit_code,
            signal,
            cause,
        };
        if events.send(event).is_err() {
            tracing::warn!("Supervisor gone, exit event dropped");
        }
    })
}

/// Ask politely, then force.
async fn stop(job: &Job, child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    if request_stop(job, child) {
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => return status,
            Err(_) => tracing::warn!(
                job_id = %job.id,
                grace_ms = grace.as_millis() as u64,
                "Game server ignored SIGTERM, sending SIGKILL"
            ),
        }
    }

    if let Err(e) = child.start_kill() {
        // Already gone; wait() below still reaps it
        tracing::debug!(job_id = %job.id, error = %e, "Kill signal not delivered");
    }
    child.wait().await
}

/// Returns false when no graceful stop could be requested.
#[cfg(unix)]
fn request_stop(job: &Job, child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return false;
    };
    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(job_id = %job.id, pid, error = %e, "SIGTERM not delivered");
            false
        }
    }
}

#[cfg(not(unix))]
fn request_stop(_job: &Job, _child: &Child) -> bool {
    false
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

fn forward_output<R>(job_id: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        // Raw bytes: builds on Windows code pages print non-UTF-8 text, and
        // closing the pipe early would kill the worker with SIGPIPE
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\r', '\n']);
                    tracing::debug!(job_id = %job_id, stream, "{}", line);
                }
                Err(e) => {
                    tracing::debug!(job_id = %job_id, stream, error = %e, "Output stream closed");
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    const GRACE: Duration = Duration::from_secs(2);

    fn sh(script: &str) -> Child {
        Command::new("sh")
            .args(["-c", script])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn reports_natural_exit_as_crash() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let job = Job::new("42", 2011, 7000);
        let job_id = job.id;

        watch(job, sh("echo booting; exit 3"), CancellationToken::new(), GRACE, tx);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.job.id, job_id);
        assert_eq!(event.cause, ExitCause::Crashed);
        assert_eq!(event.exit_code, Some(3));
        assert!(event.signal.is_none());
        assert_eq!(event.job.state, crate::registry::JobState::Terminated);
    }

    #[tokio::test]
    async fn kill_token_sends_sigterm() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let kill = CancellationToken::new();

        watch(Job::new("42", 2011, 7000), sh("exec sleep 30"), kill.clone(), GRACE, tx);
        kill.cancel();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.cause, ExitCause::Killed);
        assert!(event.exit_code.is_none());
        #[cfg(unix)]
        assert_eq!(event.signal, Some(15));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stubborn_worker_is_force_killed_after_grace() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let kill = CancellationToken::new();

        watch(
            Job::new("42", 2011, 7000),
            sh("trap '' TERM; while :; do sleep 1; done"),
            kill.clone(),
            Duration::from_millis(300),
            tx,
        );
        // Let the shell install its trap
        tokio::time::sleep(Duration::from_millis(200)).await;
        kill.cancel();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.cause, ExitCause::Killed);
        assert_eq!(event.signal, Some(9));
    }

    #[tokio::test]
    async fn invalid_utf8_output_does_not_close_the_pipe() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Writes after the bad byte would hit SIGPIPE if the reader gave up
        watch(
            Job::new("42", 2011, 7000),
            sh("printf '\\377\\n'; sleep 0.3; echo alive; sleep 0.3; echo still; exit 0"),
            CancellationToken::new(),
            GRACE,
            tx,
        );

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.exit_code, Some(0));
        assert!(event.signal.is_none());
    }
}
