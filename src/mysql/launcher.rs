use crate::config::MysqlConfig;
use crate::error::{Fault, SupervisorError};
use crate::lifecycle::FaultSender;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::{
    path::PathBuf,
    process::{ExitStatus, Stdio},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    sync::watch,
};
use tracing::{debug, error, info, warn};

/// Spawns the database server with a fixed command line.
#[derive(Debug, Clone)]
pub struct Launcher {
    program: PathBuf,
    args: Vec<String>,
    capture_output: bool,
}

/// Liveness of the child as last observed by its monitor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Exited(ExitStatus),
    /// The exit could not be observed (wait failed).
    Lost,
}

impl Launcher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            capture_output: false,
        }
    }

    pub fn from_config(cfg: &MysqlConfig) -> Self {
        Self::new(cfg.entrypoint.clone(), cfg.args.clone()).capture_output(cfg.capture_output)
    }

    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    pub fn spawn(&self, faults: FaultSender) -> Result<ServerProcess, SupervisorError> {
        let (stdout, stderr) = if self.capture_output {
            (Stdio::piped(), Stdio::piped())
        } else {
            (Stdio::null(), Stdio::null())
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(SupervisorError::Spawn)?;

        let pid = child.id();
        info!(
            program = %self.program.display(),
            args = ?self.args,
            pid = ?pid,
            "Spawned mysqld"
        );

        if let Some(out) = child.stdout.take() {
            forward_lines(out, "stdout");
        }
        if let Some(err) = child.stderr.take() {
            forward_lines(err, "stderr");
        }

        let armed = Arc::new(AtomicBool::new(false));
        let stopping = Arc::new(AtomicBool::new(false));
        let (state_tx, state_rx) = watch::channel(ProcessState::Running);

        {
            let armed = armed.clone();
            let stopping = stopping.clone();
            tokio::spawn(async move {
                let state = match child.wait().await {
                    Ok(status) => {
                        let expected = stopping.load(Ordering::Acquire);
                        if expected {
                            debug!(%status, "mysqld exited");
                        } else {
                            warn!(%status, "mysqld exited unexpectedly");
                        }
                        if armed.load(Ordering::Acquire) && !expected {
                            faults.report(Fault::ProcessExited { status });
                        }
                        ProcessState::Exited(status)
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to wait for mysqld");
                        if armed.load(Ordering::Acquire) && !stopping.load(Ordering::Acquire) {
                            faults.report(Fault::ProcessWait(e));
                        }
                        ProcessState::Lost
                    }
                };
                let _ = state_tx.send(state);
            });
        }

        Ok(ServerProcess {
            pid,
            state_rx,
            armed,
            stopping,
        })
    }
}

fn forward_lines<R>(reader: R, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(stream, "mysqld: {line}");
        }
    });
}

/// Handle to a running server. Exit is observed by a background monitor task.
#[derive(Debug)]
pub struct ServerProcess {
    pid: Option<u32>,
    state_rx: watch::Receiver<ProcessState>,
    armed: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
}

impl ServerProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        *self.state_rx.borrow()
    }

    /// From now on an exit that was not requested is reported as a fault.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    /// Sends SIGTERM and waits up to `deadline` for the exit.
    ///
    /// Whichever comes first, the exit or the deadline, decides the outcome;
    /// there is exactly one. On deadline the child is sent SIGKILL and left
    /// for the monitor task to reap.
    pub async fn terminate(mut self, deadline: Duration) -> ProcessState {
        self.stopping.store(true, Ordering::Release);

        if self.state() == ProcessState::Running {
            self.signal(Signal::SIGTERM);
        }

        let waited = tokio::time::timeout(
            deadline,
            self.state_rx.wait_for(|s| *s != ProcessState::Running),
        )
        .await
        .map(|res| res.map(|state| *state));

        match waited {
            Ok(Ok(state)) => {
                match state {
                    ProcessState::Exited(status) => info!(pid = ?self.pid, %status, "mysqld stopped"),
                    _ => warn!(pid = ?self.pid, "mysqld stop could not be confirmed"),
                }
                state
            }
            Ok(Err(_)) => {
                warn!(pid = ?self.pid, "mysqld monitor ended without reporting exit");
                ProcessState::Lost
            }
            Err(_) => {
                warn!(pid = ?self.pid, ?deadline, "Timed out waiting for mysqld to stop");
                self.signal(Signal::SIGKILL);
                ProcessState::Running
            }
        }
    }

    fn signal(&self, signal: Signal) {
        let Some(pid) = self.pid.and_then(|p| i32::try_from(p).ok()) else {
            return;
        };
        if let Err(e) = kill(Pid::from_raw(pid), signal) {
            warn!(pid, ?signal, error = %e, "Failed to signal mysqld");
        }
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        if self.state() == ProcessState::Running && !self.stopping.load(Ordering::Acquire) {
            self.stopping.store(true, Ordering::Release);
            self.signal(Signal::SIGKILL);
        }
    }
}
