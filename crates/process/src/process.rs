//! One supervised child process.
//!
//! A [`Process`] owns a command string and runs it in its own process group,
//! streaming stdout and stderr line by line. Shutdown and restart requests are
//! served by interrupting the group, waiting out the graceful window, then
//! killing it.

use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::log_level::{LogLevel, LogParser, default_parser};
use crate::tokenize::tokenize;
use crate::{ProcessConfig, ProcessError};

/// Exit code reported when a child had to be killed.
pub const FORCE_KILLED_EXIT_CODE: i32 = 137;

/// Lifecycle state of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Idle,
    Starting,
    Running,
    Stopping,
    Error,
}

impl ProcessState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Error => "error",
        }
    }

    /// Whether a record in this state still owns a supervisor.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Stopping)
    }

    /// Edges of the lifecycle graph.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (Idle | Error, Starting)
                | (Starting, Running | Stopping | Idle | Error)
                | (Running, Stopping | Idle | Error)
                | (Stopping, Idle)
        )
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which pipe a line of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSource {
    Stdout,
    Stderr,
}

impl OutputSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl std::fmt::Display for OutputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives every output line before it is logged.
pub trait OutputHandler: Send + Sync {
    fn handle_line(&self, source: OutputSource, line: &str);
}

impl<F> OutputHandler for F
where
    F: Fn(OutputSource, &str) + Send + Sync,
{
    fn handle_line(&self, source: OutputSource, line: &str) {
        self(source, line)
    }
}

/// Why a single run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Shutdown was requested.
    Shutdown,
    /// A restart was requested; the command has been swapped.
    Restart,
    /// The child exited on its own.
    Exited,
}

pub struct Process {
    id: String,
    command: RwLock<String>,
    config: ProcessConfig,
    cancel: CancellationToken,
    restart_tx: mpsc::Sender<String>,
    restart_rx: Mutex<mpsc::Receiver<String>>,
    output_handler: Option<Arc<dyn OutputHandler>>,
    log_parser: LogParser,
    restarts: AtomicU32,
    pid: AtomicU32,
    spawns: watch::Sender<u64>,
}

impl Process {
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self::with_cancel(id, command, CancellationToken::new())
    }

    /// Build a process whose shutdown is driven by `cancel`, typically a
    /// child of a pool-wide token.
    pub fn with_cancel(
        id: impl Into<String>,
        command: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        let (restart_tx, restart_rx) = mpsc::channel(1);
        let (spawns, _) = watch::channel(0);
        Self {
            id: id.into(),
            command: RwLock::new(command.into()),
            config: ProcessConfig::default(),
            cancel,
            restart_tx,
            restart_rx: Mutex::new(restart_rx),
            output_handler: None,
            log_parser: default_parser(),
            restarts: AtomicU32::new(0),
            pid: AtomicU32::new(0),
            spawns,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ProcessConfig) {
        self.config = config;
    }

    pub fn set_output_handler(&mut self, handler: Arc<dyn OutputHandler>) {
        self.output_handler = Some(handler);
    }

    pub fn set_log_parser(&mut self, parser: LogParser) {
        self.log_parser = parser;
    }

    /// Current command line.
    pub fn command(&self) -> String {
        self.command
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of in-place restarts performed by [`Process::run`].
    pub fn restart_count(&self) -> u32 {
        self.restarts.load(Ordering::Relaxed)
    }

    /// PID of the live child, if any.
    pub fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::Relaxed) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Counter bumped after every successful spawn.
    pub fn subscribe_spawns(&self) -> watch::Receiver<u64> {
        self.spawns.subscribe()
    }

    /// Queue a restart with `command`. Returns false when one is already
    /// pending, in which case `command` is dropped.
    pub fn request_restart(&self, command: impl Into<String>) -> bool {
        match self.restart_tx.try_send(command.into()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(process_id = %self.id, "restart already pending, ignoring");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Ask the active run to stop gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run the command until shutdown or a spontaneous exit, restarting in
    /// place whenever a restart is requested.
    ///
    /// An `Err` means the command could not be started; callers treat that as
    /// exit code 1.
    pub async fn run(&self) -> Result<i32, ProcessError> {
        loop {
            let (code, reason) = self.run_once().await?;
            match reason {
                ExitReason::Restart => {
                    let count = self.restarts.fetch_add(1, Ordering::Relaxed) + 1;
                    info!(process_id = %self.id, restart_count = count, "restarting with new command");
                }
                ExitReason::Shutdown | ExitReason::Exited => return Ok(code),
            }
        }
    }

    /// Spawn the current command once and wait for it to end.
    pub async fn run_once(&self) -> Result<(i32, ExitReason), ProcessError> {
        if self.cancel.is_cancelled() {
            return Ok((0, ExitReason::Shutdown));
        }

        let command = self.command();
        let argv = tokenize(&command).map_err(|e| ProcessError::BadCommand(Box::new(e)))?;
        let Some((program, args)) = argv.split_first() else {
            return Err(ProcessError::BadCommand(Box::new(ProcessError::EmptyCommand)));
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::SpawnFailed {
                program: program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or(ProcessError::PipeSetupFailed("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(ProcessError::PipeSetupFailed("stderr"))?;

        let pid = child.id();
        self.pid.store(pid.unwrap_or(0), Ordering::Relaxed);
        self.spawns.send_modify(|n| *n += 1);
        info!(process_id = %self.id, pid, "process started");

        let pumps = [
            self.pump(OutputSource::Stdout, stdout),
            self.pump(OutputSource::Stderr, stderr),
        ];

        let mut restart_rx = self.restart_rx.lock().await;
        let (code, reason) = tokio::select! {
            status = child.wait() => (self.collect(status), ExitReason::Exited),
            _ = self.cancel.cancelled() => {
                info!(process_id = %self.id, "shutdown requested");
                (self.terminate(&mut child).await, ExitReason::Shutdown)
            }
            Some(next) = restart_rx.recv() => {
                info!(process_id = %self.id, "restart requested");
                let code = self.terminate(&mut child).await;
                *self.command.write().unwrap_or_else(PoisonError::into_inner) = next;
                (code, ExitReason::Restart)
            }
        };
        drop(restart_rx);
        self.pid.store(0, Ordering::Relaxed);

        for mut pump in pumps {
            if timeout(self.config.kill_timeout, &mut pump).await.is_err() {
                warn!(process_id = %self.id, "output pump did not drain, abandoning");
                pump.abort();
            }
        }

        info!(process_id = %self.id, code, "process exited");
        Ok((code, reason))
    }

    fn collect(&self, status: std::io::Result<ExitStatus>) -> i32 {
        match status {
            Ok(status) => exit_code(status),
            Err(e) => {
                warn!(process_id = %self.id, error = %e, "failed to wait for process");
                1
            }
        }
    }

    /// Interrupt, then kill after the graceful window. Always reaps or gives up
    /// with [`FORCE_KILLED_EXIT_CODE`].
    async fn terminate(&self, child: &mut Child) -> i32 {
        let Some(pid) = child.id() else {
            return self.collect(child.wait().await);
        };
        let pgid = Pid::from_raw(pid as i32);

        self.signal_group(pgid, Signal::SIGINT);
        match timeout(self.config.graceful_timeout, child.wait()).await {
            Ok(status) => return self.collect(status),
            Err(_) => {
                let e = ProcessError::GracefulTimeout(self.config.graceful_timeout);
                warn!(process_id = %self.id, error = %e, "escalating to kill");
            }
        }

        self.signal_group(pgid, Signal::SIGKILL);
        let _ = child.start_kill();
        match timeout(self.config.kill_timeout, child.wait()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(process_id = %self.id, error = %e, "failed to reap killed process"),
            Err(_) => error!(
                process_id = %self.id,
                timeout = ?self.config.kill_timeout,
                "process did not exit after kill"
            ),
        }
        FORCE_KILLED_EXIT_CODE
    }

    fn signal_group(&self, pgid: Pid, signal: Signal) {
        match killpg(pgid, signal) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(source) => {
                let e = ProcessError::KillFailed {
                    pgid: pgid.as_raw(),
                    source,
                };
                warn!(process_id = %self.id, %signal, error = %e, "signal delivery failed");
            }
        }
    }

    fn pump<R>(&self, source: OutputSource, reader: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let id = self.id.clone();
        let handler = self.output_handler.clone();
        let parser = self.log_parser.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim_end_matches(['\n', '\r']);
                        if let Some(handler) = &handler {
                            handler.handle_line(source, line);
                        }
                        let (level, message) = parser(line);
                        log_line(&id, source, level, &message);
                    }
                    Err(e) => {
                        warn!(process_id = %id, %source, error = %e, "output pump failed");
                        break;
                    }
                }
            }
        })
    }
}

fn log_line(id: &str, source: OutputSource, level: LogLevel, message: &str) {
    let source = source.as_str();
    match level {
        LogLevel::Error => error!(process_id = %id, source, "{message}"),
        LogLevel::Warn => warn!(process_id = %id, source, "{message}"),
        LogLevel::Info => info!(process_id = %id, source, "{message}"),
        LogLevel::Debug => debug!(process_id = %id, source, "{message}"),
    }
}

/// Exit code of a finished child; signal deaths map to `128 + signal`.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}
