#![allow(clippy::collapsible_if)]
pub mod log_level;
pub mod pool;
pub mod process;
pub mod tokenize;

use std::time::Duration;

use thiserror::Error;
use vidnode_core::ErrorKind;

pub use log_level::{LogLevel, LogParser};
pub use pool::{PoolOptions, ProcessInfo, ProcessPool, StateChange};
pub use process::{OutputHandler, OutputSource, Process, ProcessState};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("unclosed quote in command")]
    UnclosedQuote,
    #[error("empty command")]
    EmptyCommand,
    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The command line could not be turned into an argv.
    #[error("cannot run command: {0}")]
    BadCommand(#[source] Box<ProcessError>),
    #[error("failed to attach {0} pipe")]
    PipeSetupFailed(&'static str),
    #[error("process {0} already running")]
    AlreadyRunning(String),
    #[error("process not found: {0}")]
    NotFound(String),
    #[error("failed to signal process group {pgid}: {source}")]
    KillFailed {
        pgid: i32,
        #[source]
        source: nix::errno::Errno,
    },
    #[error("process did not exit within {0:?} of interrupt")]
    GracefulTimeout(Duration),
    #[error("failed to generate command: {0}")]
    CommandProvider(String),
    #[error("process exited with code {0}")]
    Exited(i32),
}

impl ProcessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnclosedQuote => ErrorKind::UnclosedQuote,
            Self::EmptyCommand => ErrorKind::EmptyCommand,
            Self::SpawnFailed { .. } | Self::BadCommand(_) => ErrorKind::SpawnFailed,
            Self::PipeSetupFailed(_) => ErrorKind::PipeSetupFailed,
            Self::AlreadyRunning(_) => ErrorKind::ProcessAlreadyRunning,
            Self::NotFound(_) => ErrorKind::ProcessNotFound,
            Self::KillFailed { .. } => ErrorKind::KillFailed,
            Self::GracefulTimeout(_) => ErrorKind::GracefulTimeout,
            Self::CommandProvider(_) => ErrorKind::CommandUnavailable,
            Self::Exited(_) => ErrorKind::ProcessExited,
        }
    }
}

/// Termination timing for supervised children.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Delay between interrupt and kill.
    pub graceful_timeout: Duration,
    /// Delay after kill before giving up and reporting 137.
    pub kill_timeout: Duration,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            graceful_timeout: Duration::from_secs(5),
            kill_timeout: Duration::from_secs(5),
        }
    }
}
