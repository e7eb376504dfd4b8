//! Keyed supervisor for many [`Process`]es.
//!
//! Every `start` creates a record and a supervisor task that drives the record
//! through the lifecycle graph. State changes are queued to a single
//! dispatcher task, so callbacks never run under the pool lock and never run
//! concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Span, debug, info, warn};

use crate::process::{Process, ProcessState};
use crate::{ProcessConfig, ProcessError};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
pub type CommandProvider = Arc<dyn Fn(&str) -> Result<String, BoxError> + Send + Sync>;
pub type StateCallback = Arc<dyn Fn(&StateChange) + Send + Sync>;
pub type Configurer = Arc<dyn Fn(&str, &mut Process) + Send + Sync>;

/// One observed lifecycle transition.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub id: String,
    pub old: ProcessState,
    pub new: ProcessState,
    /// Set only on transitions to [`ProcessState::Error`].
    pub error: Option<Arc<ProcessError>>,
}

/// Snapshot returned by [`ProcessPool::get_status`].
#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub id: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub restart_count: u32,
    pub last_error: Option<String>,
}

impl ProcessInfo {
    fn idle(id: &str) -> Self {
        Self {
            id: id.to_string(),
            state: ProcessState::Idle,
            pid: None,
            started_at: None,
            restart_count: 0,
            last_error: None,
        }
    }
}

pub struct PoolOptions {
    provider: CommandProvider,
    on_state_change: Option<StateCallback>,
    configure: Option<Configurer>,
    pub process: ProcessConfig,
    /// Ceiling on how long `stop` waits for a supervisor.
    pub stop_timeout: Duration,
    /// Span supervisor tasks are instrumented with.
    pub span: Span,
}

impl PoolOptions {
    pub fn new<F, E>(provider: F) -> Self
    where
        F: Fn(&str) -> Result<String, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self {
            provider: Arc::new(move |id: &str| provider(id).map_err(Into::into)),
            on_state_change: None,
            configure: None,
            process: ProcessConfig::default(),
            stop_timeout: Duration::from_secs(10),
            span: Span::current(),
        }
    }

    pub fn on_state_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(callback));
        self
    }

    pub fn configure<F>(mut self, configure: F) -> Self
    where
        F: Fn(&str, &mut Process) + Send + Sync + 'static,
    {
        self.configure = Some(Arc::new(configure));
        self
    }

    pub fn process_config(mut self, config: ProcessConfig) -> Self {
        self.process = config;
        self
    }

    pub fn stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

struct Record {
    generation: u64,
    state: ProcessState,
    process: Arc<Process>,
    started_at: DateTime<Utc>,
    restart_count: u32,
    last_error: Option<Arc<ProcessError>>,
    done: CancellationToken,
}

struct Inner {
    records: RwLock<HashMap<String, Record>>,
    provider: CommandProvider,
    configure: Option<Configurer>,
    process_config: ProcessConfig,
    stop_timeout: Duration,
    span: Span,
    root: CancellationToken,
    tracker: TaskTracker,
    events: Option<mpsc::UnboundedSender<StateChange>>,
    generations: AtomicU64,
}

/// Cheap to clone; clones share the same records.
#[derive(Clone)]
pub struct ProcessPool {
    inner: Arc<Inner>,
}

impl ProcessPool {
    /// Must be called from within a Tokio runtime when a state callback is set.
    pub fn new(options: PoolOptions) -> Self {
        let events = options.on_state_change.map(|callback| {
            let (tx, mut rx) = mpsc::unbounded_channel::<StateChange>();
            tokio::spawn(async move {
                while let Some(change) = rx.recv().await {
                    callback(&change);
                }
            });
            tx
        });

        Self {
            inner: Arc::new(Inner {
                records: RwLock::new(HashMap::new()),
                provider: options.provider,
                configure: options.configure,
                process_config: options.process,
                stop_timeout: options.stop_timeout,
                span: options.span,
                root: CancellationToken::new(),
                tracker: TaskTracker::new(),
                events,
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Start the process registered under `id`.
    pub async fn start(&self, id: &str) -> Result<(), ProcessError> {
        self.start_with(id, 0).await
    }

    async fn start_with(&self, id: &str, restart_count: u32) -> Result<(), ProcessError> {
        if self
            .inner
            .records
            .read()
            .await
            .get(id)
            .is_some_and(|r| r.state.is_active())
        {
            return Err(ProcessError::AlreadyRunning(id.to_string()));
        }

        let command = (self.inner.provider)(id)
            .map_err(|e| ProcessError::CommandProvider(e.to_string()))?;

        let mut process = Process::with_cancel(id, command, self.inner.root.child_token());
        process.set_config(self.inner.process_config.clone());
        if let Some(configure) = &self.inner.configure {
            configure(id, &mut process);
        }
        let process = Arc::new(process);
        let done = CancellationToken::new();
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);

        {
            let mut records = self.inner.records.write().await;
            let old = match records.get(id) {
                Some(r) if r.state.is_active() => {
                    return Err(ProcessError::AlreadyRunning(id.to_string()));
                }
                Some(r) => r.state,
                None => ProcessState::Idle,
            };
            records.insert(
                id.to_string(),
                Record {
                    generation,
                    state: ProcessState::Starting,
                    process: process.clone(),
                    started_at: Utc::now(),
                    restart_count,
                    last_error: None,
                    done: done.clone(),
                },
            );
            self.inner.emit(id, old, ProcessState::Starting, None);
        }

        info!(process_id = %id, "starting process");
        let inner = self.inner.clone();
        let span = self.inner.span.clone();
        self.inner.tracker.spawn(
            supervise(inner, id.to_string(), generation, process, done).instrument(span),
        );
        Ok(())
    }

    /// Stop `id` and forget its record. No-op unless it is starting or running.
    pub async fn stop(&self, id: &str) {
        let (process, done, generation) = {
            let mut records = self.inner.records.write().await;
            let Some(record) = records.get_mut(id) else {
                return;
            };
            if !matches!(record.state, ProcessState::Starting | ProcessState::Running) {
                return;
            }
            let old = record.state;
            record.state = ProcessState::Stopping;
            self.inner.emit(id, old, ProcessState::Stopping, None);
            (record.process.clone(), record.done.clone(), record.generation)
        };

        info!(process_id = %id, "stopping process");
        process.shutdown();

        if timeout(self.inner.stop_timeout, done.cancelled()).await.is_err() {
            warn!(
                process_id = %id,
                timeout = ?self.inner.stop_timeout,
                "supervisor did not finish in time, abandoning"
            );
        }

        let mut records = self.inner.records.write().await;
        if records.get(id).is_some_and(|r| r.generation == generation) {
            if let Some(record) = records.remove(id) {
                if record.state == ProcessState::Stopping {
                    self.inner.emit(id, ProcessState::Stopping, ProcessState::Idle, None);
                }
            }
        }
    }

    /// Stop then start. The restart count carries over.
    pub async fn restart(&self, id: &str) -> Result<(), ProcessError> {
        let count = self.get_status(id).await.restart_count;
        self.stop(id).await;
        self.start_with(id, count + 1).await
    }

    pub async fn get_status(&self, id: &str) -> ProcessInfo {
        let records = self.inner.records.read().await;
        match records.get(id) {
            Some(record) => record.info(id),
            None => ProcessInfo::idle(id),
        }
    }

    pub async fn is_running(&self, id: &str) -> bool {
        self.inner
            .records
            .read()
            .await
            .get(id)
            .is_some_and(|r| r.state == ProcessState::Running)
    }

    /// Status of every known record, ordered by ID.
    pub async fn list(&self) -> Vec<ProcessInfo> {
        let records = self.inner.records.read().await;
        let mut infos: Vec<ProcessInfo> = records.iter().map(|(id, r)| r.info(id)).collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// The live process for `id`, for restart requests or command inspection.
    pub async fn process(&self, id: &str) -> Result<Arc<Process>, ProcessError> {
        self.inner
            .records
            .read()
            .await
            .get(id)
            .filter(|r| r.state.is_active())
            .map(|r| r.process.clone())
            .ok_or_else(|| ProcessError::NotFound(id.to_string()))
    }

    /// Swap the command of a running process without leaving Running.
    pub async fn request_restart(&self, id: &str, command: &str) -> Result<bool, ProcessError> {
        Ok(self.process(id).await?.request_restart(command))
    }

    /// Cancel everything and wait for all supervisors to drain.
    pub async fn stop_all(&self) {
        self.inner.root.cancel();
        let ids: Vec<String> = self.inner.records.read().await.keys().cloned().collect();
        info!(count = ids.len(), "stopping all processes");

        let mut stops = JoinSet::new();
        for id in ids {
            let pool = self.clone();
            stops.spawn(async move { pool.stop(&id).await });
        }
        while stops.join_next().await.is_some() {}

        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }
}

impl Record {
    fn info(&self, id: &str) -> ProcessInfo {
        ProcessInfo {
            id: id.to_string(),
            state: self.state,
            pid: self.process.pid(),
            started_at: Some(self.started_at),
            restart_count: self.restart_count + self.process.restart_count(),
            last_error: self.last_error.as_ref().map(|e| e.to_string()),
        }
    }
}

impl Inner {
    fn emit(
        &self,
        id: &str,
        old: ProcessState,
        new: ProcessState,
        error: Option<Arc<ProcessError>>,
    ) {
        debug!(process_id = %id, %old, %new, "state change");
        if let Some(events) = &self.events {
            let _ = events.send(StateChange {
                id: id.to_string(),
                old,
                new,
                error,
            });
        }
    }

    /// Move the record of this supervisor to `to`. Stale generations and
    /// transitions made moot by a concurrent stop are ignored.
    async fn transition(
        &self,
        id: &str,
        generation: u64,
        to: ProcessState,
        error: Option<Arc<ProcessError>>,
    ) {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(id) else {
            return;
        };
        if record.generation != generation {
            return;
        }
        let from = record.state;
        let to = match (from, to) {
            (ProcessState::Stopping, ProcessState::Running) => return,
            (ProcessState::Stopping, _) => ProcessState::Idle,
            _ => to,
        };
        if from == to || !from.can_transition_to(to) {
            return;
        }

        record.state = to;
        let error = if to == ProcessState::Error {
            record.last_error = error.clone();
            error
        } else {
            None
        };
        self.emit(id, from, to, error);
    }
}

async fn supervise(
    inner: Arc<Inner>,
    id: String,
    generation: u64,
    process: Arc<Process>,
    done: CancellationToken,
) {
    let _done = done.drop_guard();
    let mut spawns = process.subscribe_spawns();
    let live = async { spawns.wait_for(|n| *n > 0).await.is_ok() };
    let run = process.run();
    tokio::pin!(live, run);

    let result = tokio::select! {
        biased;
        spawned = &mut live => {
            if spawned {
                inner.transition(&id, generation, ProcessState::Running, None).await;
            }
            run.await
        }
        result = &mut run => result,
    };

    let (next, error) = match result {
        _ if process.is_shutdown() => (ProcessState::Idle, None),
        Ok(0) => (ProcessState::Idle, None),
        Ok(code) => (ProcessState::Error, Some(ProcessError::Exited(code))),
        Err(e) => (ProcessState::Error, Some(e)),
    };
    match &error {
        Some(e) => warn!(process_id = %id, error = %e, "process failed"),
        None => info!(process_id = %id, "process finished"),
    }
    inner
        .transition(&id, generation, next, error.map(Arc::new))
        .await;
}
