//! Per-service state table
//!
//! Every service has its own record behind its own lock; a transition holds
//! only that lock. All transitions bump a watch channel so waiters (services
//! blocked on their dependencies, tests, the CLI) can re-check.

use crate::error::{ConvoyError, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::watch;

/// Lifecycle state of a service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Waiting for dependencies
    #[default]
    Pending,
    /// Launched, waiting for a health signal
    Starting,
    /// Healthy
    Running,
    /// Stopped by teardown
    Stopped,
    /// Exited, failed its health check or timed out
    Crashed,
}

impl ServiceState {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition(self, next: ServiceState) -> bool {
        use ServiceState::*;

        matches!(
            (self, next),
            (Pending, Starting)
                | (Starting, Running)
                | (Starting, Crashed)
                | (Starting, Pending)
                | (Starting, Stopped)
                | (Running, Crashed)
                | (Running, Stopped)
                | (Crashed, Starting)
                | (Crashed, Stopped)
                | (Stopped, Starting)
        )
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Pending => write!(f, "pending"),
            ServiceState::Starting => write!(f, "starting"),
            ServiceState::Running => write!(f, "running"),
            ServiceState::Stopped => write!(f, "stopped"),
            ServiceState::Crashed => write!(f, "crashed"),
        }
    }
}

/// Why a service crashed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrashCause {
    /// The process exited with a code
    Exited(i32),
    /// The health check kept failing
    HealthCheck(String),
    /// No health signal within the start timeout
    StartTimeout(Duration),
    /// The runtime could not launch the container
    LaunchFailed(String),
}

impl CrashCause {
    /// Whether the crash counts as a failure; a clean exit does not
    pub fn is_failure(&self) -> bool {
        !matches!(self, CrashCause::Exited(0))
    }

    /// Error reported when the service gives up after this crash
    pub fn into_error(self, service: &str) -> ConvoyError {
        match self {
            CrashCause::StartTimeout(timeout) => ConvoyError::StartupTimeout {
                service: service.to_string(),
                timeout,
            },
            CrashCause::LaunchFailed(reason) => {
                ConvoyError::Runtime(format!("failed to launch {}: {}", service, reason))
            }
            other => ConvoyError::HealthCheckFailure {
                service: service.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

impl std::fmt::Display for CrashCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrashCause::Exited(code) => write!(f, "exited with code {}", code),
            CrashCause::HealthCheck(reason) => write!(f, "health check failed: {}", reason),
            CrashCause::StartTimeout(timeout) => {
                write!(f, "not healthy within {:?}", timeout)
            }
            CrashCause::LaunchFailed(reason) => write!(f, "launch failed: {}", reason),
        }
    }
}

/// State record of one service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceRecord {
    /// Service name
    pub name: String,
    /// Current state
    pub state: ServiceState,
    /// Restarts performed so far
    pub restarts: u32,
    /// Consecutive failed starts
    pub attempts: u32,
    /// Consecutive failed health probes while running
    pub health_failures: u32,
    /// Last crash
    pub last_crash: Option<CrashCause>,
    /// Crashed with no restart coming
    pub gave_up: bool,
    /// Whether the service holds references on its networks and volumes
    pub holds_resources: bool,
    /// Runtime container ID
    pub container_id: Option<String>,
    /// Time of the last transition
    pub since: DateTime<Utc>,
}

impl ServiceRecord {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: ServiceState::Pending,
            restarts: 0,
            attempts: 0,
            health_failures: 0,
            last_crash: None,
            gave_up: false,
            holds_resources: false,
            container_id: None,
            since: Utc::now(),
        }
    }
}

/// Shared table of service records
#[derive(Clone)]
pub struct StateTable {
    entries: Arc<RwLock<IndexMap<String, Arc<Mutex<ServiceRecord>>>>>,
    changes: watch::Sender<u64>,
}

impl Default for StateTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTable {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            entries: Arc::new(RwLock::new(IndexMap::new())),
            changes,
        }
    }

    /// Replace all records with fresh `Pending` ones, in the given order
    pub fn reset<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ConvoyError::Lock("Failed to acquire write lock".to_string()))?;

        entries.clear();
        for name in names {
            entries.insert(
                name.to_string(),
                Arc::new(Mutex::new(ServiceRecord::new(name))),
            );
        }
        drop(entries);

        self.notify();
        Ok(())
    }

    fn entry(&self, name: &str) -> Result<Arc<Mutex<ServiceRecord>>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| ConvoyError::Lock("Failed to acquire read lock".to_string()))?;

        entries
            .get(name)
            .cloned()
            .ok_or_else(|| ConvoyError::NotFound(name.to_string()))
    }

    /// Snapshot of one record
    pub fn get(&self, name: &str) -> Result<ServiceRecord> {
        let entry = self.entry(name)?;
        let record = lock(&entry)?.clone();
        Ok(record)
    }

    /// Current state of one service
    pub fn state(&self, name: &str) -> Result<ServiceState> {
        Ok(self.get(name)?.state)
    }

    /// Move a service to `next` if the state machine allows it from the
    /// current state, applying `update` under the same lock. Returns whether
    /// the transition happened.
    pub fn transition_with<F>(&self, name: &str, next: ServiceState, update: F) -> Result<bool>
    where
        F: FnOnce(&mut ServiceRecord),
    {
        self.apply(name, None, next, update)
    }

    /// Like [`transition_with`](Self::transition_with), but only from one of
    /// the `from` states
    pub fn transition_from<F>(
        &self,
        name: &str,
        from: &[ServiceState],
        next: ServiceState,
        update: F,
    ) -> Result<bool>
    where
        F: FnOnce(&mut ServiceRecord),
    {
        self.apply(name, Some(from), next, update)
    }

    fn apply<F>(
        &self,
        name: &str,
        from: Option<&[ServiceState]>,
        next: ServiceState,
        update: F,
    ) -> Result<bool>
    where
        F: FnOnce(&mut ServiceRecord),
    {
        let entry = self.entry(name)?;
        let moved = {
            let mut record = lock(&entry)?;
            let expected = from.map_or(true, |states| states.contains(&record.state));
            if expected && record.state.can_transition(next) {
                tracing::debug!("{}: {} -> {}", name, record.state, next);
                record.state = next;
                record.since = Utc::now();
                update(&mut *record);
                true
            } else {
                false
            }
        };

        if moved {
            self.notify();
        }
        Ok(moved)
    }

    /// Move a service to `next` if allowed
    pub fn transition(&self, name: &str, next: ServiceState) -> Result<bool> {
        self.transition_with(name, next, |_| {})
    }

    /// Update a record without changing its state
    pub fn update<F, R>(&self, name: &str, update: F) -> Result<R>
    where
        F: FnOnce(&mut ServiceRecord) -> R,
    {
        let entry = self.entry(name)?;
        let result = {
            let mut record = lock(&entry)?;
            update(&mut *record)
        };
        self.notify();
        Ok(result)
    }

    /// Snapshot of every record in table order
    pub fn snapshot(&self) -> Result<Vec<ServiceRecord>> {
        let entries: Vec<Arc<Mutex<ServiceRecord>>> = self
            .entries
            .read()
            .map_err(|_| ConvoyError::Lock("Failed to acquire read lock".to_string()))?
            .values()
            .cloned()
            .collect();

        entries
            .iter()
            .map(|entry| lock(entry).map(|record| record.clone()))
            .collect()
    }

    /// Receiver notified after every change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }
}

fn lock(entry: &Mutex<ServiceRecord>) -> Result<MutexGuard<'_, ServiceRecord>> {
    entry
        .lock()
        .map_err(|_| ConvoyError::Lock("Failed to acquire service lock".to_string()))
}
