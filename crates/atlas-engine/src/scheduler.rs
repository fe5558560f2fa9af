//! Resource manager: admission control over CPU-bound and I/O-bound work.
//!
//! Two semaphore pools bound global concurrency; per-agent caps bound each
//! agent's share, with a bounded FIFO backlog behind them. Overflow is
//! signaled as `AgentBusy`, never thrown as a crash. Tasks run under a
//! deadline and a cooperative cancellation token checked at suspension
//! points.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use atlas_core::error::EngineError;

/// Agents report liveness on this cadence.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Deadline for any single externally triggered operation.
pub const TOOL_CALL_DEADLINE: Duration = Duration::from_secs(600);

/// Default per-query deadline.
pub const QUERY_DEADLINE: Duration = Duration::from_secs(30);

/// Which pool a task draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    Cpu,
    Io,
}

/// Per-agent concurrency limits.
#[derive(Debug, Clone, Copy)]
pub struct AgentCaps {
    pub max_concurrent: usize,
    pub max_backlog: usize,
}

impl Default for AgentCaps {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            max_backlog: 16,
        }
    }
}

struct AgentState {
    caps: AgentCaps,
    inflight: usize,
    queued: usize,
    submitted: u64,
    completed: u64,
    failed: u64,
    last_heartbeat: Instant,
}

impl AgentState {
    fn new(caps: AgentCaps) -> Self {
        Self {
            caps,
            inflight: 0,
            queued: 0,
            submitted: 0,
            completed: 0,
            failed: 0,
            last_heartbeat: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentMetrics {
    pub name: String,
    pub inflight: usize,
    pub queued: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub seconds_since_heartbeat: u64,
}

pub struct ResourceManager {
    cpu: Arc<Semaphore>,
    io: Arc<Semaphore>,
    agents: Mutex<HashMap<String, AgentState>>,
}

impl ResourceManager {
    pub fn new(cpu_workers: usize, io_workers: usize) -> Self {
        Self {
            cpu: Arc::new(Semaphore::new(cpu_workers.max(1))),
            io: Arc::new(Semaphore::new(io_workers.max(1))),
            agents: Mutex::new(HashMap::new()),
        }
    }

    pub fn register_agent(&self, name: &str, caps: AgentCaps) {
        self.agents
            .lock()
            .expect("agents lock")
            .insert(name.to_string(), AgentState::new(caps));
    }

    pub fn heartbeat(&self, name: &str) {
        if let Some(state) = self.agents.lock().expect("agents lock").get_mut(name) {
            state.last_heartbeat = Instant::now();
        }
    }

    /// Agents idle longer than `heartbeats` intervals. Logged, never killed.
    pub fn idle_agents(&self, heartbeats: u32) -> Vec<String> {
        let threshold = HEARTBEAT_INTERVAL * heartbeats;
        let agents = self.agents.lock().expect("agents lock");
        agents
            .iter()
            .filter(|(_, s)| s.inflight == 0 && s.last_heartbeat.elapsed() > threshold)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Run a blocking task on behalf of `agent` in `pool` under `deadline`
    /// and `cancel`. Admission is refused with `AgentBusy` once the agent's
    /// concurrency cap and backlog are both full.
    pub async fn run<T, F>(
        &self,
        agent: &str,
        pool: Pool,
        deadline: Duration,
        cancel: CancellationToken,
        task: F,
    ) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    {
        // Admission.
        {
            let mut agents = self.agents.lock().expect("agents lock");
            let state = agents
                .entry(agent.to_string())
                .or_insert_with(|| AgentState::new(AgentCaps::default()));
            if state.inflight + state.queued >= state.caps.max_concurrent + state.caps.max_backlog {
                state.failed += 1;
                return Err(EngineError::AgentBusy(agent.to_string()));
            }
            state.submitted += 1;
            state.queued += 1;
        }

        let semaphore = match pool {
            Pool::Cpu => Arc::clone(&self.cpu),
            Pool::Io => Arc::clone(&self.io),
        };

        // Queue for a permit; cancellation is honored while waiting.
        let permit = tokio::select! {
            permit = semaphore.acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => {
                    self.settle(agent, false, true);
                    return Err(EngineError::Cancelled);
                }
            },
            _ = cancel.cancelled() => {
                self.settle(agent, false, true);
                return Err(EngineError::Cancelled);
            }
        };

        // Queued -> inflight.
        {
            let mut agents = self.agents.lock().expect("agents lock");
            if let Some(state) = agents.get_mut(agent) {
                state.queued = state.queued.saturating_sub(1);
                state.inflight += 1;
                state.last_heartbeat = Instant::now();
            }
        }

        let join = tokio::task::spawn_blocking(task);
        let result = tokio::select! {
            joined = join => match joined {
                Ok(r) => r,
                Err(e) => Err(EngineError::Io(format!("worker panicked: {e}"))),
            },
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            _ = tokio::time::sleep(deadline) => {
                warn!("task for agent {agent} exceeded {} ms deadline", deadline.as_millis());
                Err(EngineError::Timeout(deadline.as_millis() as u64))
            }
        };
        drop(permit);

        {
            let mut agents = self.agents.lock().expect("agents lock");
            if let Some(state) = agents.get_mut(agent) {
                state.inflight = state.inflight.saturating_sub(1);
                state.last_heartbeat = Instant::now();
                if result.is_ok() {
                    state.completed += 1;
                } else {
                    state.failed += 1;
                }
            }
        }
        result
    }

    fn settle(&self, agent: &str, _completed: bool, failed: bool) {
        let mut agents = self.agents.lock().expect("agents lock");
        if let Some(state) = agents.get_mut(agent) {
            state.queued = state.queued.saturating_sub(1);
            if failed {
                state.failed += 1;
            }
        }
    }

    pub fn agent_metrics(&self) -> Vec<AgentMetrics> {
        let agents = self.agents.lock().expect("agents lock");
        let mut out: Vec<AgentMetrics> = agents
            .iter()
            .map(|(name, s)| AgentMetrics {
                name: name.clone(),
                inflight: s.inflight,
                queued: s.queued,
                submitted: s.submitted,
                completed: s.completed,
                failed: s.failed,
                seconds_since_heartbeat: s.last_heartbeat.elapsed().as_secs(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}
