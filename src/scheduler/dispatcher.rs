//! Dispatcher: bounded, failure-isolated execution of agent ticks.
//!
//! The dispatcher runs as two tokio tasks plus one task per tick:
//! 1. The main loop pops the most eligible agent while a worker permit is free,
//!    parks waiting agents, and submits the rest.
//! 2. The poller refreshes waiting agents and re-queues the ones that woke up.
//! 3. Each tick holds a permit from submission until its completion callback
//!    has re-queued the agent, so in-flight ticks never exceed the cap.
//!
//! An agent is in at most one of {queue, in flight, waiting} at any instant.
//! Every move into one of those places happens under the registry lock and
//! only for the handle currently registered, so a deleted (or deleted and
//! re-added) agent can never be placed again by a stale tick.
//!
//! Lock order: registry, in-flight, queue, waiting.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::config::SchedulerConfig;
use crate::error::{CadenceError, Result};
use crate::id::{Timestamp, now_secs};
use crate::scheduler::handle::{ActivationStatus, SharedAgent};
use crate::scheduler::queue::{AgingPriorityQueue, QueueItem, check_priority};
use crate::scheduler::registry::{AgentRegistry, ScheduleEntry};
use crate::scheduler::waiting::WaitingSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatcherState {
    Stopped,
    Running,
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatcherState::Stopped => write!(f, "stopped"),
            DispatcherState::Running => write!(f, "running"),
        }
    }
}

/// Point-in-time counters for a dispatcher run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub registered: usize,
    pub queued: usize,
    pub waiting: usize,
    pub in_flight: usize,
    /// Ticks submitted to the pool
    pub dispatched: u64,
    /// Ticks whose completion callback ran (the iteration count)
    pub completed: u64,
    /// Completed ticks that returned an error or panicked
    pub failed: u64,
    pub peak_in_flight: usize,
}

/// Where every agent sat at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Placement {
    /// In dispatch order
    pub queued: Vec<String>,
    pub in_flight: Vec<String>,
    pub waiting: Vec<String>,
}

impl Placement {
    /// Identities found in more than one place
    pub fn duplicates(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut dupes: Vec<String> = self
            .queued
            .iter()
            .chain(&self.in_flight)
            .chain(&self.waiting)
            .filter(|id| !seen.insert(id.as_str()))
            .cloned()
            .collect();
        dupes.sort();
        dupes.dedup();
        dupes
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.queued.iter().chain(&self.in_flight).chain(&self.waiting).any(|id| id == identity)
    }
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: u64,
    completed: u64,
    failed: u64,
}

#[derive(Default)]
struct InFlight {
    identities: HashSet<String>,
    peak: usize,
}

struct Shared {
    config: SchedulerConfig,
    registry: AgentRegistry,
    queue: AgingPriorityQueue,
    waiting: WaitingSet,
    in_flight: Mutex<InFlight>,
    counters: Mutex<Counters>,
    running: AtomicBool,
    pool: Arc<Semaphore>,
}

impl Shared {
    fn budget_exhausted(&self) -> bool {
        match self.config.max_iterations {
            Some(budget) => self.counters.lock().dispatched >= budget,
            None => false,
        }
    }

    /// Park a newly registered agent or queue it. Runs under the registry lock.
    fn enqueue_or_park(&self, entry: &ScheduleEntry, now: Timestamp) -> Result<()> {
        let agent = Arc::clone(&entry.agent);
        if agent.activation_status() == ActivationStatus::Waiting {
            tracing::debug!(agent = %agent.identity(), "Agent waiting, parked");
            self.waiting.insert(agent);
            return Ok(());
        }
        self.queue.put(agent, entry.base_priority, entry.last_dispatch, now)
    }

    fn track_in_flight(&self, identity: &str) {
        let mut in_flight = self.in_flight.lock();
        in_flight.identities.insert(identity.to_string());
        in_flight.peak = in_flight.peak.max(in_flight.identities.len());
    }

    /// Submit as many ticks as there are free permits.
    ///
    /// Returns false once the iteration budget is used up.
    fn dispatch_ready(self: &Arc<Self>) -> bool {
        loop {
            if self.budget_exhausted() {
                return false;
            }
            if self.queue.is_empty() {
                return true;
            }
            let Ok(permit) = self.pool.clone().try_acquire_owned() else {
                return true;
            };
            let Some(item) = self.queue.get() else {
                return true;
            };
            self.dispatch(item, permit);
        }
    }

    fn dispatch(self: &Arc<Self>, item: QueueItem, permit: OwnedSemaphorePermit) {
        let QueueItem { identity, agent, .. } = item;

        // Some(true): now in flight, Some(false): parked, None: deleted
        let placed = self.registry.with_current(&agent, |_| {
            if agent.activation_status() == ActivationStatus::Waiting {
                self.waiting.insert(Arc::clone(&agent));
                return false;
            }
            self.track_in_flight(&identity);
            true
        });

        match placed {
            Some(true) => {
                agent.refresh();
                self.submit(identity, agent, permit);
            }
            Some(false) => tracing::debug!(agent = %identity, "Agent waiting, moved out of the queue"),
            None => tracing::debug!(agent = %identity, "Dropping deleted agent"),
        }
    }

    fn submit(self: &Arc<Self>, identity: String, agent: SharedAgent, permit: OwnedSemaphorePermit) {
        self.counters.lock().dispatched += 1;
        tracing::debug!(agent = %identity, "Dispatching tick");

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let ticking = Arc::clone(&agent);
            // Inner task so a panicking tick surfaces as a JoinError
            let outcome = tokio::spawn(async move { ticking.run_one_tick().await }).await;
            let failed = match outcome {
                Ok(Ok(())) => false,
                Ok(Err(e)) => {
                    tracing::warn!(agent = %identity, error = %e, "Tick failed");
                    true
                }
                Err(e) => {
                    tracing::error!(agent = %identity, error = %e, "Tick panicked");
                    true
                }
            };
            shared.complete(&identity, agent, failed);
            drop(permit);
        });
    }

    /// Completion callback; runs for every submitted tick
    fn complete(&self, identity: &str, agent: SharedAgent, failed: bool) {
        self.in_flight.lock().identities.remove(identity);
        {
            let mut counters = self.counters.lock();
            counters.completed += 1;
            if failed {
                counters.failed += 1;
            }
        }

        let now = now_secs();
        let requeued = self.registry.with_current(&agent, |entry| {
            entry.stamp(now);
            self.queue
                .put(Arc::clone(&agent), entry.base_priority, entry.last_dispatch, now)
        });
        match requeued {
            Some(Ok(())) => {}
            Some(Err(e)) => tracing::error!(agent = %identity, error = %e, "Failed to re-enqueue agent"),
            None => tracing::debug!(agent = %identity, "Agent deleted during tick, not re-enqueued"),
        }
    }

    /// One poller pass over the waiting set
    fn poll_waiting(&self) {
        for agent in self.waiting.snapshot() {
            agent.refresh();
            if agent.activation_status() != ActivationStatus::Active {
                continue;
            }

            let now = now_secs();
            let requeued = self.registry.with_current(&agent, |entry| {
                if !self.waiting.remove_handle(&agent) {
                    return Ok(false);
                }
                entry.stamp(now);
                self.queue
                    .put(Arc::clone(&agent), entry.base_priority, entry.last_dispatch, now)
                    .map(|()| true)
            });
            match requeued {
                Some(Ok(true)) => tracing::info!(agent = %agent.identity(), "Agent reactivated"),
                Some(Ok(false)) => {}
                Some(Err(e)) => tracing::error!(agent = %agent.identity(), error = %e, "Failed to re-enqueue agent"),
                None => tracing::debug!(agent = %agent.identity(), "Dropping deleted waiting agent"),
            }
        }
    }

    fn placement(&self) -> Placement {
        let in_flight_guard = self.in_flight.lock();
        let mut in_flight: Vec<String> = in_flight_guard.identities.iter().cloned().collect();
        in_flight.sort();
        let (queued, waiting) = self.queue.identities_with(|| self.waiting.identities());
        drop(in_flight_guard);
        Placement {
            queued,
            in_flight,
            waiting,
        }
    }
}

async fn run_main_loop(shared: Arc<Shared>) {
    tracing::info!("Dispatcher main loop started");
    let interval = shared.config.poll_interval();

    while shared.running.load(Ordering::SeqCst) {
        if !shared.dispatch_ready() {
            tracing::info!("Iteration budget exhausted");
            shared.running.store(false, Ordering::SeqCst);
            break;
        }
        tokio::time::sleep(interval).await;
    }

    tracing::info!("Dispatcher main loop stopped");
}

async fn run_poller(shared: Arc<Shared>) {
    let interval = shared.config.poll_interval();

    while shared.running.load(Ordering::SeqCst) {
        shared.poll_waiting();
        tokio::time::sleep(interval).await;
    }

    tracing::debug!("Waiting-set poller stopped");
}

/// Schedules registered agents under a concurrency cap with aging priorities.
pub struct Dispatcher {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Create a stopped dispatcher. Fails if the configuration is invalid.
    pub fn new(config: &SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let shared = Shared {
            config: config.clone(),
            registry: AgentRegistry::new(),
            queue: AgingPriorityQueue::new(config.decay_rate),
            waiting: WaitingSet::new(),
            in_flight: Mutex::new(InFlight::default()),
            counters: Mutex::new(Counters::default()),
            running: AtomicBool::new(false),
            pool: Arc::new(Semaphore::new(config.max_concurrent_agents)),
        };
        Ok(Self {
            shared: Arc::new(shared),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Register an agent at the configured default base priority
    pub fn add_agent(&self, agent: SharedAgent) -> Result<bool> {
        let base_priority = self.shared.config.default_base_priority;
        self.add_agent_with_priority(agent, base_priority)
    }

    /// Register an agent. Lower `base_priority` is more urgent.
    ///
    /// Returns false (and changes nothing) if the identity is already
    /// registered, or was deleted while a tick for it is still in flight.
    pub fn add_agent_with_priority(&self, agent: SharedAgent, base_priority: f64) -> Result<bool> {
        let identity = agent.identity().to_string();
        check_priority(&identity, base_priority)?;

        let now = now_secs();
        let shared = &self.shared;
        let mut in_flight = false;
        let mut placed = Ok(());
        let inserted = shared
            .registry
            .insert_with(ScheduleEntry::new(agent, base_priority, now), |entry| {
                if shared.in_flight.lock().identities.contains(entry.identity()) {
                    in_flight = true;
                    return false;
                }
                placed = shared.enqueue_or_park(entry, now);
                placed.is_ok()
            });
        placed?;

        if !inserted {
            if in_flight {
                tracing::warn!(agent = %identity, "Previous agent with this identity still has a tick in flight");
            } else {
                tracing::warn!(agent = %identity, "Agent already registered");
            }
            return Ok(false);
        }

        tracing::info!(agent = %identity, base_priority, "Agent registered");
        Ok(true)
    }

    /// Unregister an agent and purge it from the queue and waiting set.
    ///
    /// An in-flight tick finishes normally and is not re-enqueued. Unknown
    /// identities are a no-op.
    pub fn delete_agent(&self, identity: &str) -> bool {
        let shared = &self.shared;
        let removed = shared
            .registry
            .remove_with(identity, |_| {
                shared.queue.remove(identity);
                shared.waiting.remove(identity);
            })
            .is_some();
        if removed {
            tracing::info!(agent = %identity, "Agent deleted");
        }
        removed
    }

    /// Rewrite base priorities, then re-rank everything currently queued.
    ///
    /// Unknown identities are ignored. In-flight and waiting agents pick up
    /// their new base priority when next enqueued.
    pub fn update_priorities(&self, updates: &[(String, f64)]) -> Result<()> {
        for (identity, base_priority) in updates {
            check_priority(identity, *base_priority)?;
        }
        for (identity, base_priority) in updates {
            if !self.shared.registry.set_base_priority(identity, *base_priority) {
                tracing::debug!(agent = %identity, "Priority update for unknown agent ignored");
            }
        }
        let entries = self.shared.registry.entries();
        self.shared.queue.rerank(&entries, now_secs())
    }

    /// Spawn the main loop and the waiting-set poller on the current runtime.
    pub fn start(&self) -> Result<()> {
        let handle = Handle::try_current().map_err(|e| CadenceError::Runtime(e.to_string()))?;

        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(CadenceError::InvalidState("dispatcher already running".to_string()));
        }

        *self.shared.counters.lock() = Counters::default();
        self.shared.in_flight.lock().peak = 0;

        tracing::info!(
            workers = self.shared.config.max_concurrent_agents,
            budget = ?self.shared.config.max_iterations,
            agents = self.shared.registry.len(),
            "Dispatcher starting"
        );

        let main = handle.spawn(run_main_loop(Arc::clone(&self.shared)));
        let poller = handle.spawn(run_poller(Arc::clone(&self.shared)));
        self.tasks.lock().extend([main, poller]);
        Ok(())
    }

    /// Signal the loops to exit, then drain in-flight ticks.
    pub async fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.join().await;
    }

    /// Wait for the loops to exit and all in-flight ticks to finish.
    ///
    /// Without an iteration budget the loops only exit after `stop`.
    pub async fn join(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Dispatcher task failed");
            }
        }

        let permits = u32::try_from(self.shared.config.max_concurrent_agents).unwrap_or(u32::MAX);
        match self.shared.pool.acquire_many(permits).await {
            Ok(drained) => drop(drained),
            Err(e) => tracing::error!(error = %e, "Worker pool closed while draining"),
        }
        tracing::info!(completed = self.iteration_count(), "Dispatcher stopped");
    }

    pub fn state(&self) -> DispatcherState {
        if self.is_running() {
            DispatcherState::Running
        } else {
            DispatcherState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Completed ticks in the current run
    pub fn iteration_count(&self) -> u64 {
        self.shared.counters.lock().completed
    }

    pub fn in_flight_count(&self) -> usize {
        self.shared.in_flight.lock().identities.len()
    }

    pub fn is_registered(&self, identity: &str) -> bool {
        self.shared.registry.contains(identity)
    }

    pub fn registered_identities(&self) -> Vec<String> {
        self.shared.registry.identities()
    }

    /// Queued identities in dispatch order
    pub fn queued_identities(&self) -> Vec<String> {
        self.shared.queue.identities()
    }

    pub fn waiting_identities(&self) -> Vec<String> {
        self.shared.waiting.identities()
    }

    pub fn in_flight_identities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.shared.in_flight.lock().identities.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Queue, in-flight and waiting membership read in one consistent view.
    ///
    /// An agent moving between places shows up in neither, never in both.
    pub fn placement(&self) -> Placement {
        self.shared.placement()
    }

    pub fn base_priority(&self, identity: &str) -> Option<f64> {
        self.shared.registry.get(identity).map(|e| e.base_priority)
    }

    pub fn last_dispatch(&self, identity: &str) -> Option<Timestamp> {
        self.shared.registry.get(identity).map(|e| e.last_dispatch)
    }

    pub fn stats(&self) -> DispatcherStats {
        let (in_flight, peak_in_flight) = {
            let in_flight = self.shared.in_flight.lock();
            (in_flight.identities.len(), in_flight.peak)
        };
        let counters = self.shared.counters.lock();
        DispatcherStats {
            registered: self.shared.registry.len(),
            queued: self.shared.queue.len(),
            waiting: self.shared.waiting.len(),
            in_flight,
            dispatched: counters.dispatched,
            completed: counters.completed,
            failed: counters.failed,
            peak_in_flight,
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Let detached loops wind down if the owner never called stop()
        self.shared.running.store(false, Ordering::SeqCst);
    }
}
