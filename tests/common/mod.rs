//! Test agents shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use cadence::config::SchedulerConfig;
use cadence::error::{CadenceError, Result};
use cadence::scheduler::{ActivationStatus, AgentHandle};

/// What a test agent does on each tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
}

/// Tracks how many agents sharing it are inside a tick at once
#[derive(Debug, Default)]
pub struct ConcurrencyTracker {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct TestAgent {
    name: String,
    behavior: Behavior,
    delay: Duration,
    ticks: AtomicU64,
    refreshes: AtomicU64,
    waiting: AtomicBool,
    /// Set by a test; the next refresh turns a waiting agent active
    wake: AtomicBool,
    tracker: Option<Arc<ConcurrencyTracker>>,
}

impl TestAgent {
    pub fn new(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            delay: Duration::from_millis(1),
            ticks: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
            waiting: AtomicBool::new(false),
            wake: AtomicBool::new(false),
            tracker: None,
        }
    }

    pub fn counting(name: &str) -> Arc<Self> {
        Arc::new(Self::new(name, Behavior::Succeed))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<ConcurrencyTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn waiting(self) -> Self {
        self.waiting.store(true, Ordering::SeqCst);
        self
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn set_waiting(&self, waiting: bool) {
        self.waiting.store(waiting, Ordering::SeqCst);
    }

    /// Deliver input: the next refresh reactivates the agent
    pub fn wake(&self) {
        self.wake.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AgentHandle for TestAgent {
    fn identity(&self) -> &str {
        &self.name
    }

    async fn run_one_tick(&self) -> Result<()> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        if let Some(tracker) = &self.tracker {
            tracker.enter();
        }
        tokio::time::sleep(self.delay).await;
        if let Some(tracker) = &self.tracker {
            tracker.exit();
        }

        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(CadenceError::InvalidState(format!("{} always fails", self.name))),
            Behavior::Panic => panic!("{} always panics", self.name),
        }
    }

    fn activation_status(&self) -> ActivationStatus {
        if self.waiting.load(Ordering::SeqCst) {
            ActivationStatus::Waiting
        } else {
            ActivationStatus::Active
        }
    }

    fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.wake.swap(false, Ordering::SeqCst) {
            self.waiting.store(false, Ordering::SeqCst);
        }
    }
}

/// Small worker pool with a fast poll so tests settle quickly
pub fn fast_config(workers: usize) -> SchedulerConfig {
    SchedulerConfig::default()
        .with_max_concurrent_agents(workers)
        .with_poll_interval_ms(5)
}

/// Poll `condition` until it holds or `limit` elapses
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}
