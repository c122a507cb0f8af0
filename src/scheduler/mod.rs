//! Scheduler module for agent dispatch.
//!
//! This module provides:
//! - **AgingPriorityQueue**: lowest time-decayed score runs first, so idle
//!   agents eventually win over busy ones.
//! - **AgentRegistry**: membership and per-agent schedule entries.
//! - **WaitingSet**: agents that suspended themselves until new input arrives.
//! - **Dispatcher**: pulls from the queue under a worker cap, isolates tick
//!   failures, and polls the waiting set for reactivation.
//!
//! # Example
//!
//! ```ignore
//! use cadence::config::SchedulerConfig;
//! use cadence::scheduler::Dispatcher;
//!
//! let dispatcher = Dispatcher::new(&SchedulerConfig::default())?;
//! dispatcher.add_agent(agent)?;
//! dispatcher.start()?;
//! // ...
//! dispatcher.stop().await;
//! ```

mod dispatcher;
mod handle;
mod queue;
mod registry;
mod waiting;

pub use dispatcher::{Dispatcher, DispatcherState, DispatcherStats, Placement};
pub use handle::{ActivationStatus, AgentHandle, SharedAgent};
pub use queue::{AgingPriorityQueue, QueueItem, aging_rank, aging_score};
pub use registry::{AgentRegistry, ScheduleEntry};
pub use waiting::WaitingSet;
