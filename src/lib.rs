//! Cadence - aging-priority dispatch for long-lived agents
//!
//! Cadence runs many independent agents, each advancing one stage of a
//! Plan -> Attend -> Execute cycle per tick, under a fixed worker cap.
//! Agents idle longest are eventually favored regardless of base priority,
//! agents with no work park themselves until input arrives, and a crashing
//! tick never takes down the dispatcher or its neighbours.

pub mod agent;
pub mod capability;
pub mod config;
pub mod error;
pub mod id;
pub mod memory;
pub mod reasoning;
pub mod scheduler;

pub use error::{CadenceError, Result};
