//! Stage cycle: Plan -> Attend -> Execute -> Plan
//!
//! Handlers report a `Transition`, never a target stage, so the only
//! reachable next stages are the current one and its successor.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::reasoning::ReasoningError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Plan,
    Attend,
    Execute,
}

impl Stage {
    pub const CYCLE: [Stage; 3] = [Stage::Plan, Stage::Attend, Stage::Execute];

    pub fn successor(self) -> Stage {
        match self {
            Stage::Plan => Stage::Attend,
            Stage::Attend => Stage::Execute,
            Stage::Execute => Stage::Plan,
        }
    }

    /// Stage after a handler reported `transition`
    pub fn after(self, transition: Transition) -> Stage {
        match transition {
            Transition::Advance => self.successor(),
            Transition::Stay => self,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Plan => "plan",
            Stage::Attend => "attend",
            Stage::Execute => "execute",
        };
        write!(f, "{}", name)
    }
}

/// Successful outcome of a stage handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Advance,
    Stay,
}

/// A tick that ended without moving the cycle. The stage is kept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageHalt {
    /// Nothing to plan; the agent went to Waiting
    #[error("No current task")]
    NoTask,

    /// The top planned goal names an unknown capability or action
    #[error("Goal validation failed: {0}")]
    Validation(String),

    /// The reasoner could not produce a usable decision
    #[error("Decision failed: {0}")]
    Decision(ReasoningError),
}
