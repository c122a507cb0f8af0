//! The dispatcher's view of an agent

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Whether an agent is eligible for dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationStatus {
    #[default]
    Active,
    /// Suspended by the agent itself until new input arrives
    Waiting,
}

impl fmt::Display for ActivationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationStatus::Active => write!(f, "active"),
            ActivationStatus::Waiting => write!(f, "waiting"),
        }
    }
}

/// An independently scheduled agent.
///
/// The dispatcher never holds one of its own locks while calling into a handle.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    /// Stable identity, unique within a dispatcher
    fn identity(&self) -> &str;

    /// Execute exactly one pending stage handler
    async fn run_one_tick(&self) -> Result<()>;

    fn activation_status(&self) -> ActivationStatus;

    /// Pick up pending input; a waiting agent may become active
    fn refresh(&self);
}

pub type SharedAgent = Arc<dyn AgentHandle>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_status_default_and_display() {
        assert_eq!(ActivationStatus::default(), ActivationStatus::Active);
        assert_eq!(ActivationStatus::Waiting.to_string(), "waiting");
    }

    #[test]
    fn test_activation_status_serde() {
        let json = serde_json::to_string(&ActivationStatus::Waiting).unwrap();
        assert_eq!(json, "\"waiting\"");
        let back: ActivationStatus = serde_json::from_str("\"active\"").unwrap();
        assert_eq!(back, ActivationStatus::Active);
    }
}
