//! Agents that suspended themselves pending new input

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::scheduler::handle::SharedAgent;

#[derive(Default)]
pub struct WaitingSet {
    agents: Mutex<HashMap<String, SharedAgent>>,
}

impl WaitingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the identity was already waiting
    pub fn insert(&self, agent: SharedAgent) -> bool {
        let identity = agent.identity().to_string();
        self.agents.lock().insert(identity, agent).is_none()
    }

    pub fn remove(&self, identity: &str) -> Option<SharedAgent> {
        self.agents.lock().remove(identity)
    }

    /// Remove `agent` only if it is the exact handle parked under its identity
    pub fn remove_handle(&self, agent: &SharedAgent) -> bool {
        let mut agents = self.agents.lock();
        let parked = agents
            .get(agent.identity())
            .is_some_and(|current| Arc::ptr_eq(current, agent));
        if parked {
            agents.remove(agent.identity());
        }
        parked
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.agents.lock().contains_key(identity)
    }

    /// Copy of the current members, so callers can invoke agent code unlocked
    pub fn snapshot(&self) -> Vec<SharedAgent> {
        self.agents.lock().values().cloned().collect()
    }

    pub fn identities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.agents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.lock().is_empty()
    }
}
