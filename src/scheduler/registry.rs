//! Agent registry - the source of truth for membership

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::id::Timestamp;
use crate::scheduler::handle::SharedAgent;

/// Scheduling state for one agent
#[derive(Clone)]
pub struct ScheduleEntry {
    /// Lower is more urgent
    pub base_priority: f64,
    pub last_dispatch: Timestamp,
    pub agent: SharedAgent,
}

impl ScheduleEntry {
    pub fn new(agent: SharedAgent, base_priority: f64, last_dispatch: Timestamp) -> Self {
        Self {
            base_priority,
            last_dispatch,
            agent,
        }
    }

    pub fn identity(&self) -> &str {
        self.agent.identity()
    }

    /// Record a dispatch. The timestamp never moves backwards.
    pub fn stamp(&mut self, now: Timestamp) {
        self.last_dispatch = self.last_dispatch.max(now);
    }

    /// Whether `agent` is the very handle this entry was registered with
    pub fn holds(&self, agent: &SharedAgent) -> bool {
        Arc::ptr_eq(&self.agent, agent)
    }
}

impl std::fmt::Debug for ScheduleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleEntry")
            .field("identity", &self.identity())
            .field("base_priority", &self.base_priority)
            .field("last_dispatch", &self.last_dispatch)
            .finish()
    }
}

/// Thread-safe map from identity to schedule entry
#[derive(Default)]
pub struct AgentRegistry {
    entries: Mutex<HashMap<String, ScheduleEntry>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry. Returns false if the identity is already registered.
    pub fn insert(&self, entry: ScheduleEntry) -> bool {
        self.insert_with(entry, |_| true)
    }

    /// Register an entry if its identity is free and `admit` accepts it.
    ///
    /// `admit` runs under the registry lock and may place the agent
    /// elsewhere before anyone else can see the new entry.
    pub fn insert_with(&self, entry: ScheduleEntry, admit: impl FnOnce(&ScheduleEntry) -> bool) -> bool {
        let mut entries = self.entries.lock();
        let identity = entry.identity().to_string();
        if entries.contains_key(&identity) || !admit(&entry) {
            return false;
        }
        entries.insert(identity, entry);
        true
    }

    pub fn remove(&self, identity: &str) -> Option<ScheduleEntry> {
        self.remove_with(identity, |_| {})
    }

    /// Remove an entry and run `purge` on it before the registry lock is released
    pub fn remove_with(&self, identity: &str, purge: impl FnOnce(&ScheduleEntry)) -> Option<ScheduleEntry> {
        let mut entries = self.entries.lock();
        let entry = entries.remove(identity)?;
        purge(&entry);
        Some(entry)
    }

    pub fn get(&self, identity: &str) -> Option<ScheduleEntry> {
        self.entries.lock().get(identity).cloned()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.lock().contains_key(identity)
    }

    /// Whether `agent` is the handle currently registered under its identity.
    ///
    /// False for a handle whose identity was deleted, or deleted and then
    /// registered again with a different handle.
    pub fn is_current(&self, agent: &SharedAgent) -> bool {
        self.entries
            .lock()
            .get(agent.identity())
            .is_some_and(|entry| entry.holds(agent))
    }

    /// Run `f` on the entry only while `agent` is its registered handle.
    ///
    /// The registry lock is held for the whole of `f`, so a concurrent
    /// delete or re-registration is ordered entirely before or after it.
    /// `f` must not call back into the registry.
    pub fn with_current<R>(&self, agent: &SharedAgent, f: impl FnOnce(&mut ScheduleEntry) -> R) -> Option<R> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(agent.identity()).filter(|entry| entry.holds(agent))?;
        Some(f(entry))
    }

    pub fn set_base_priority(&self, identity: &str, base_priority: f64) -> bool {
        match self.entries.lock().get_mut(identity) {
            Some(entry) => {
                entry.base_priority = base_priority;
                true
            }
            None => false,
        }
    }

    pub fn entries(&self) -> Vec<ScheduleEntry> {
        self.entries.lock().values().cloned().collect()
    }

    /// Sorted for stable output
    pub fn identities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
