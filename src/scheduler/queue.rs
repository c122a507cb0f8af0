//! Aging priority queue.
//!
//! Effective priority is `base * exp(-k * (now - last_dispatch))`, smallest
//! first. Idle time pulls every score toward 0, so a numerically large
//! (nominally unimportant) base priority cannot starve forever.
//!
//! All queued items are compared at the same instant, and at any common
//! `now` that ordering equals the ordering of `ln(base) + k * last_dispatch`.
//! That rank never changes while an item sits in the queue, so it is the
//! key. Ties break on identity.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::error::{CadenceError, Result};
use crate::id::Timestamp;
use crate::scheduler::handle::SharedAgent;
use crate::scheduler::registry::ScheduleEntry;

/// Effective priority at `now`. Lower runs sooner.
pub fn aging_score(base_priority: f64, last_dispatch: Timestamp, now: Timestamp, decay_rate: f64) -> f64 {
    base_priority * (-decay_rate * (now - last_dispatch)).exp()
}

/// Time-invariant sort key equivalent to `aging_score` at any shared `now`
pub fn aging_rank(base_priority: f64, last_dispatch: Timestamp, decay_rate: f64) -> f64 {
    if base_priority == 0.0 {
        return f64::NEG_INFINITY;
    }
    base_priority.ln() + decay_rate * last_dispatch
}

pub(crate) fn check_priority(identity: &str, base_priority: f64) -> Result<()> {
    if base_priority.is_finite() && base_priority >= 0.0 {
        Ok(())
    } else {
        Err(CadenceError::InvalidPriority {
            identity: identity.to_string(),
            value: base_priority,
        })
    }
}

/// An enqueued agent. Built fresh on every `put`, never mutated.
#[derive(Clone)]
pub struct QueueItem {
    /// Score evaluated at the `now` passed to `put`
    pub score: f64,
    pub identity: String,
    pub agent: SharedAgent,
    pub base_priority: f64,
    pub last_dispatch: Timestamp,
    rank: f64,
    decay_rate: f64,
}

impl QueueItem {
    /// Re-evaluate the score at another instant
    pub fn score_at(&self, now: Timestamp) -> f64 {
        aging_score(self.base_priority, self.last_dispatch, now, self.decay_rate)
    }
}

impl std::fmt::Debug for QueueItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueItem")
            .field("score", &self.score)
            .field("identity", &self.identity)
            .field("base_priority", &self.base_priority)
            .field("last_dispatch", &self.last_dispatch)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct QueueKey {
    rank: f64,
    identity: String,
}

impl Eq for QueueKey {}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank
            .total_cmp(&other.rank)
            .then_with(|| self.identity.cmp(&other.identity))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct QueueInner {
    items: BTreeMap<QueueKey, QueueItem>,
    keys: HashMap<String, QueueKey>,
}

impl QueueInner {
    fn insert(&mut self, item: QueueItem) {
        if let Some(old) = self.keys.remove(&item.identity) {
            self.items.remove(&old);
        }
        let key = QueueKey {
            rank: item.rank,
            identity: item.identity.clone(),
        };
        self.keys.insert(item.identity.clone(), key.clone());
        self.items.insert(key, item);
    }

    fn remove(&mut self, identity: &str) -> Option<QueueItem> {
        let key = self.keys.remove(identity)?;
        self.items.remove(&key)
    }

    fn clear(&mut self) {
        self.items.clear();
        self.keys.clear();
    }
}

/// Thread-safe min-ordered queue of agents eligible to run next.
///
/// Every operation takes the single queue lock for its whole duration.
/// `get` never blocks; check `is_empty` or match on `None`.
pub struct AgingPriorityQueue {
    decay_rate: f64,
    inner: Mutex<QueueInner>,
}

impl AgingPriorityQueue {
    pub fn new(decay_rate: f64) -> Self {
        Self {
            decay_rate,
            inner: Mutex::new(QueueInner::default()),
        }
    }

    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }

    fn build(&self, agent: SharedAgent, base_priority: f64, last_dispatch: Timestamp, now: Timestamp) -> QueueItem {
        QueueItem {
            score: aging_score(base_priority, last_dispatch, now, self.decay_rate),
            identity: agent.identity().to_string(),
            agent,
            base_priority,
            last_dispatch,
            rank: aging_rank(base_priority, last_dispatch, self.decay_rate),
            decay_rate: self.decay_rate,
        }
    }

    /// Enqueue an agent. An identity already queued is replaced.
    pub fn put(&self, agent: SharedAgent, base_priority: f64, last_dispatch: Timestamp, now: Timestamp) -> Result<()> {
        check_priority(agent.identity(), base_priority)?;
        let item = self.build(agent, base_priority, last_dispatch, now);
        self.inner.lock().insert(item);
        Ok(())
    }

    /// Pop the most eligible item
    pub fn get(&self) -> Option<QueueItem> {
        let mut inner = self.inner.lock();
        let (key, item) = inner.items.pop_first()?;
        inner.keys.remove(&key.identity);
        Some(item)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Peek at the most eligible item
    pub fn front(&self) -> Option<QueueItem> {
        self.inner.lock().items.first_key_value().map(|(_, item)| item.clone())
    }

    /// Peek at the least eligible item
    pub fn back(&self) -> Option<QueueItem> {
        self.inner.lock().items.last_key_value().map(|(_, item)| item.clone())
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.inner.lock().keys.contains_key(identity)
    }

    pub fn remove(&self, identity: &str) -> bool {
        self.inner.lock().remove(identity).is_some()
    }

    /// Queued identities in dispatch order
    pub fn identities(&self) -> Vec<String> {
        self.inner.lock().items.keys().map(|k| k.identity.clone()).collect()
    }

    /// Queued identities, plus whatever `f` reads while the queue is still locked
    pub(crate) fn identities_with<R>(&self, f: impl FnOnce() -> R) -> (Vec<String>, R) {
        let inner = self.inner.lock();
        let identities = inner.items.keys().map(|k| k.identity.clone()).collect();
        (identities, f())
    }

    /// Clear and re-put, in one critical section, every entry that was queued.
    ///
    /// Entries for agents not currently queued (in flight, waiting) are
    /// skipped so an agent never ends up in two places. Nothing changes if
    /// any entry carries an invalid priority.
    pub fn rerank(&self, entries: &[ScheduleEntry], now: Timestamp) -> Result<()> {
        for entry in entries {
            check_priority(entry.agent.identity(), entry.base_priority)?;
        }

        let mut inner = self.inner.lock();
        let queued: Vec<QueueItem> = inner.items.values().cloned().collect();
        inner.clear();

        for item in queued {
            let item = match entries.iter().find(|e| e.holds(&item.agent)) {
                Some(entry) => self.build(entry.agent.clone(), entry.base_priority, entry.last_dispatch, now),
                None => self.build(item.agent, item.base_priority, item.last_dispatch, now),
            };
            inner.insert(item);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::handle::{ActivationStatus, AgentHandle};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Stub(String);

    #[async_trait]
    impl AgentHandle for Stub {
        fn identity(&self) -> &str {
            &self.0
        }
        async fn run_one_tick(&self) -> Result<()> {
            Ok(())
        }
        fn activation_status(&self) -> ActivationStatus {
            ActivationStatus::Active
        }
        fn refresh(&self) {}
    }

    fn stub(name: &str) -> SharedAgent {
        Arc::new(Stub(name.to_string()))
    }

    fn drain(queue: &AgingPriorityQueue) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(item) = queue.get() {
            out.push(item.identity);
        }
        out
    }

    #[test]
    fn test_aging_score() {
        assert_eq!(aging_score(4.0, 100.0, 100.0, 0.1), 4.0);
        let aged = aging_score(4.0, 100.0, 110.0, 0.1);
        assert!((aged - 4.0 * (-1.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_priority_ordering_at_equal_times() {
        let queue = AgingPriorityQueue::new(0.1);
        for (name, base) in [("c", 3.0), ("b", 2.0), ("a", 1.0), ("e", 5.0), ("d", 4.0)] {
            queue.put(stub(name), base, 1000.0, 1000.0).unwrap();
        }
        assert_eq!(drain(&queue), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_ties_break_on_identity() {
        let queue = AgingPriorityQueue::new(0.1);
        queue.put(stub("zed"), 1.0, 50.0, 50.0).unwrap();
        queue.put(stub("amy"), 1.0, 50.0, 50.0).unwrap();
        queue.put(stub("max"), 1.0, 50.0, 50.0).unwrap();
        assert_eq!(drain(&queue), vec!["amy", "max", "zed"]);
    }

    #[test]
    fn test_aging_monotonicity_regardless_of_insertion_order() {
        let queue = AgingPriorityQueue::new(0.1);
        // Inserted later, but dispatched earlier
        queue.put(stub("recent"), 2.0, 1_000.0, 1_000.0).unwrap();
        queue.put(stub("stale"), 2.0, 900.0, 1_000.0).unwrap();
        assert_eq!(drain(&queue), vec!["stale", "recent"]);
    }

    #[test]
    fn test_idle_low_priority_overtakes_busy_high_priority() {
        let queue = AgingPriorityQueue::new(0.1);
        // base 1 just ran; base 50 has idled for 60s: 50 * e^-6 ~= 0.12 < 1
        queue.put(stub("busy"), 1.0, 1_060.0, 1_060.0).unwrap();
        queue.put(stub("idle"), 50.0, 1_000.0, 1_060.0).unwrap();
        assert_eq!(queue.front().unwrap().identity, "idle");
        assert_eq!(queue.back().unwrap().identity, "busy");
    }

    #[test]
    fn test_no_starvation_over_repeated_dispatch() {
        let queue = AgingPriorityQueue::new(0.5);
        let bases = [("a", 1.0), ("b", 2.0), ("c", 8.0), ("d", 40.0)];
        for (name, base) in bases {
            queue.put(stub(name), base, 0.0, 0.0).unwrap();
        }

        let mut dispatched = std::collections::HashSet::new();
        let mut now = 0.0;
        for _ in 0..40 {
            now += 1.0;
            let item = queue.get().unwrap();
            dispatched.insert(item.identity.clone());
            queue.put(item.agent, item.base_priority, now, now).unwrap();
        }
        assert_eq!(dispatched.len(), bases.len());
    }

    #[test]
    fn test_zero_base_priority_ranks_first() {
        let queue = AgingPriorityQueue::new(0.1);
        queue.put(stub("one"), 1.0, 0.0, 10.0).unwrap();
        queue.put(stub("zero"), 0.0, 10.0, 10.0).unwrap();
        let front = queue.front().unwrap();
        assert_eq!(front.identity, "zero");
        assert_eq!(front.score, 0.0);
    }

    #[test]
    fn test_invalid_priority_rejected() {
        let queue = AgingPriorityQueue::new(0.1);
        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            let err = queue.put(stub("x"), bad, 0.0, 0.0).unwrap_err();
            assert!(matches!(err, CadenceError::InvalidPriority { .. }));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_put_replaces_existing_identity() {
        let queue = AgingPriorityQueue::new(0.1);
        queue.put(stub("a"), 5.0, 0.0, 0.0).unwrap();
        queue.put(stub("b"), 3.0, 0.0, 0.0).unwrap();
        queue.put(stub("a"), 1.0, 0.0, 0.0).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.identities(), vec!["a", "b"]);
    }

    #[test]
    fn test_remove_and_contains() {
        let queue = AgingPriorityQueue::new(0.1);
        queue.put(stub("a"), 1.0, 0.0, 0.0).unwrap();
        assert!(queue.contains("a"));
        assert!(queue.remove("a"));
        assert!(!queue.remove("a"));
        assert!(!queue.contains("a"));
        assert!(queue.get().is_none());
    }

    #[test]
    fn test_clear() {
        let queue = AgingPriorityQueue::new(0.1);
        queue.put(stub("a"), 1.0, 0.0, 0.0).unwrap();
        queue.put(stub("b"), 1.0, 0.0, 0.0).unwrap();
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.front().is_none());
        assert!(queue.back().is_none());
    }

    #[test]
    fn test_score_at_decays() {
        let queue = AgingPriorityQueue::new(0.1);
        queue.put(stub("a"), 3.0, 100.0, 100.0).unwrap();
        let item = queue.front().unwrap();
        assert_eq!(item.score, 3.0);
        assert!(item.score_at(120.0) < item.score);
    }

    #[test]
    fn test_rerank_only_touches_queued_entries() {
        let queue = AgingPriorityQueue::new(0.0);
        let a = stub("a");
        let b = stub("b");
        let c = stub("c");
        queue.put(a.clone(), 1.0, 0.0, 0.0).unwrap();
        queue.put(b.clone(), 2.0, 0.0, 0.0).unwrap();

        let entries = vec![
            ScheduleEntry::new(a, 9.0, 0.0),
            ScheduleEntry::new(b, 0.5, 0.0),
            // c is not queued (in flight elsewhere) and must stay out
            ScheduleEntry::new(c, 0.1, 0.0),
        ];
        queue.rerank(&entries, 1.0).unwrap();
        assert_eq!(queue.identities(), vec!["b", "a"]);
    }

    #[test]
    fn test_rerank_invalid_priority_leaves_queue_untouched() {
        let queue = AgingPriorityQueue::new(0.1);
        let a = stub("a");
        queue.put(a.clone(), 1.0, 0.0, 0.0).unwrap();
        let err = queue.rerank(&[ScheduleEntry::new(a, -3.0, 0.0)], 1.0);
        assert!(err.is_err());
        assert_eq!(queue.front().unwrap().base_priority, 1.0);
    }

    #[test]
    fn test_rerank_ignores_entry_for_other_handle() {
        let queue = AgingPriorityQueue::new(0.0);
        let queued = stub("a");
        queue.put(queued.clone(), 1.0, 0.0, 0.0).unwrap();

        // Same identity, different handle: the queued item keeps its priority
        queue.rerank(&[ScheduleEntry::new(stub("a"), 7.0, 0.0)], 1.0).unwrap();
        let front = queue.front().unwrap();
        assert_eq!(front.base_priority, 1.0);
        assert!(Arc::ptr_eq(&front.agent, &queued));
    }

    #[test]
    fn test_identities_with_reads_under_lock() {
        let queue = AgingPriorityQueue::new(0.0);
        queue.put(stub("a"), 1.0, 0.0, 0.0).unwrap();
        let (ids, extra) = queue.identities_with(|| 42);
        assert_eq!(ids, vec!["a"]);
        assert_eq!(extra, 42);
    }
}
