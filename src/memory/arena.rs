//! Episode arena.
//!
//! Episodes form a tree (task roots with execution children), stored flat
//! and linked by index so there is no shared or cyclic ownership.

use serde::{Deserialize, Serialize};

use super::ExecutionTrace;
use crate::id::{Timestamp, now_secs};

/// Index of an episode in its arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeId(pub usize);

impl std::fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeKind {
    /// Root episode opened when a task starts
    Task,
    /// One Execute stage
    Execution,
}

/// A recorded unit of history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: EpisodeId,
    pub kind: EpisodeKind,
    pub summary: String,
    pub parent: Option<EpisodeId>,
    pub children: Vec<EpisodeId>,
    pub trace: Option<ExecutionTrace>,
    pub created_at: Timestamp,
}

/// Flat storage for episodes
#[derive(Debug, Default)]
pub struct EpisodeArena {
    episodes: Vec<Episode>,
}

impl EpisodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an episode, linking it under `parent` when that parent exists
    pub fn push(
        &mut self,
        kind: EpisodeKind,
        summary: impl Into<String>,
        parent: Option<EpisodeId>,
        trace: Option<ExecutionTrace>,
    ) -> EpisodeId {
        let id = EpisodeId(self.episodes.len());
        let parent = parent.filter(|p| p.0 < self.episodes.len());
        if let Some(p) = parent {
            self.episodes[p.0].children.push(id);
        }
        self.episodes.push(Episode {
            id,
            kind,
            summary: summary.into(),
            parent,
            children: Vec::new(),
            trace,
            created_at: now_secs(),
        });
        id
    }

    pub fn get(&self, id: EpisodeId) -> Option<&Episode> {
        self.episodes.get(id.0)
    }

    pub fn set_summary(&mut self, id: EpisodeId, summary: impl Into<String>) -> bool {
        match self.episodes.get_mut(id.0) {
            Some(episode) => {
                episode.summary = summary.into();
                true
            }
            None => false,
        }
    }

    pub fn children(&self, id: EpisodeId) -> Vec<&Episode> {
        self.get(id)
            .map(|e| e.children.iter().filter_map(|c| self.get(*c)).collect())
            .unwrap_or_default()
    }

    /// Newest first
    pub fn recent(&self, limit: usize) -> Vec<&Episode> {
        self.episodes.iter().rev().take(limit).collect()
    }

    /// Case-insensitive substring match over summaries and observations, newest first
    pub fn search(&self, query: &str, limit: usize) -> Vec<&Episode> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.episodes
            .iter()
            .rev()
            .filter(|e| {
                e.summary.to_lowercase().contains(&needle)
                    || e.trace
                        .as_ref()
                        .is_some_and(|t| t.observation.to_lowercase().contains(&needle))
            })
            .take(limit)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_links_parent_and_child() {
        let mut arena = EpisodeArena::new();
        let root = arena.push(EpisodeKind::Task, "task: greet", None, None);
        let child = arena.push(EpisodeKind::Execution, "echo.say [ok]: hi", Some(root), None);

        assert_eq!(arena.get(child).unwrap().parent, Some(root));
        assert_eq!(arena.get(root).unwrap().children, vec![child]);
        assert_eq!(arena.children(root).len(), 1);
    }

    #[test]
    fn test_push_ignores_dangling_parent() {
        let mut arena = EpisodeArena::new();
        let id = arena.push(EpisodeKind::Execution, "orphan", Some(EpisodeId(42)), None);
        assert_eq!(arena.get(id).unwrap().parent, None);
    }

    #[test]
    fn test_recent_newest_first() {
        let mut arena = EpisodeArena::new();
        for i in 0..5 {
            arena.push(EpisodeKind::Execution, format!("e{}", i), None, None);
        }
        let recent: Vec<String> = arena.recent(2).into_iter().map(|e| e.summary.clone()).collect();
        assert_eq!(recent, vec!["e4".to_string(), "e3".to_string()]);
    }

    #[test]
    fn test_search_case_insensitive() {
        let mut arena = EpisodeArena::new();
        arena.push(EpisodeKind::Execution, "Fetched WEATHER report", None, None);
        arena.push(EpisodeKind::Execution, "wrote a note", None, None);
        assert_eq!(arena.search("weather", 10).len(), 1);
        assert!(arena.search("   ", 10).is_empty());
    }

    #[test]
    fn test_set_summary() {
        let mut arena = EpisodeArena::new();
        let id = arena.push(EpisodeKind::Task, "draft", None, None);
        assert!(arena.set_summary(id, "final"));
        assert_eq!(arena.get(id).unwrap().summary, "final");
        assert!(!arena.set_summary(EpisodeId(9), "nope"));
    }
}
