//! Agent memory - tasks, goals, thoughts, events and episodic history
//!
//! The stage machine only talks to memory through the `Memory` trait.
//! `InMemoryMemory` is the bundled implementation, built on an
//! `EpisodeArena` of index-linked episodes.

use serde::{Deserialize, Serialize};

use crate::id::{Timestamp, generate_task_id, now_secs};

mod arena;
mod in_memory;

pub use arena::{Episode, EpisodeArena, EpisodeId, EpisodeKind};
pub use in_memory::InMemoryMemory;

/// Status of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Done,
}

/// A unit of work assigned to an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: generate_task_id(),
            description: description.into(),
            status: TaskStatus::NotStarted,
        }
    }
}

/// Status of a goal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoalStatus {
    #[default]
    NotStarted,
    InProgress,
    Succeeded,
    Failed,
}

/// A single actionable step tagged with the capability/action that carries it out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub description: String,
    pub capability: String,
    pub action: String,
    #[serde(default, rename = "validation-condition", alias = "validation_condition")]
    pub validation_condition: String,
    #[serde(default)]
    pub status: GoalStatus,
}

impl Goal {
    pub fn new(description: impl Into<String>, capability: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            capability: capability.into(),
            action: action.into(),
            validation_condition: String::new(),
            status: GoalStatus::NotStarted,
        }
    }
}

/// The agent's running train of thought, carried across stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thought {
    pub text: String,
    pub reasoning: String,
    pub criticism: String,
}

impl Thought {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Append a note to the criticism, one per line
    pub fn append_criticism(&mut self, note: &str) {
        if !self.criticism.is_empty() {
            self.criticism.push('\n');
        }
        self.criticism.push_str(note);
    }
}

/// Something that happened outside the agent (a message, a reply, a signal)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

impl Event {
    pub fn new(kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            content: content.into(),
        }
    }
}

/// The outcome of one Execute stage, success or failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub goal: String,
    pub capability: String,
    pub action: String,
    pub arguments: serde_json::Value,
    pub observation: String,
    pub success: bool,
    pub timestamp: Timestamp,
}

impl ExecutionTrace {
    pub fn success(goal: &Goal, arguments: serde_json::Value, observation: impl Into<String>) -> Self {
        Self::build(goal, arguments, observation.into(), true)
    }

    pub fn failure(goal: &Goal, arguments: serde_json::Value, observation: impl Into<String>) -> Self {
        Self::build(goal, arguments, observation.into(), false)
    }

    fn build(goal: &Goal, arguments: serde_json::Value, observation: String, success: bool) -> Self {
        Self {
            goal: goal.description.clone(),
            capability: goal.capability.clone(),
            action: goal.action.clone(),
            arguments,
            observation,
            success,
            timestamp: now_secs(),
        }
    }

    /// One-line summary used as the episode text
    pub fn summary(&self) -> String {
        let outcome = if self.success { "ok" } else { "failed" };
        format!(
            "{}.{} [{}]: {}",
            self.capability, self.action, outcome, self.observation
        )
    }
}

/// Storage the stage machine relies on.
///
/// `current_task`, `current_goals` and `record_execution` are the core
/// contract; the rest carries planning context between stages.
pub trait Memory: Send {
    fn current_task(&self) -> Option<Task>;
    fn current_goals(&self) -> Vec<Goal>;
    fn record_execution(&mut self, trace: ExecutionTrace) -> EpisodeId;

    fn set_goals(&mut self, goals: Vec<Goal>);
    /// Mark the current task in progress (no-op if none or already started)
    fn start_task(&mut self);
    /// Finish the current task and clear its goals
    fn complete_task(&mut self) -> Option<Task>;
    fn add_task(&mut self, task: Task);

    fn add_event(&mut self, event: Event);
    fn take_events(&mut self) -> Vec<Event>;

    fn thought(&self) -> Thought;
    fn set_thought(&mut self, thought: Thought);

    fn relevant_information(&self) -> String;
    fn set_relevant_information(&mut self, info: String);

    fn focus_queries(&self) -> Vec<String>;
    fn set_focus_queries(&mut self, queries: Vec<String>);

    fn recent_episodes(&self, limit: usize) -> Vec<Episode>;
    fn episode(&self, id: EpisodeId) -> Option<Episode>;
    fn search_episodes(&self, query: &str, limit: usize) -> Vec<Episode>;

    fn append_criticism(&mut self, note: &str) {
        let mut thought = self.thought();
        thought.append_criticism(note);
        self.set_thought(thought);
    }
}
