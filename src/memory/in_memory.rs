//! In-process memory backed by an episode arena

use std::collections::VecDeque;

use super::{
    Episode, EpisodeArena, EpisodeId, EpisodeKind, Event, ExecutionTrace, Goal, Memory, Task, TaskStatus, Thought,
};

#[derive(Debug, Default)]
pub struct InMemoryMemory {
    tasks: VecDeque<Task>,
    completed: Vec<Task>,
    goals: Vec<Goal>,
    events: Vec<Event>,
    thought: Thought,
    relevant_information: String,
    focus_queries: Vec<String>,
    arena: EpisodeArena,
    /// Root episode of the task in progress
    task_root: Option<EpisodeId>,
}

impl InMemoryMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push_back(task);
        self
    }

    pub fn completed_tasks(&self) -> &[Task] {
        &self.completed
    }

    pub fn pending_task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn arena(&self) -> &EpisodeArena {
        &self.arena
    }
}

impl Memory for InMemoryMemory {
    fn current_task(&self) -> Option<Task> {
        self.tasks.front().cloned()
    }

    fn current_goals(&self) -> Vec<Goal> {
        self.goals.clone()
    }

    fn record_execution(&mut self, trace: ExecutionTrace) -> EpisodeId {
        let summary = trace.summary();
        self.arena
            .push(EpisodeKind::Execution, summary, self.task_root, Some(trace))
    }

    fn set_goals(&mut self, goals: Vec<Goal>) {
        self.goals = goals;
    }

    fn start_task(&mut self) {
        let Some(task) = self.tasks.front_mut() else {
            return;
        };
        if task.status != TaskStatus::NotStarted {
            return;
        }
        task.status = TaskStatus::InProgress;
        let summary = format!("task: {}", task.description);
        self.task_root = Some(self.arena.push(EpisodeKind::Task, summary, None, None));
    }

    fn complete_task(&mut self) -> Option<Task> {
        let mut task = self.tasks.pop_front()?;
        task.status = TaskStatus::Done;
        if let Some(root) = self.task_root.take() {
            let executed = self.arena.children(root).len();
            self.arena
                .set_summary(root, format!("task: {} (done after {} executions)", task.description, executed));
        }
        self.goals.clear();
        self.relevant_information.clear();
        self.completed.push(task.clone());
        Some(task)
    }

    fn add_task(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    fn add_event(&mut self, event: Event) {
        self.events.push(event);
    }

    fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    fn thought(&self) -> Thought {
        self.thought.clone()
    }

    fn set_thought(&mut self, thought: Thought) {
        self.thought = thought;
    }

    fn relevant_information(&self) -> String {
        self.relevant_information.clone()
    }

    fn set_relevant_information(&mut self, info: String) {
        self.relevant_information = info;
    }

    fn focus_queries(&self) -> Vec<String> {
        self.focus_queries.clone()
    }

    fn set_focus_queries(&mut self, queries: Vec<String>) {
        self.focus_queries = queries;
    }

    fn recent_episodes(&self, limit: usize) -> Vec<Episode> {
        self.arena.recent(limit).into_iter().cloned().collect()
    }

    fn episode(&self, id: EpisodeId) -> Option<Episode> {
        self.arena.get(id).cloned()
    }

    fn search_episodes(&self, query: &str, limit: usize) -> Vec<Episode> {
        self.arena.search(query, limit).into_iter().cloned().collect()
    }
}
