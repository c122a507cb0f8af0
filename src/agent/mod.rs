//! Agents and their Plan/Attend/Execute stage machine.
//!
//! Each dispatcher tick runs exactly one stage handler. Plan turns the
//! current task into an ordered goal list, Attend gathers context for the
//! top goal, Execute invokes the goal's action and records what happened.
//! Execute failures are observations for the next Plan, never errors.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::capability::{CapabilityRegistry, Switchboard};
use crate::config::AgentConfig;
use crate::error::{CadenceError, Result};
use crate::memory::{Episode, Event, ExecutionTrace, Goal, GoalStatus, InMemoryMemory, Memory, Task};
use crate::reasoning::{
    AttendPrompt, Decision, ExecutePrompt, PlanPrompt, PromptContext, Reasoner, ReasoningError, decide_with_retry,
};
use crate::scheduler::{ActivationStatus, AgentHandle};

mod stage;

pub use stage::{Stage, StageHalt, Transition};

/// Episodes pulled into context per search
const SEARCH_LIMIT: usize = 3;
/// Recent episodes shown to the planner
const RECENT_EPISODES: usize = 5;

/// Persistable slice of agent state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub name: String,
    pub stage: Stage,
    pub status: ActivationStatus,
}

impl AgentSnapshot {
    /// Write the snapshot as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[derive(Debug, Default)]
struct AgentState {
    stage: Stage,
    status: ActivationStatus,
    last_halt: Option<StageHalt>,
}

/// Input delivered from outside, applied on the next `refresh`
#[derive(Debug, Default)]
struct Inbox {
    tasks: Vec<Task>,
    events: Vec<Event>,
}

pub struct Agent {
    name: String,
    config: AgentConfig,
    reasoner: Arc<dyn Reasoner>,
    capabilities: Arc<CapabilityRegistry>,
    memory: Mutex<Box<dyn Memory>>,
    state: Mutex<AgentState>,
    inbox: Mutex<Inbox>,
    ticks: AtomicU64,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        reasoner: Arc<dyn Reasoner>,
        capabilities: Arc<CapabilityRegistry>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            name: name.into(),
            config: config.clone(),
            reasoner,
            capabilities,
            memory: Mutex::new(Box::new(InMemoryMemory::new())),
            state: Mutex::new(AgentState::default()),
            inbox: Mutex::new(Inbox::default()),
            ticks: AtomicU64::new(0),
        }
    }

    /// Swap in a different memory backend
    pub fn with_memory(mut self, memory: impl Memory + 'static) -> Self {
        self.memory = Mutex::new(Box::new(memory));
        self
    }

    /// Seed a task directly into memory
    pub fn with_task(mut self, task: Task) -> Self {
        self.memory.get_mut().add_task(task);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> Stage {
        self.state.lock().stage
    }

    pub fn status(&self) -> ActivationStatus {
        self.state.lock().status
    }

    /// Why the most recent tick did not advance, if it didn't
    pub fn last_halt(&self) -> Option<StageHalt> {
        self.state.lock().last_halt.clone()
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Receive `talk_to_agent` messages addressed to this agent's name.
    ///
    /// The switchboard holds a weak reference, so it never keeps the agent alive.
    pub fn connect(self: &Arc<Self>, switchboard: &Switchboard) {
        let agent = Arc::downgrade(self);
        switchboard.connect(self.name.clone(), move |event| {
            if let Some(agent) = agent.upgrade() {
                agent.deliver_event(event);
            }
        });
    }

    /// Queue an event; takes effect on the next `refresh`
    pub fn deliver_event(&self, event: Event) {
        self.inbox.lock().events.push(event);
    }

    /// Queue a task; takes effect on the next `refresh`
    pub fn assign_task(&self, task: Task) {
        self.inbox.lock().tasks.push(task);
    }

    /// Read-only access to memory
    pub fn inspect_memory<R>(&self, f: impl FnOnce(&dyn Memory) -> R) -> R {
        let memory = self.memory.lock();
        f(&**memory)
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        let state = self.state.lock();
        AgentSnapshot {
            name: self.name.clone(),
            stage: state.stage,
            status: state.status,
        }
    }

    /// Re-apply a snapshot taken from an agent of the same name
    pub fn restore(&self, snapshot: &AgentSnapshot) -> Result<()> {
        if snapshot.name != self.name {
            return Err(CadenceError::InvalidState(format!(
                "snapshot for {} cannot restore {}",
                snapshot.name, self.name
            )));
        }
        let mut state = self.state.lock();
        state.stage = snapshot.stage;
        state.status = snapshot.status;
        Ok(())
    }

    /// Run the handler for the current stage and store the resulting stage.
    pub async fn run_tick(&self) -> std::result::Result<Stage, StageHalt> {
        let stage = self.stage();
        self.ticks.fetch_add(1, Ordering::SeqCst);

        let result = match stage {
            Stage::Plan => self.plan().await,
            Stage::Attend => self.attend().await,
            Stage::Execute => self.execute().await,
        };

        let mut state = self.state.lock();
        match result {
            Ok(transition) => {
                let next = stage.after(transition);
                state.stage = next;
                state.last_halt = None;
                tracing::debug!(agent = %self.name, from = %stage, to = %next, "Stage transition");
                Ok(next)
            }
            Err(halt) => {
                state.last_halt = Some(halt.clone());
                Err(halt)
            }
        }
    }

    async fn decide(&self, context: PromptContext) -> std::result::Result<Decision, ReasoningError> {
        decide_with_retry(
            self.reasoner.as_ref(),
            &context,
            self.config.decision_timeout(),
            self.config.decision_retries,
        )
        .await
    }

    async fn plan(&self) -> std::result::Result<Transition, StageHalt> {
        let prepared = {
            let mut memory = self.memory.lock();
            memory.start_task();
            memory.current_task().map(|task| {
                let events = memory.take_events();
                let prompt = PlanPrompt {
                    agent: self.name.clone(),
                    task,
                    goals: memory.current_goals(),
                    thought: memory.thought(),
                    events: events.clone(),
                    recent_episodes: memory.recent_episodes(RECENT_EPISODES),
                    capabilities: self.capabilities.describe(),
                };
                (prompt, events)
            })
        };

        let Some((prompt, events)) = prepared else {
            self.state.lock().status = ActivationStatus::Waiting;
            tracing::info!(agent = %self.name, "No task, waiting");
            return Err(StageHalt::NoTask);
        };

        let plan = match self.decide(PromptContext::Plan(prompt)).await.and_then(Decision::into_plan) {
            Ok(plan) => plan,
            Err(e) => {
                let mut memory = self.memory.lock();
                // Events go back so the next attempt still sees them
                for event in events {
                    memory.add_event(event);
                }
                memory.append_criticism(&format!("Planning failed: {}", e));
                tracing::warn!(agent = %self.name, error = %e, "Planning decision failed");
                return Err(StageHalt::Decision(e));
            }
        };

        let mut memory = self.memory.lock();
        memory.set_thought(plan.thought);
        memory.set_focus_queries(plan.search_queries);

        let mut goals = plan.goals;
        let Some(top) = goals.first_mut() else {
            if let Some(task) = memory.complete_task() {
                tracing::info!(agent = %self.name, task = %task.description, "Task complete");
            }
            return Ok(Transition::Stay);
        };

        if let Err(e) = self.capabilities.resolve(&top.capability, &top.action) {
            memory.append_criticism(&format!(
                "Capability: {} Action: {} are not valid ({})",
                top.capability, top.action, e
            ));
            tracing::warn!(agent = %self.name, error = %e, "Planned goal failed validation");
            return Err(StageHalt::Validation(e.to_string()));
        }

        top.status = GoalStatus::InProgress;
        memory.set_goals(goals);
        Ok(Transition::Advance)
    }

    async fn attend(&self) -> std::result::Result<Transition, StageHalt> {
        let mut recalled: Vec<Episode> = Vec::new();

        for iteration in 1..=self.config.max_attend_iterations {
            let prompt = {
                let memory = self.memory.lock();
                let Some(goal) = memory.current_goals().into_iter().next() else {
                    tracing::warn!(agent = %self.name, "No goal to attend to");
                    return Ok(Transition::Advance);
                };
                let focus_queries = memory.focus_queries();
                if iteration == 1 {
                    for query in &focus_queries {
                        for episode in memory.search_episodes(query, SEARCH_LIMIT) {
                            push_unique(&mut recalled, episode);
                        }
                    }
                }
                AttendPrompt {
                    agent: self.name.clone(),
                    task: memory.current_task(),
                    goal,
                    relevant_information: memory.relevant_information(),
                    focus_queries,
                    recalled: recalled.clone(),
                    iteration,
                }
            };

            let decision = match self.decide(PromptContext::Attend(prompt)).await.and_then(Decision::into_attend) {
                Ok(decision) => decision,
                Err(e) => {
                    self.memory.lock().append_criticism(&format!("Attention failed: {}", e));
                    tracing::warn!(agent = %self.name, error = %e, "Attention decision failed");
                    return Err(StageHalt::Decision(e));
                }
            };

            let wants_more = decision.wants_more();
            {
                let mut memory = self.memory.lock();
                memory.set_relevant_information(decision.relevant_information);
                if let Some(id) = decision.remember_episode {
                    match memory.episode(id) {
                        Some(episode) => push_unique(&mut recalled, episode),
                        None => tracing::debug!(agent = %self.name, episode = %id, "Unknown episode requested"),
                    }
                }
                if let Some(query) = decision.search_query {
                    for episode in memory.search_episodes(&query, SEARCH_LIMIT) {
                        push_unique(&mut recalled, episode);
                    }
                }
            }

            if !wants_more {
                break;
            }
        }

        Ok(Transition::Advance)
    }

    async fn execute(&self) -> std::result::Result<Transition, StageHalt> {
        let (goal, relevant_information) = {
            let memory = self.memory.lock();
            (memory.current_goals().into_iter().next(), memory.relevant_information())
        };

        let (trace, suspends) = match goal {
            Some(goal) => self.execute_goal(&goal, relevant_information).await,
            None => (
                ExecutionTrace::failure(&Goal::new("", "", ""), Value::Null, "No goal to execute"),
                false,
            ),
        };

        tracing::info!(
            agent = %self.name,
            capability = %trace.capability,
            action = %trace.action,
            success = trace.success,
            "Executed"
        );

        let mut memory = self.memory.lock();
        let mut goals = memory.current_goals();
        if let Some(top) = goals.first_mut() {
            top.status = if trace.success {
                GoalStatus::Succeeded
            } else {
                GoalStatus::Failed
            };
            memory.set_goals(goals);
        }
        let parked = suspends && trace.success;
        memory.record_execution(trace);
        drop(memory);

        if parked {
            self.state.lock().status = ActivationStatus::Waiting;
            tracing::info!(agent = %self.name, "Waiting for input");
        }
        Ok(Transition::Advance)
    }

    /// Every failure here becomes an observation in the returned trace.
    ///
    /// The flag is set when the resolved action suspends the agent.
    async fn execute_goal(&self, goal: &Goal, relevant_information: String) -> (ExecutionTrace, bool) {
        let action = match self.capabilities.resolve(&goal.capability, &goal.action) {
            Ok(action) => action,
            Err(e) => return (ExecutionTrace::failure(goal, Value::Null, e.to_string()), false),
        };
        let suspends = action.suspends();

        let prompt = ExecutePrompt {
            agent: self.name.clone(),
            goal: goal.clone(),
            action: action.signature(),
            relevant_information,
        };
        let decision = match self.decide(PromptContext::Execute(prompt)).await.and_then(Decision::into_execute) {
            Ok(decision) => decision,
            Err(e) => {
                let trace = ExecutionTrace::failure(goal, Value::Null, format!("Could not obtain arguments: {}", e));
                return (trace, suspends);
            }
        };

        let raw = Value::Object(decision.arguments.clone());
        let args = match action.evaluate(&decision.arguments) {
            Ok(args) => args,
            Err(e) => return (ExecutionTrace::failure(goal, raw, e), suspends),
        };

        let trace = match action.invoke(args).await {
            Ok(observation) => ExecutionTrace::success(goal, raw, observation),
            Err(observation) => ExecutionTrace::failure(goal, raw, observation),
        };
        (trace, suspends)
    }
}

fn push_unique(recalled: &mut Vec<Episode>, episode: Episode) {
    if !recalled.iter().any(|e| e.id == episode.id) {
        recalled.push(episode);
    }
}

#[async_trait]
impl AgentHandle for Agent {
    fn identity(&self) -> &str {
        &self.name
    }

    /// Decision failures surface as errors; other halts are routine.
    async fn run_one_tick(&self) -> Result<()> {
        match self.run_tick().await {
            Ok(_) | Err(StageHalt::NoTask) => Ok(()),
            Err(StageHalt::Decision(e)) => Err(CadenceError::Reasoning(e)),
            Err(halt) => {
                tracing::warn!(agent = %self.name, stage = %self.stage(), halt = %halt, "Tick halted");
                Ok(())
            }
        }
    }

    fn activation_status(&self) -> ActivationStatus {
        self.status()
    }

    /// Apply inbox arrivals. Only an arrival can reactivate a waiting agent.
    fn refresh(&self) {
        let (tasks, events) = {
            let mut inbox = self.inbox.lock();
            (std::mem::take(&mut inbox.tasks), std::mem::take(&mut inbox.events))
        };
        if tasks.is_empty() && events.is_empty() {
            return;
        }

        let has_task = {
            let mut memory = self.memory.lock();
            for task in tasks {
                memory.add_task(task);
            }
            for event in events {
                if memory.current_task().is_none() {
                    memory.add_task(Task::new(format!("Handle event: {}", event.content)));
                }
                memory.add_event(event);
            }
            memory.current_task().is_some()
        };

        let mut state = self.state.lock();
        if state.status == ActivationStatus::Waiting && has_task {
            state.status = ActivationStatus::Active;
            tracing::info!(agent = %self.name, "Work arrived, reactivating");
        }
    }
}
