//! Demo organization for `cadence run`.
//!
//! Agents share the built-in capabilities and an offline stand-in for a
//! language model: each task becomes one goal, and once that goal has been
//! executed the next plan comes back empty, completing the task. Prompts and
//! replies go through the same text path a real model would use.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use cadence::agent::Agent;
use cadence::capability::{CapabilityRegistry, NoteStore, Switchboard, builtin_registry};
use cadence::config::Config;
use cadence::memory::{Goal, GoalStatus, Task, Thought};
use cadence::reasoning::{
    AttendDecision, Decision, ExecuteDecision, ModelReasoner, PlanDecision, PromptContext, ReasoningError, TextModel,
    extract_json,
};

pub struct Organization {
    pub working: Vec<Arc<Agent>>,
    pub idle: Vec<Arc<Agent>>,
    pub notes: NoteStore,
    pub switchboard: Switchboard,
}

impl Organization {
    pub fn all(&self) -> impl Iterator<Item = &Arc<Agent>> {
        self.working.iter().chain(self.idle.iter())
    }
}

/// Offline model: reads the context back out of the prompt and answers
/// with a scripted decision wrapped in prose
struct DemoModel;

#[async_trait]
impl TextModel for DemoModel {
    async fn complete(&self, prompt: &str) -> Result<String, ReasoningError> {
        let json = extract_json(prompt).ok_or_else(|| ReasoningError::Parse("prompt carries no context".into()))?;
        let context: PromptContext = serde_json::from_str(json).map_err(|e| ReasoningError::Parse(e.to_string()))?;
        let decision = scripted_decision(&context)?;
        let body = serde_json::to_string_pretty(&decision).map_err(|e| ReasoningError::Parse(e.to_string()))?;
        Ok(format!("Here is my decision.\n```json\n{}\n```\n", body))
    }
}

/// What the i-th working agent is asked to do
fn demo_task(i: usize, idle: usize) -> Task {
    match i % 4 {
        0 => Task::new(format!("Greet the team (round {})", i)),
        1 => Task::new(format!("Write down status report {}", i)),
        2 => Task::new(format!("Wait for a reply to request {}", i)),
        _ if idle > 0 => Task::new(format!("Tell idle-{} that report {} is ready", i % idle, i)),
        _ => Task::new(format!("Tell worker-0 that report {} is ready", i)),
    }
}

/// Build `working` agents with one task each and `idle` agents with none
pub fn build_organization(config: &Config, working: usize, idle_count: usize) -> Organization {
    let (registry, notes, switchboard) = builtin_registry();
    let registry: Arc<CapabilityRegistry> = Arc::new(registry);
    let reasoner = Arc::new(ModelReasoner::new(Arc::new(DemoModel)));

    let make = |name: String| Agent::new(name, reasoner.clone(), registry.clone(), &config.agent);

    let working: Vec<Arc<Agent>> = (0..working)
        .map(|i| Arc::new(make(format!("worker-{}", i)).with_task(demo_task(i, idle_count))))
        .collect();
    let idle: Vec<Arc<Agent>> = (0..idle_count).map(|i| Arc::new(make(format!("idle-{}", i)))).collect();

    for agent in working.iter().chain(idle.iter()) {
        agent.connect(&switchboard);
    }

    Organization {
        working,
        idle,
        notes,
        switchboard,
    }
}

fn recipient(description: &str) -> String {
    description
        .strip_prefix("Tell ")
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or("worker-0")
        .to_string()
}

fn scripted_decision(context: &PromptContext) -> Result<Decision, ReasoningError> {
    let decision = match context {
        PromptContext::Plan(prompt) => {
            let finished = prompt
                .goals
                .first()
                .is_some_and(|g| matches!(g.status, GoalStatus::Succeeded | GoalStatus::Failed));
            let description = prompt.task.description.clone();
            let goals = if finished {
                Vec::new()
            } else if description.starts_with("Write down") {
                vec![Goal::new(description, "notes", "write")]
            } else if description.starts_with("Wait for") {
                vec![Goal::new(description, "coordination", "wait")]
            } else if description.starts_with("Tell ") {
                vec![Goal::new(description, "coordination", "talk_to_agent")]
            } else {
                vec![Goal::new(description, "echo", "say")]
            };
            Decision::Plan(PlanDecision {
                thought: Thought::new(format!("Working on '{}'", prompt.task.description)),
                goals,
                search_queries: Vec::new(),
            })
        }
        PromptContext::Attend(prompt) => Decision::Attend(AttendDecision {
            relevant_information: format!("Goal: {}", prompt.goal.description),
            ..Default::default()
        }),
        PromptContext::Execute(prompt) => {
            let arguments = match (prompt.goal.capability.as_str(), prompt.goal.action.as_str()) {
                ("notes", _) => json!({"key": prompt.agent, "text": prompt.goal.description}),
                ("coordination", "wait") => json!({"reason": prompt.goal.description}),
                ("coordination", _) => json!({
                    "recipient": recipient(&prompt.goal.description),
                    "message": format!("{}: {}", prompt.agent, prompt.goal.description),
                }),
                _ => json!({"text": format!("{} says: {}", prompt.agent, prompt.goal.description)}),
            };
            Decision::Execute(ExecuteDecision {
                thought: String::new(),
                arguments: match arguments {
                    Value::Object(map) => map,
                    _ => Default::default(),
                },
            })
        }
    };
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence::agent::Stage;
    use cadence::scheduler::{ActivationStatus, AgentHandle};

    #[test]
    fn test_build_organization_counts() {
        let org = build_organization(&Config::default(), 3, 2);
        assert_eq!(org.working.len(), 3);
        assert_eq!(org.idle.len(), 2);
        assert_eq!(org.all().count(), 5);
        assert_eq!(org.working[1].name(), "worker-1");
    }

    #[test]
    fn test_recipient_from_description() {
        assert_eq!(recipient("Tell idle-1 that report 3 is ready"), "idle-1");
        assert_eq!(recipient("Greet the team"), "worker-0");
    }

    #[tokio::test]
    async fn test_demo_model_answers_through_text() {
        let org = build_organization(&Config::default(), 1, 0);
        let greeter = &org.working[0];
        assert_eq!(greeter.run_tick().await, Ok(Stage::Attend));
        let goals = greeter.inspect_memory(|m| m.current_goals());
        assert_eq!(goals[0].capability, "echo");
    }

    #[tokio::test]
    async fn test_talker_wakes_idle_agent() {
        let org = build_organization(&Config::default(), 4, 1);
        let idle = &org.idle[0];
        assert!(idle.run_tick().await.is_err());
        assert_eq!(idle.activation_status(), ActivationStatus::Waiting);

        let talker = &org.working[3];
        for _ in 0..3 {
            talker.run_tick().await.unwrap();
        }
        idle.refresh();
        assert_eq!(idle.activation_status(), ActivationStatus::Active);
        let task = idle.inspect_memory(|m| m.current_task()).unwrap();
        assert!(task.description.starts_with("Handle event: worker-3:"));
    }

    #[tokio::test]
    async fn test_waiter_parks_with_task() {
        let org = build_organization(&Config::default(), 3, 0);
        let waiter = &org.working[2];
        for _ in 0..3 {
            waiter.run_tick().await.unwrap();
        }
        assert_eq!(waiter.activation_status(), ActivationStatus::Waiting);
        assert!(waiter.inspect_memory(|m| m.current_task()).is_some());
    }

    #[tokio::test]
    async fn test_worker_completes_task_then_waits() {
        let org = build_organization(&Config::default(), 2, 0);
        let writer = &org.working[1];

        for _ in 0..3 {
            writer.run_tick().await.unwrap();
        }
        assert_eq!(writer.stage(), Stage::Plan);
        assert!(org.notes.lock().contains_key("worker-1"));

        // Empty plan completes the task; the next one finds nothing to do
        assert_eq!(writer.run_tick().await, Ok(Stage::Plan));
        assert!(writer.run_tick().await.is_err());
        assert_eq!(writer.activation_status(), ActivationStatus::Waiting);
    }
}
