//! Reasoning collaborator - the external service that turns a prompt into a decision
//!
//! This module provides:
//! - `Reasoner` trait for the decision service
//! - Typed prompt contexts and decisions, one pair per stage
//! - `decide_with_retry` wrapping every call in a timeout and a bounded retry
//! - `parse_decision` for mapping model text onto a decision
//! - `ModelReasoner` for driving a text-completion model through that parser
//! - `ScriptedReasoner` for tests

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::agent::Stage;
use crate::memory::{Episode, EpisodeId, Event, Goal, Task, Thought};

mod model;
mod parse;
mod scripted;

pub use model::{ModelReasoner, TextModel, render_prompt};
pub use parse::{extract_json, parse_decision};
pub use scripted::ScriptedReasoner;

/// Errors produced by a reasoning call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReasoningError {
    #[error("Decision could not be parsed: {0}")]
    Parse(String),

    #[error("Decision timed out after {0:?}")]
    Timeout(Duration),

    #[error("Reasoning service unavailable: {0}")]
    Unavailable(String),
}

impl ReasoningError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ReasoningError::Parse(_) => true,
            ReasoningError::Timeout(_) => true,
            ReasoningError::Unavailable(_) => false,
        }
    }
}

/// Stateless decision service - each call is independent
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn decide(&self, context: &PromptContext) -> Result<Decision, ReasoningError>;
}

/// Everything the reasoner sees for a Plan decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPrompt {
    pub agent: String,
    pub task: Task,
    pub goals: Vec<Goal>,
    pub thought: Thought,
    pub events: Vec<Event>,
    pub recent_episodes: Vec<Episode>,
    /// Rendered capability documentation
    pub capabilities: String,
}

/// Everything the reasoner sees for one Attend iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendPrompt {
    pub agent: String,
    pub task: Option<Task>,
    pub goal: Goal,
    pub relevant_information: String,
    pub focus_queries: Vec<String>,
    pub recalled: Vec<Episode>,
    pub iteration: u32,
}

/// Everything the reasoner sees when asked for action arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutePrompt {
    pub agent: String,
    pub goal: Goal,
    /// Rendered documentation for the resolved action
    pub action: String,
    pub relevant_information: String,
}

/// Structured prompt, one variant per stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum PromptContext {
    Plan(PlanPrompt),
    Attend(AttendPrompt),
    Execute(ExecutePrompt),
}

impl PromptContext {
    pub fn stage(&self) -> Stage {
        match self {
            PromptContext::Plan(_) => Stage::Plan,
            PromptContext::Attend(_) => Stage::Attend,
            PromptContext::Execute(_) => Stage::Execute,
        }
    }

    pub fn agent(&self) -> &str {
        match self {
            PromptContext::Plan(p) => &p.agent,
            PromptContext::Attend(p) => &p.agent,
            PromptContext::Execute(p) => &p.agent,
        }
    }
}

/// Updated goal list from planning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanDecision {
    pub thought: Thought,
    pub goals: Vec<Goal>,
    #[serde(rename = "search-queries", alias = "search_queries")]
    pub search_queries: Vec<String>,
}

/// Context gathered for the top goal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendDecision {
    #[serde(rename = "relevant-information", alias = "relevant_information")]
    pub relevant_information: String,

    /// Episode to pull back into context; asks for another iteration
    #[serde(rename = "remember-episode", alias = "remember_episode")]
    pub remember_episode: Option<EpisodeId>,

    /// Memory search to run; asks for another iteration
    #[serde(rename = "search-query", alias = "search_query")]
    pub search_query: Option<String>,
}

impl AttendDecision {
    pub fn wants_more(&self) -> bool {
        self.remember_episode.is_some() || self.search_query.is_some()
    }
}

/// Arguments for the top goal's action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteDecision {
    pub thought: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// Structured decision, one variant per stage
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum Decision {
    Plan(PlanDecision),
    Attend(AttendDecision),
    Execute(ExecuteDecision),
}

impl Decision {
    pub fn stage(&self) -> Stage {
        match self {
            Decision::Plan(_) => Stage::Plan,
            Decision::Attend(_) => Stage::Attend,
            Decision::Execute(_) => Stage::Execute,
        }
    }

    pub fn into_plan(self) -> Result<PlanDecision, ReasoningError> {
        match self {
            Decision::Plan(d) => Ok(d),
            other => Err(wrong_kind(Stage::Plan, other.stage())),
        }
    }

    pub fn into_attend(self) -> Result<AttendDecision, ReasoningError> {
        match self {
            Decision::Attend(d) => Ok(d),
            other => Err(wrong_kind(Stage::Attend, other.stage())),
        }
    }

    pub fn into_execute(self) -> Result<ExecuteDecision, ReasoningError> {
        match self {
            Decision::Execute(d) => Ok(d),
            other => Err(wrong_kind(Stage::Execute, other.stage())),
        }
    }
}

fn wrong_kind(expected: Stage, got: Stage) -> ReasoningError {
    ReasoningError::Parse(format!("expected a {} decision, got {}", expected, got))
}

/// Ask the reasoner once, then up to `retries` more times on retryable failures.
///
/// Each attempt is bounded by `timeout` so a hung service cannot hold a
/// worker slot forever. A decision for the wrong stage counts as a parse failure.
pub async fn decide_with_retry(
    reasoner: &dyn Reasoner,
    context: &PromptContext,
    timeout: Duration,
    retries: u32,
) -> Result<Decision, ReasoningError> {
    let expected = context.stage();
    let mut attempt = 0;

    loop {
        let result = match tokio::time::timeout(timeout, reasoner.decide(context)).await {
            Ok(Ok(decision)) if decision.stage() == expected => Ok(decision),
            Ok(Ok(decision)) => Err(wrong_kind(expected, decision.stage())),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ReasoningError::Timeout(timeout)),
        };

        match result {
            Ok(decision) => return Ok(decision),
            Err(e) if e.is_retryable() && attempt < retries => {
                attempt += 1;
                tracing::warn!(
                    agent = %context.agent(),
                    stage = %expected,
                    attempt,
                    error = %e,
                    "Retrying decision"
                );
            }
            Err(e) => return Err(e),
        }
    }
}
