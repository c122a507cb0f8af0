//! Reasoner backed by a text-completion model
//!
//! The prompt context is rendered as stage instructions followed by the
//! context itself in a ```json fence. The model's reply goes through
//! `parse_decision`, so prose around the JSON object is tolerated.

use async_trait::async_trait;
use std::sync::Arc;

use super::{Decision, PromptContext, Reasoner, ReasoningError, parse_decision};
use crate::agent::Stage;

/// A text-in, text-out model such as an LLM client
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ReasoningError>;
}

fn instructions(stage: Stage) -> &'static str {
    match stage {
        Stage::Plan => {
            "Update the ordered goal list for the task below. Each goal names a capability and an action \
             from the capability list. Return an empty goal list once the task is done. Respond with a JSON \
             object with keys \"thought\", \"goals\" and \"search-queries\"."
        }
        Stage::Attend => {
            "Collect the information needed for the top goal. Respond with a JSON object with key \
             \"relevant-information\", and optionally \"remember-episode\" or \"search-query\" to look further."
        }
        Stage::Execute => {
            "Choose arguments for the action below. Respond with a JSON object with keys \"thought\" and \
             \"arguments\"."
        }
    }
}

/// Render a context into the prompt text sent to the model
pub fn render_prompt(context: &PromptContext) -> Result<String, ReasoningError> {
    let body = serde_json::to_string_pretty(context).map_err(|e| ReasoningError::Parse(e.to_string()))?;
    Ok(format!("{}\n\n```json\n{}\n```\n", instructions(context.stage()), body))
}

pub struct ModelReasoner {
    model: Arc<dyn TextModel>,
}

impl ModelReasoner {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Reasoner for ModelReasoner {
    async fn decide(&self, context: &PromptContext) -> Result<Decision, ReasoningError> {
        let prompt = render_prompt(context)?;
        let reply = self.model.complete(&prompt).await?;
        tracing::trace!(agent = %context.agent(), stage = %context.stage(), reply = %reply, "Model replied");
        parse_decision(context.stage(), &reply)
    }
}
