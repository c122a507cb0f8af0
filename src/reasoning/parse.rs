//! Mapping free-form model text onto a typed decision
//!
//! Models answer with a JSON object, either bare or inside a ```json fence,
//! usually wrapped in some prose. Anything that doesn't fit the stage's
//! schema is a `ReasoningError::Parse`, which the caller may retry.

use super::{AttendDecision, Decision, ExecuteDecision, PlanDecision, ReasoningError};
use crate::agent::Stage;

/// Pull the JSON object out of a model response
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let body = &text[start + "```json".len()..];
        let end = body.find("```")?;
        return Some(body[..end].trim());
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parse model text into the decision type for `stage`
pub fn parse_decision(stage: Stage, text: &str) -> Result<Decision, ReasoningError> {
    let json = extract_json(text).ok_or_else(|| ReasoningError::Parse("no JSON object in response".to_string()))?;

    let decision = match stage {
        Stage::Plan => Decision::Plan(from_json::<PlanDecision>(json)?),
        Stage::Attend => Decision::Attend(from_json::<AttendDecision>(json)?),
        Stage::Execute => Decision::Execute(from_json::<ExecuteDecision>(json)?),
    };
    Ok(decision)
}

fn from_json<T: serde::de::DeserializeOwned>(json: &str) -> Result<T, ReasoningError> {
    serde_json::from_str(json).map_err(|e| ReasoningError::Parse(e.to_string()))
}
