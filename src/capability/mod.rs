//! Capabilities and actions
//!
//! A capability is a named bundle of actions. Each action carries a static
//! argument schema and a handler, and is registered once at startup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

mod builtin;
mod coordination;
mod registry;

pub use builtin::{NoteStore, builtin_registry, echo_capability, notes_capability};
pub use coordination::{Switchboard, coordination_capability};
pub use registry::{CapabilityRegistry, ResolveError};

/// Evaluated arguments passed to an action handler
pub type ActionArgs = serde_json::Map<String, Value>;

fn string_arg<'a>(args: &'a ActionArgs, name: &str) -> Result<&'a str, String> {
    args.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing string argument '{}'", name))
}

/// Something that can carry out an action
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Run the action. `Err` is a failure observation, not a crash.
    async fn invoke(&self, args: ActionArgs) -> Result<String, String>;
}

#[async_trait]
impl<F> ActionHandler for F
where
    F: Fn(ActionArgs) -> Result<String, String> + Send + Sync,
{
    async fn invoke(&self, args: ActionArgs) -> Result<String, String> {
        self(args)
    }
}

/// Declared type of an action argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    String,
    Integer,
    Number,
    Boolean,
    Json,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgKind::String => "string",
            ArgKind::Integer => "integer",
            ArgKind::Number => "number",
            ArgKind::Boolean => "boolean",
            ArgKind::Json => "json",
        };
        write!(f, "{}", name)
    }
}

impl ArgKind {
    /// Check `value` against this kind, coercing string literals where they parse.
    pub fn coerce(&self, value: &Value) -> Result<Value, String> {
        match (self, value) {
            (ArgKind::String, Value::String(_)) => Ok(value.clone()),
            (ArgKind::String, Value::Number(n)) => Ok(Value::String(n.to_string())),
            (ArgKind::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),

            (ArgKind::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            (ArgKind::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("'{}' is not an integer", s)),

            (ArgKind::Number, Value::Number(_)) => Ok(value.clone()),
            (ArgKind::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("'{}' is not a number", s)),

            (ArgKind::Boolean, Value::Bool(_)) => Ok(value.clone()),
            (ArgKind::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(format!("'{}' is not a boolean", s)),
            },

            (ArgKind::Json, Value::String(s)) => serde_json::from_str::<Value>(s).or_else(|_| Ok(value.clone())),
            (ArgKind::Json, _) => Ok(value.clone()),

            (kind, other) => Err(format!("expected {}, got {}", kind, other)),
        }
    }
}

/// Static schema for one argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    pub kind: ArgKind,
    pub required: bool,
    pub description: String,
}

impl ArgSpec {
    pub fn required(name: impl Into<String>, kind: ArgKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: description.into(),
        }
    }

    pub fn optional(name: impl Into<String>, kind: ArgKind, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// A named, typed, invokable operation
#[derive(Clone)]
pub struct Action {
    pub name: String,
    pub description: String,
    pub args: Vec<ArgSpec>,
    /// A successful call parks the calling agent until new input arrives
    suspends: bool,
    handler: Arc<dyn ActionHandler>,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("args", &self.args)
            .field("suspends", &self.suspends)
            .finish_non_exhaustive()
    }
}

impl Action {
    /// Action backed by a plain closure
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ActionArgs) -> Result<String, String> + Send + Sync + 'static,
    {
        Self::from_handler(name, description, Arc::new(handler))
    }

    /// Action backed by any handler, e.g. one that awaits I/O
    pub fn from_handler(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn ActionHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            args: Vec::new(),
            suspends: false,
            handler,
        }
    }

    pub fn with_arg(mut self, spec: ArgSpec) -> Self {
        self.args.push(spec);
        self
    }

    /// Mark the action as one that leaves the agent waiting for input
    pub fn suspending(mut self) -> Self {
        self.suspends = true;
        self
    }

    pub fn suspends(&self) -> bool {
        self.suspends
    }

    /// Validate raw arguments against the schema and coerce them to declared kinds.
    ///
    /// Unknown and missing required arguments are errors. Optional
    /// arguments that are absent or null are left out.
    pub fn evaluate(&self, raw: &ActionArgs) -> Result<ActionArgs, String> {
        if let Some(unknown) = raw.keys().find(|k| !self.args.iter().any(|a| &a.name == *k)) {
            return Err(format!("Unknown argument '{}' for action {}", unknown, self.name));
        }

        let mut evaluated = ActionArgs::new();
        for spec in &self.args {
            match raw.get(&spec.name) {
                Some(Value::Null) | None if spec.required => {
                    return Err(format!("Missing required argument '{}' for action {}", spec.name, self.name));
                }
                Some(Value::Null) | None => {}
                Some(value) => {
                    let coerced = spec
                        .kind
                        .coerce(value)
                        .map_err(|e| format!("Argument '{}': {}", spec.name, e))?;
                    evaluated.insert(spec.name.clone(), coerced);
                }
            }
        }
        Ok(evaluated)
    }

    pub async fn invoke(&self, args: ActionArgs) -> Result<String, String> {
        self.handler.invoke(args).await
    }

    /// `name(arg: kind, [opt: kind]) - description`
    pub fn signature(&self) -> String {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                if a.required {
                    format!("{}: {}", a.name, a.kind)
                } else {
                    format!("[{}: {}]", a.name, a.kind)
                }
            })
            .collect();
        format!("{}({}) - {}", self.name, args.join(", "), self.description)
    }
}

/// A named bundle of actions
#[derive(Debug, Clone)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub actions: BTreeMap<String, Action>,
}

impl Capability {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            actions: BTreeMap::new(),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.insert(action.name.clone(), action);
        self
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> ActionArgs {
        value.as_object().cloned().unwrap_or_default()
    }

    fn sample_action() -> Action {
        Action::new("schedule", "Book a slot", |a: ActionArgs| Ok(format!("{}", Value::Object(a))))
            .with_arg(ArgSpec::required("title", ArgKind::String, "What"))
            .with_arg(ArgSpec::required("hour", ArgKind::Integer, "When"))
            .with_arg(ArgSpec::optional("urgent", ArgKind::Boolean, "Flag"))
    }

    #[test]
    fn test_coerce_string_literals() {
        assert_eq!(ArgKind::Integer.coerce(&json!("42")).unwrap(), json!(42));
        assert_eq!(ArgKind::Number.coerce(&json!(" 2.5 ")).unwrap(), json!(2.5));
        assert_eq!(ArgKind::Boolean.coerce(&json!("TRUE")).unwrap(), json!(true));
        assert_eq!(ArgKind::Json.coerce(&json!("[1, 2]")).unwrap(), json!([1, 2]));
        assert_eq!(ArgKind::String.coerce(&json!(7)).unwrap(), json!("7"));
    }

    #[test]
    fn test_coerce_rejects_mismatch() {
        assert!(ArgKind::Integer.coerce(&json!("seven")).is_err());
        assert!(ArgKind::Integer.coerce(&json!(1.5)).is_err());
        assert!(ArgKind::Boolean.coerce(&json!(1)).is_err());
        assert!(ArgKind::String.coerce(&json!([1])).is_err());
    }

    #[test]
    fn test_evaluate_coerces_and_drops_absent_optionals() {
        let action = sample_action();
        let evaluated = action.evaluate(&args(json!({"title": "standup", "hour": "9"}))).unwrap();
        assert_eq!(evaluated.get("hour"), Some(&json!(9)));
        assert!(!evaluated.contains_key("urgent"));
    }

    #[test]
    fn test_evaluate_missing_required() {
        let err = sample_action().evaluate(&args(json!({"title": "standup"}))).unwrap_err();
        assert!(err.contains("Missing required argument 'hour'"));
    }

    #[test]
    fn test_evaluate_null_required_is_missing() {
        let err = sample_action()
            .evaluate(&args(json!({"title": "standup", "hour": null})))
            .unwrap_err();
        assert!(err.contains("hour"));
    }

    #[test]
    fn test_evaluate_unknown_argument() {
        let err = sample_action()
            .evaluate(&args(json!({"title": "a", "hour": 1, "room": "b"})))
            .unwrap_err();
        assert!(err.contains("Unknown argument 'room'"));
    }

    #[test]
    fn test_signature() {
        assert_eq!(
            sample_action().signature(),
            "schedule(title: string, hour: integer, [urgent: boolean]) - Book a slot"
        );
    }

    #[tokio::test]
    async fn test_closure_handler_invoke() {
        let action = Action::new("fail", "Always fails", |_: ActionArgs| Err("nope".to_string()));
        assert_eq!(action.invoke(ActionArgs::new()).await, Err("nope".to_string()));
    }

    #[test]
    fn test_capability_actions() {
        let capability = Capability::new("calendar", "Scheduling").with_action(sample_action());
        assert!(capability.action("schedule").is_some());
        assert!(capability.action("cancel").is_none());
    }
}
