//! Capability registry, built once at startup and shared read-only

use std::collections::BTreeMap;

use super::{Action, Capability};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Unknown action {action} for capability {capability}")]
    UnknownAction { capability: String, action: String },
}

#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Capability>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability, replacing any previous one with the same name
    pub fn register(&mut self, capability: Capability) {
        if self.capabilities.contains_key(&capability.name) {
            log::warn!("Replacing capability {}", capability.name);
        }
        self.capabilities.insert(capability.name.clone(), capability);
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.register(capability);
        self
    }

    pub fn resolve(&self, capability: &str, action: &str) -> Result<&Action, ResolveError> {
        let cap = self
            .capabilities
            .get(capability)
            .ok_or_else(|| ResolveError::UnknownCapability(capability.to_string()))?;
        cap.action(action).ok_or_else(|| ResolveError::UnknownAction {
            capability: capability.to_string(),
            action: action.to_string(),
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.capabilities.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Render every capability and action for inclusion in a prompt
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for cap in self.capabilities.values() {
            out.push_str(&format!("{}: {}\n", cap.name, cap.description));
            for action in cap.actions.values() {
                out.push_str(&format!("  - {}\n", action.signature()));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{ActionArgs, ArgKind, ArgSpec};

    fn registry() -> CapabilityRegistry {
        let weather = Capability::new("weather", "Forecasts").with_action(
            Action::new("forecast", "Tomorrow's weather", |_: ActionArgs| Ok("sunny".to_string()))
                .with_arg(ArgSpec::required("city", ArgKind::String, "City name")),
        );
        CapabilityRegistry::new().with(weather)
    }

    #[test]
    fn test_resolve_ok() {
        let registry = registry();
        let action = registry.resolve("weather", "forecast").unwrap();
        assert_eq!(action.name, "forecast");
    }

    #[test]
    fn test_resolve_unknown_capability() {
        let err = registry().resolve("stocks", "quote").unwrap_err();
        assert_eq!(err, ResolveError::UnknownCapability("stocks".into()));
    }

    #[test]
    fn test_resolve_unknown_action() {
        let err = registry().resolve("weather", "history").unwrap_err();
        assert_eq!(err.to_string(), "Unknown action history for capability weather");
    }

    #[test]
    fn test_describe() {
        let text = registry().describe();
        assert!(text.contains("weather: Forecasts"));
        assert!(text.contains("forecast(city: string) - Tomorrow's weather"));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = registry();
        registry.register(Capability::new("weather", "Empty"));
        assert_eq!(registry.len(), 1);
        assert!(registry.resolve("weather", "forecast").is_err());
    }
}
