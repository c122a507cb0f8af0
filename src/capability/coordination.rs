//! The `coordination` capability: waiting on replies and messaging other agents

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::{Action, ActionArgs, ArgKind, ArgSpec, Capability, string_arg};
use crate::memory::Event;

type Mailbox = Arc<dyn Fn(Event) + Send + Sync>;

/// Routes messages between agents by name.
///
/// Cloning shares the same routing table.
#[derive(Clone, Default)]
pub struct Switchboard {
    mailboxes: Arc<Mutex<HashMap<String, Mailbox>>>,
}

impl Switchboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route messages for `name` to `mailbox`, replacing any previous route
    pub fn connect(&self, name: impl Into<String>, mailbox: impl Fn(Event) + Send + Sync + 'static) {
        self.mailboxes.lock().insert(name.into(), Arc::new(mailbox));
    }

    pub fn disconnect(&self, name: &str) -> bool {
        self.mailboxes.lock().remove(name).is_some()
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.mailboxes.lock().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.mailboxes.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Hand `event` to the recipient's mailbox
    pub fn send(&self, recipient: &str, event: Event) -> Result<(), String> {
        let mailbox = self
            .mailboxes
            .lock()
            .get(recipient)
            .cloned()
            .ok_or_else(|| format!("No agent named {}", recipient))?;
        mailbox(event);
        Ok(())
    }
}

impl std::fmt::Debug for Switchboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switchboard").field("names", &self.names()).finish()
    }
}

/// `coordination.wait(reason)` parks the calling agent until an event
/// arrives; `coordination.talk_to_agent(recipient, message)` sends one.
pub fn coordination_capability(switchboard: Switchboard) -> Capability {
    let wait = Action::new("wait", "Stop working until a message or task arrives", |args: ActionArgs| {
        let reason = string_arg(&args, "reason")?;
        Ok(format!("Waiting: {}", reason))
    })
    .with_arg(ArgSpec::required("reason", ArgKind::String, "What the agent is waiting for"))
    .suspending();

    let talk = Action::new("talk_to_agent", "Send a message to another agent", move |args: ActionArgs| {
        let recipient = string_arg(&args, "recipient")?;
        let message = string_arg(&args, "message")?;
        switchboard.send(recipient, Event::new("message", message))?;
        Ok(format!("Message sent to {}", recipient))
    })
    .with_arg(ArgSpec::required("recipient", ArgKind::String, "Name of the receiving agent"))
    .with_arg(ArgSpec::required("message", ArgKind::String, "Message body"));

    Capability::new("coordination", "Wait for and exchange messages with other agents")
        .with_action(wait)
        .with_action(talk)
}
