//! Built-in capabilities: `echo`, `notes` and `coordination`

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::coordination::{Switchboard, coordination_capability};
use super::{Action, ActionArgs, ArgKind, ArgSpec, Capability, CapabilityRegistry, string_arg};

/// Shared key/value store behind the `notes` capability
pub type NoteStore = Arc<Mutex<BTreeMap<String, String>>>;

/// `echo.say(text)` returns its input
pub fn echo_capability() -> Capability {
    Capability::new("echo", "Repeat text back as an observation").with_action(
        Action::new("say", "Say something", |args: ActionArgs| {
            string_arg(&args, "text").map(str::to_string)
        })
        .with_arg(ArgSpec::required("text", ArgKind::String, "Text to say")),
    )
}

/// `notes.write(key, text)` and `notes.read(key)` over a shared store
pub fn notes_capability(store: NoteStore) -> Capability {
    let write_store = store.clone();
    let write = Action::new("write", "Store a note under a key", move |args: ActionArgs| {
        let key = string_arg(&args, "key")?;
        let text = string_arg(&args, "text")?;
        write_store.lock().insert(key.to_string(), text.to_string());
        Ok(format!("Saved note {}", key))
    })
    .with_arg(ArgSpec::required("key", ArgKind::String, "Note key"))
    .with_arg(ArgSpec::required("text", ArgKind::String, "Note body"));

    let read = Action::new("read", "Read the note stored under a key", move |args: ActionArgs| {
        let key = string_arg(&args, "key")?;
        store
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| format!("No note named {}", key))
    })
    .with_arg(ArgSpec::required("key", ArgKind::String, "Note key"));

    Capability::new("notes", "A shared scratchpad")
        .with_action(write)
        .with_action(read)
}

/// Registry with every built-in.
///
/// The note store is returned for inspection; agents must be connected to
/// the switchboard to receive `talk_to_agent` messages.
pub fn builtin_registry() -> (CapabilityRegistry, NoteStore, Switchboard) {
    let store = NoteStore::default();
    let switchboard = Switchboard::new();
    let registry = CapabilityRegistry::new()
        .with(echo_capability())
        .with(notes_capability(store.clone()))
        .with(coordination_capability(switchboard.clone()));
    (registry, store, switchboard)
}
