//! Scripted reasoner for tests and offline demos

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{Decision, PromptContext, Reasoner, ReasoningError};

type Fallback = Box<dyn Fn(&PromptContext) -> Result<Decision, ReasoningError> + Send + Sync>;

/// Replays queued results in order, then answers from a fallback closure.
pub struct ScriptedReasoner {
    script: Mutex<VecDeque<Result<Decision, ReasoningError>>>,
    fallback: Fallback,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedReasoner {
    pub fn new<F>(fallback: F) -> Self
    where
        F: Fn(&PromptContext) -> Result<Decision, ReasoningError> + Send + Sync + 'static,
    {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Box::new(fallback),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before every answer, to simulate a slow service
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a result to be returned before the fallback is consulted
    pub fn push(&self, result: Result<Decision, ReasoningError>) {
        self.script.lock().push_back(result);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn decide(&self, context: &PromptContext) -> Result<Decision, ReasoningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(result) => result,
            None => (self.fallback)(context),
        }
    }
}
