#![allow(dead_code)]

use async_trait::async_trait;
use codeflow::config::TimeoutConfig;
use codeflow::generation::{CompletionClient, CompletionError, GenerationAdapter, SamplingConfig};
use codeflow::quota::{InMemoryQuotaStore, QuotaGate};
use codeflow::rate_limit::{MockClock, RateLimitConfig, RateLimiter};
use codeflow::Orchestrator;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

type Hook = Box<dyn Fn() + Send + Sync>;

/// Completion client that replays queued replies, then a default
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String, CompletionError>>>,
    default_reply: String,
    prompts: Mutex<Vec<String>>,
    on_call: Mutex<Option<Hook>>,
}

impl ScriptedCompletion {
    pub fn always(reply: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            default_reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
            on_call: Mutex::new(None),
        }
    }

    /// Run `hook` inside every completion call, after the quota check has passed
    pub fn on_call(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_call.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn then_fail(self) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(CompletionError::Status {
                status: 500,
                body: "internal model error".to_string(),
            }));
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(
        &self,
        prompt: &str,
        _sampling: &SamplingConfig,
    ) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(hook) = self.on_call.lock().unwrap().as_ref() {
            hook();
        }
        match self.replies.lock().unwrap().pop_front() {
            Some(reply) => reply,
            None => Ok(self.default_reply.clone()),
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

pub const FENCED_DOCUMENT: &str =
    "```html\n<!DOCTYPE html>\n<html><body><pre class=\"mermaid\">flowchart TD\nA-->B</pre></body></html>\n```\n";

pub const DOCUMENT: &str =
    "<!DOCTYPE html>\n<html><body><pre class=\"mermaid\">flowchart TD\nA-->B</pre></body></html>";

pub struct Fixture {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<InMemoryQuotaStore>,
    pub completion: Arc<ScriptedCompletion>,
    pub clock: Arc<MockClock>,
}

pub fn fixture(store: InMemoryQuotaStore, completion: ScriptedCompletion) -> Fixture {
    fixture_with_timeouts(store, completion, TimeoutConfig::default())
}

pub fn fixture_with_timeouts(
    store: InMemoryQuotaStore,
    completion: ScriptedCompletion,
    timeouts: TimeoutConfig,
) -> Fixture {
    let store = Arc::new(store);
    let completion = Arc::new(completion);
    let clock = Arc::new(MockClock::default());

    let limiter = RateLimiter::with_clock(RateLimitConfig::default(), clock.clone());
    let orchestrator = Orchestrator::new(
        limiter,
        Arc::new(QuotaGate::new(store.clone())),
        Arc::new(GenerationAdapter::new(
            completion.clone(),
            SamplingConfig::default(),
        )),
        timeouts,
    );

    Fixture {
        orchestrator: Arc::new(orchestrator),
        store,
        completion,
        clock,
    }
}
