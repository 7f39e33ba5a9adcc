//! Scripted provider mocks for tests and offline runs.
//!
//! Queue outcomes with `push_reply()` / `push_error()` before driving a
//! session. Each call consumes one queued outcome; an empty queue falls back
//! to a canned success so long scripted sessions don't need exhaustive
//! queues.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ProviderError, ProviderResult};

use super::types::{AudioHandle, ReasoningRequest};
use super::{ReasoningProvider, SynthesisProvider};

/// Scripted reasoning provider.
pub struct ScriptedReasoner {
    script: Mutex<VecDeque<ProviderResult<String>>>,
    fallback: String,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedReasoner {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: "That is interesting — tell me more about how you approached it."
                .to_string(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Set the reply used when the script queue is empty.
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = reply.into();
        self
    }

    /// Delay every call, to simulate a slow provider.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful reply.
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.script.lock().unwrap().push_back(Ok(reply.into()));
    }

    /// Queue a failure.
    pub fn push_error(&self, error: ProviderError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    /// Queue `n` transient failures.
    pub fn push_transient_errors(&self, n: usize) {
        for _ in 0..n {
            self.push_error(ProviderError::transient("scripted", "scripted outage"));
        }
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedReasoner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReasoningProvider for ScriptedReasoner {
    async fn generate(&self, _request: ReasoningRequest) -> ProviderResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(self.fallback.clone()),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Scripted synthesis provider.
pub struct ScriptedSynthesizer {
    script: Mutex<VecDeque<ProviderResult<()>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedSynthesizer {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a failure for the next call.
    pub fn push_error(&self, error: ProviderError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    /// Queue `n` transient failures.
    pub fn push_transient_errors(&self, n: usize) {
        for _ in 0..n {
            self.push_error(ProviderError::transient("scripted-tts", "scripted outage"));
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SynthesisProvider for ScriptedSynthesizer {
    async fn speak(&self, text: &str, voice: &str) -> ProviderResult<AudioHandle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.script.lock().unwrap().pop_front() {
            Some(Err(e)) => Err(e),
            _ => Ok(AudioHandle::new(voice, "audio/wav").with_byte_len(text.len() as u64 * 64)),
        }
    }

    fn name(&self) -> &str {
        "scripted-tts"
    }
}
