//! Dummy backend — echoes input back prefixed with `[echo]`.
//!
//! Used for offline runs and tests.  A scripted variant returns queued
//! replies in order (falling back to echo once drained), a failing variant
//! always errors, and every call is recorded so tests can inspect exactly
//! what would have been sent to a real model.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::llm::{Content, ProviderError, Role};

/// One recorded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyCall {
    pub system: Option<String>,
    pub contents: Vec<Content>,
}

#[derive(Debug)]
enum Mode {
    Echo,
    Scripted(Mutex<VecDeque<Option<String>>>),
    Fail(String),
}

#[derive(Debug, Clone)]
pub struct DummyProvider {
    mode: Arc<Mode>,
    calls: Arc<Mutex<Vec<DummyCall>>>,
}

impl Default for DummyProvider {
    fn default() -> Self {
        Self::echo()
    }
}

impl DummyProvider {
    pub fn echo() -> Self {
        Self::with_mode(Mode::Echo)
    }

    /// Reply with `replies` in order.
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_mode(Mode::Scripted(Mutex::new(
            replies.into_iter().map(|s| Some(s.into())).collect(),
        )))
    }

    /// First chat reply has no candidates; later calls echo.
    pub fn no_candidates() -> Self {
        Self::with_mode(Mode::Scripted(Mutex::new(VecDeque::from([None]))))
    }

    /// Every call fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_mode(Mode::Fail(message.into()))
    }

    fn with_mode(mode: Mode) -> Self {
        Self { mode: Arc::new(mode), calls: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Requests seen so far, oldest first.
    pub fn calls(&self) -> Vec<DummyCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, system: Option<&str>, contents: &[Content]) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(DummyCall { system: system.map(str::to_string), contents: contents.to_vec() });
        }
    }

    /// `Some(reply)` for a scripted answer, `Some(None)` for a scripted
    /// empty candidate list, `None` when the script is drained.
    fn next_scripted(&self) -> Option<Option<String>> {
        match self.mode.as_ref() {
            Mode::Scripted(queue) => queue.lock().ok().and_then(|mut q| q.pop_front()),
            _ => None,
        }
    }

    pub fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        self.record(None, &[Content::user(prompt)]);
        if let Mode::Fail(msg) = self.mode.as_ref() {
            return Err(ProviderError::Request(msg.clone()));
        }
        match self.next_scripted() {
            Some(Some(reply)) => Ok(reply),
            Some(None) => Err(ProviderError::EmptyResponse("model has no answer".into())),
            None => Ok(format!("[echo] {prompt}")),
        }
    }

    pub fn chat(&self, system: Option<&str>, contents: &[Content]) -> Result<Option<String>, ProviderError> {
        self.record(system, contents);
        if let Mode::Fail(msg) = self.mode.as_ref() {
            return Err(ProviderError::Request(msg.clone()));
        }
        if let Some(scripted) = self.next_scripted() {
            return Ok(scripted);
        }
        let last_user = contents
            .iter()
            .rev()
            .find(|c| c.role == Role::User)
            .map(|c| c.text.as_str())
            .unwrap_or("");
        Ok(Some(format!("[echo] {last_user}")))
    }
}
