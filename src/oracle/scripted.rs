//! ScriptedOracle — returns preconfigured completions

use super::{Oracle, OracleError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Script {
    Reply(String),
    Fail(String),
    Malformed(String),
}

/// In-process oracle with a fixed behaviour.
///
/// Records how often it was called and the last prompt it saw, so tests
/// can assert that the oracle was (or was not) consulted.
#[derive(Debug)]
pub struct ScriptedOracle {
    script: Script,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl ScriptedOracle {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            delay: None,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Always answer `reply`.
    pub fn replying(reply: impl Into<String>) -> Self {
        Self::with_script(Script::Reply(reply.into()))
    }

    /// Always fail with a transport error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_script(Script::Fail(message.into()))
    }

    /// Always fail with a malformed-response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::with_script(Script::Malformed(message.into()))
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.script {
            Script::Reply(text) => Ok(text.clone()),
            Script::Fail(msg) => Err(OracleError::Transport(msg.clone())),
            Script::Malformed(msg) => Err(OracleError::MalformedResponse(msg.clone())),
        }
    }
}
