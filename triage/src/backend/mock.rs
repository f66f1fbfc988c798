//! Mock oracle backend for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::traits::*;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer with this text
    Respond(String),
    /// Fail with this error
    Fail(OracleError),
    /// Sleep before answering, to exercise the client timeout
    Delay(Duration, String),
}

/// Mock backend for testing.
///
/// Replies are consumed in order; once the script runs out every call gets
/// the default response.
pub struct MockBackend {
    model_id: String,
    available: AtomicBool,
    response_content: String,
    script: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
    call_count: AtomicU32,
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            available: AtomicBool::new(true),
            response_content: "Mock response".to_string(),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
        }
    }

    /// Set the default response content.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.response_content = content.into();
        self
    }

    /// Append scripted replies.
    pub fn with_script(self, replies: impl IntoIterator<Item = MockReply>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.extend(replies);
        }
        self
    }

    /// Set availability. An unavailable backend fails every call.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Get the number of times complete was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next_reply(&self) -> MockReply {
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| MockReply::Respond(self.response_content.clone()))
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

#[async_trait]
impl OracleBackend for MockBackend {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, OracleError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let prompt_tokens = request.user_prompt.len() as u32 / 4;
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        if !self.available.load(Ordering::SeqCst) {
            return Err(OracleError::Unavailable("Mock backend disabled".to_string()));
        }

        let content = match self.next_reply() {
            MockReply::Respond(content) => content,
            MockReply::Fail(err) => return Err(err),
            MockReply::Delay(delay, content) => {
                tokio::time::sleep(delay).await;
                content
            }
        };

        let completion_tokens = content.len() as u32 / 4;

        Ok(CompletionResponse {
            content,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
            },
        })
    }
}
