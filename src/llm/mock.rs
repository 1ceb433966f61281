use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::GenerativeClient;
use crate::errors::GenerationError;

/// One scripted reply of [`MockGenerativeClient`].
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Error(String),
}

impl MockReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }
}

/// Scripted client for tests and offline runs.
///
/// Replies are consumed in order. Once the script is exhausted every call
/// returns the default reply, which is an error unless set otherwise.
pub struct MockGenerativeClient {
    replies: Mutex<VecDeque<MockReply>>,
    default_reply: MockReply,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerativeClient {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            default_reply: MockReply::error("mock script exhausted"),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A client whose every call fails.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            default_reply: MockReply::error(message),
            ..Self::new()
        }
    }

    pub fn with_replies(replies: impl IntoIterator<Item = MockReply>) -> Self {
        let client = Self::new();
        client.add_replies(replies);
        client
    }

    pub fn add_replies(&self, replies: impl IntoIterator<Item = MockReply>) {
        let mut queue = self.replies.lock().unwrap_or_else(|e| e.into_inner());
        queue.extend(replies);
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for MockGenerativeClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerativeClient for MockGenerativeClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone());
        match reply {
            MockReply::Text(text) => Ok(text),
            MockReply::Error(message) => Err(GenerationError::Scripted(message)),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
