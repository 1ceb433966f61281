//! Generative text model abstraction.
//!
//! The pipeline only needs `generate(prompt) -> text`. There is no retry or
//! backoff at this layer and no structured-output guarantee: callers parse
//! leniently and fall back on failure.

mod gemini;
mod mock;

use async_trait::async_trait;

use crate::errors::GenerationError;

pub use gemini::GeminiClient;
pub use mock::{MockGenerativeClient, MockReply};

#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    fn name(&self) -> &str;
}
