//! Chat-completion client trait used by the LLM-backed oracle

use crate::error::Result;
use crate::openrouter::{CompletionRequest, CompletionResponse};
use async_trait::async_trait;

/// Unified trait for chat-completion backends
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a completion request
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the client type for debugging/logging
    fn client_type(&self) -> &str;

    /// Get the endpoint requests are sent to
    fn endpoint(&self) -> &str;
}
