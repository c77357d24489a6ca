//! Language Model traits

use crate::{GenerateRequest, GenerateResponse, Result, ToolDefinition};
use async_trait::async_trait;

/// Language Model interface
///
/// Implementations:
/// - `OpenAIBackend` - OpenAI-compatible chat completions API
///
/// # Example
///
/// ```ignore
/// let llm: Arc<dyn LanguageModel> = Arc::new(OpenAIBackend::new(config)?);
/// let request = GenerateRequest::new("You are a scheduling assistant")
///     .with_user_message("Do you have anything on Friday?");
/// let response = llm.generate_with_tools(request, &tools).await?;
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Generate a plain completion (no tools offered)
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;

    /// Generate with tool/function calling
    ///
    /// # Returns
    /// Response which may include tool calls in addition to text
    async fn generate_with_tools(
        &self,
        request: GenerateRequest,
        tools: &[ToolDefinition],
    ) -> Result<GenerateResponse>;

    /// Check if the backend is reachable
    async fn is_available(&self) -> bool;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}
