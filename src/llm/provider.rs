use async_trait::async_trait;

use crate::error::PipelineError;
use crate::llm::media::PreparedImage;

/// Model choice plus sampling parameters for one kind of completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelProfile {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ModelProfile {
    pub fn new(model: &str, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model: model.to_string(),
            temperature,
            max_tokens,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Short label used in timing logs, e.g. `style_analysis`.
    pub operation: &'static str,
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub images: Vec<PreparedImage>,
    pub profile: ModelProfile,
}

impl CompletionRequest {
    pub fn new(operation: &'static str, prompt: String, profile: &ModelProfile) -> Self {
        Self {
            operation,
            system_prompt: None,
            prompt,
            images: Vec::new(),
            profile: profile.clone(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: String) -> Self {
        self.system_prompt = Some(system_prompt);
        self
    }

    pub fn with_image(mut self, image: PreparedImage) -> Self {
        self.images.push(image);
        self
    }
}

/// A text/vision completion service returning the top completion's text.
///
/// Implementations make a single logical call; any retry they do is limited
/// to transport failures. Every error is reported as `PipelineError::Provider`.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<String, PipelineError>;
}
