pub mod media;
pub mod openai;
pub mod provider;

pub use openai::OpenAiProvider;
pub use provider::{CompletionProvider, CompletionRequest, ModelProfile};
