use thiserror::Error;

/// Failures inside the recommendation pipeline.
///
/// Only `MissingInput` is ever shown to HTTP callers; the other variants are
/// absorbed by fallback values before a response is built.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("completion provider failed: {0}")]
    Provider(String),

    #[error("completion could not be parsed as JSON: {0}")]
    Parse(String),

    #[error("parsed completion failed validation: {0}")]
    Validation(String),

    #[error("missing required input: {0}")]
    MissingInput(String),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Provider(_) => "provider",
            PipelineError::Parse(_) => "parse",
            PipelineError::Validation(_) => "validation",
            PipelineError::MissingInput(_) => "missing_input",
        }
    }
}
