//! Error taxonomy for evaluator backends.
//!
//! Failing to score a screenshot is never an error: extraction degrades to
//! a low or zero score instead.

use std::time::Duration;

/// Acquiring a model or its resources failed. The evaluator is skipped for the run.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// API key environment variable is configured but not set.
    #[error("Environment variable {0} not found")]
    MissingApiKey(String),

    /// The backend does not serve the requested model.
    #[error("Model {model} is not available: {reason}")]
    ModelUnavailable { model: String, reason: String },

    /// The backend could not be reached.
    #[error("Backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Any other backend-reported failure.
    #[error("Load failed: {reason}")]
    Backend { reason: String },
}

/// Scoring a single screenshot failed. Recorded on that image only.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// Inference was requested before a successful load.
    #[error("Model not loaded")]
    NotLoaded,

    /// The screenshot could not be read.
    #[error("Failed to read image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The backend call exceeded the configured timeout.
    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),

    /// The backend request failed.
    #[error("Backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The chat completion request failed.
    #[error("Generation failed: {0}")]
    Generation(#[from] async_openai::error::OpenAIError),

    /// The backend answered with something unusable.
    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),
}
