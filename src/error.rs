//! Error handling for framepipe
//!
//! This module defines the crate-level error type and a Result alias.
//! Pipeline lifecycle errors live in [`crate::pipeline::PipelineError`] and
//! convert into [`FramePipeError`] with `?`.

use crate::pipeline::PipelineError;
use thiserror::Error;

/// Main error type for framepipe operations
#[derive(Error, Debug)]
pub enum FramePipeError {
    /// Errors raised by the pipeline engine
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<FramePipeError>,
    },
}

impl FramePipeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        FramePipeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for framepipe operations
pub type Result<T> = std::result::Result<T, FramePipeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<FramePipeError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
