//! Error types for port operations — the boundary between the core and its
//! external collaborators (persistence, planner, narrator, extractor, image
//! generation).

use thiserror::Error;

/// Errors from the graph key-value store port.
#[derive(Debug, Clone, Error)]
pub enum GraphKvError {
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },
    #[error("store error in {operation}: {message}")]
    Store {
        operation: &'static str,
        message: String,
    },
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl GraphKvError {
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    pub fn store(operation: &'static str, message: impl ToString) -> Self {
        Self::Store {
            operation,
            message: message.to_string(),
        }
    }
}

/// Errors from the external structured extractor used during graphization.
#[derive(Debug, Clone, Error)]
pub enum ExtractorError {
    #[error("extractor request failed: {0}")]
    RequestFailed(String),
    #[error("extractor returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// Errors from the external planner (intent → operations).
#[derive(Debug, Clone, Error)]
pub enum PlannerError {
    #[error("planner request failed: {0}")]
    RequestFailed(String),
}

/// Errors from the external narrator (state → prose).
#[derive(Debug, Clone, Error)]
pub enum NarratorError {
    #[error("narrator request failed: {0}")]
    RequestFailed(String),
}

/// Errors from the external image generation collaborator.
#[derive(Debug, Clone, Error)]
pub enum ImageGenError {
    #[error("image generation failed: {0}")]
    GenerationFailed(String),
    #[error("image service unavailable")]
    Unavailable,
}
