//! Test doubles for the external collaborator ports — scripted stand-ins so
//! orchestrator/world-runtime tests don't depend on a real planner/narrator/
//! extractor being wired up.

use async_trait::async_trait;
use serde_json::Value;

use super::error::{ExtractorError, NarratorError, PlannerError};
use super::external::{AnalysisPlan, ExtractionResult, ExtractorPort, NarratorPort, PlannerPort};

/// Always returns the same plan, regardless of input.
pub struct FixedPlanner(pub AnalysisPlan);

#[async_trait]
impl PlannerPort for FixedPlanner {
    async fn plan(&self, _player_input: &str, _context: &Value) -> Result<AnalysisPlan, PlannerError> {
        Ok(self.0.clone())
    }
}

/// Echoes a fixed narration string.
pub struct FixedNarrator(pub String);

#[async_trait]
impl NarratorPort for FixedNarrator {
    async fn narrate(&self, _state: &Value) -> Result<String, NarratorError> {
        Ok(self.0.clone())
    }
}

/// Returns a fixed extraction result, for graphizer tests.
pub struct FixedExtractor(pub ExtractionResult);

#[async_trait]
impl ExtractorPort for FixedExtractor {
    async fn extract(&self, _transcript: &str) -> Result<ExtractionResult, ExtractorError> {
        Ok(self.0.clone())
    }
}

/// Always fails, for exercising fallback-on-extractor-failure paths.
pub struct FailingExtractor;

#[async_trait]
impl ExtractorPort for FailingExtractor {
    async fn extract(&self, _transcript: &str) -> Result<ExtractionResult, ExtractorError> {
        Err(ExtractorError::RequestFailed("forced failure".into()))
    }
}
