//! External collaborator ports: the planner (intent → operations), the
//! narrator (state → prose), the structured extractor (message span →
//! graph fragment), and image generation. These are genuinely external to
//! this spec (§1 Out of scope) — the core only defines the contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ExtractorError, ImageGenError, NarratorError, PlannerError};

/// One tool call the planner wants the orchestrator to dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedOperation {
    pub tool_name: String,
    pub arguments: Value,
}

/// `AnalysisPlan` (§4.4 step 2): intent classification plus the operations
/// to dispatch this turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPlan {
    pub intent: String,
    pub operations: Vec<PlannedOperation>,
    pub memory_seeds: Vec<String>,
}

#[async_trait]
pub trait PlannerPort: Send + Sync {
    async fn plan(&self, player_input: &str, context: &Value) -> Result<AnalysisPlan, PlannerError>;
}

#[async_trait]
pub trait NarratorPort: Send + Sync {
    async fn narrate(&self, state: &Value) -> Result<String, NarratorError>;
}

/// What `memory_graphizer` asks of the external structured extractor
/// (§4.2.5): given a message span, propose an event-group summary, its
/// sub-events, any new entities, and graph edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedSubEvent {
    pub summary: String,
    pub start_idx: usize,
    pub end_idx: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedNode {
    pub node_type: String,
    pub name: String,
    pub properties: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedEdge {
    pub source_name: String,
    pub target_name: String,
    pub relation: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub summary: String,
    pub emotion: Option<String>,
    pub location: Option<String>,
    pub participants: Vec<String>,
    pub sub_events: Vec<ExtractedSubEvent>,
    pub new_nodes: Vec<ExtractedNode>,
    pub edges: Vec<ExtractedEdge>,
}

#[async_trait]
pub trait ExtractorPort: Send + Sync {
    async fn extract(&self, transcript: &str) -> Result<ExtractionResult, ExtractorError>;
}

#[derive(Debug, Clone)]
pub struct ImageResult {
    pub image_base64: String,
}

#[async_trait]
pub trait ImageGenPort: Send + Sync {
    async fn generate(&self, scene_description: &str, style: &str) -> Result<ImageResult, ImageGenError>;
}
