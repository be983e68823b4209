//! Admin Orchestrator (§2.13, §4.4, §5, §6.3): system-command parsing, the
//! scoped tool surface, per-tool-name call recording, and the per-turn
//! flow that ties the planner/narrator/image-gen ports to `SessionStore`.

pub mod commands;
pub mod orchestrator;
pub mod tool_call;
pub mod tools;

pub use commands::{parse, SystemCommand};
pub use orchestrator::{SessionWorld, TurnOrchestrator, TurnOutcome};
pub use tool_call::{EngineExecuted, ToolCallRecord, ToolRegistry};
pub use tools::{dispatch, TurnContext};
