//! Tool-call recording and per-tool-name serialization (§4.4 step 3, §5).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

/// One row of the per-turn tool-call log (§4.4 step 3, §6.3: "every tool
/// returns `{success, error?, ...payload}` and is recorded").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub name: String,
    pub args: Value,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
    pub result: Value,
}

/// What engine-side rules already executed this turn, keyed by the
/// `AnalysisPlan.intent` category, so the matching LLM tool call short
/// circuits instead of re-running it (§4.4 step 3, §5 engine-shadow
/// gating). The exclusion table mirrors the fixed intent→tool mapping of
/// the hand-authored agentic tool registry this was generalized from.
#[derive(Debug, Clone)]
pub struct EngineExecuted {
    pub intent_type: String,
}

impl EngineExecuted {
    pub fn excludes(&self, tool_name: &str) -> bool {
        let excluded: &[&str] = match self.intent_type.as_str() {
            "move_area" => &["navigate", "enter_sublocation", "leave_sublocation"],
            "move_sublocation" => &["enter_sublocation"],
            "leave" => &["leave_sublocation"],
            "rest" => &["update_time"],
            "talk" => &["npc_dialogue"],
            _ => &[],
        };
        excluded.contains(&tool_name)
    }
}

/// Per-tool-name locking (§5: "a mutex serializes any mutation") plus
/// timeout enforcement bounded at `admin_agentic_tool_timeout_seconds`.
#[derive(Default)]
pub struct ToolRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Run `dispatch` under the named tool's lock, bounded by `timeout`.
    /// When `engine_executed` names this tool as already run this turn,
    /// short-circuits to `{success:true, already_executed_by_engine:true}`
    /// without ever acquiring the lock or calling `dispatch`.
    ///
    /// `dispatch` is a future rather than a plain closure so the timeout
    /// actually has a yield point to race against: callers whose tool body
    /// does real `.await`-ing I/O (not just in-memory state mutation) get a
    /// deadline that can genuinely fire mid-call.
    pub async fn run<Fut>(
        &self,
        name: &str,
        args: Value,
        timeout: Duration,
        engine_executed: Option<&EngineExecuted>,
        dispatch: Fut,
    ) -> ToolCallRecord
    where
        Fut: Future<Output = Value>,
    {
        let started = Instant::now();

        if let Some(shadow) = engine_executed {
            if shadow.excludes(name) {
                return ToolCallRecord {
                    name: name.to_string(),
                    args,
                    duration_ms: started.elapsed().as_millis() as u64,
                    success: true,
                    error: Some("blocked_by_engine_filter".to_string()),
                    result: serde_json::json!({ "success": true, "already_executed_by_engine": true }),
                };
            }
        }

        let key_lock = self.lock_for(name).await;
        let _guard = key_lock.lock().await;

        match tokio::time::timeout(timeout, dispatch).await {
            Ok(result) => {
                let success = result.get("success").and_then(Value::as_bool).unwrap_or(true);
                let error = result.get("error").and_then(Value::as_str).map(str::to_string);
                ToolCallRecord {
                    name: name.to_string(),
                    args,
                    duration_ms: started.elapsed().as_millis() as u64,
                    success,
                    error,
                    result,
                }
            }
            Err(_) => {
                let message = format!("tool timeout: {name}");
                ToolCallRecord {
                    name: name.to_string(),
                    args,
                    duration_ms: started.elapsed().as_millis() as u64,
                    success: false,
                    error: Some(message.clone()),
                    result: serde_json::json!({ "success": false, "error": message }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn engine_shadow_short_circuits_excluded_tool() {
        let registry = ToolRegistry::new();
        let shadow = EngineExecuted {
            intent_type: "move_area".to_string(),
        };
        let record = registry
            .run(
                "navigate",
                serde_json::json!({}),
                Duration::from_secs(1),
                Some(&shadow),
                async { serde_json::json!({ "success": false, "error": "should not run" }) },
            )
            .await;
        assert_eq!(record.result["already_executed_by_engine"], true);
        assert!(record.success);
    }

    #[tokio::test]
    async fn timeout_is_recorded_as_failure() {
        let registry = ToolRegistry::new();
        let record = registry
            .run("slow_tool", serde_json::json!({}), Duration::from_millis(1), None, async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                serde_json::json!({ "success": true })
            })
            .await;
        assert!(!record.success);
        assert_eq!(record.error.as_deref(), Some("tool timeout: slow_tool"));
    }

    #[tokio::test]
    async fn successful_call_reports_its_own_payload() {
        let registry = ToolRegistry::new();
        let record = registry
            .run("ping", serde_json::json!({}), Duration::from_secs(1), None, async {
                serde_json::json!({ "success": true, "pong": true })
            })
            .await;
        assert!(record.success);
        assert_eq!(record.result["pong"], true);
    }
}
