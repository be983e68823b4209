//! Per-turn orchestration (§2.13, §4.4): recognizes system commands,
//! consults the planner for everything else, dispatches the resulting
//! operations through the engine-shadow gate, ticks the behavior engine,
//! and hands the updated state to the narrator.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use runtime_domain::{AreaId, CharacterId, ChapterId, Disposition, SeededDiceRng, SessionId, WorldId};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::combat::CombatEngine;
use crate::memory::{GraphScope, PersistedGraphStore, ScopedGraphs};
use crate::ports::{AnalysisPlan, ClockPort, GraphKvPort, ImageGenPort, NarratorPort, PlannerPort};
use crate::session::{GameState, SessionStore};
use crate::world::{EventDef, WorldMap, WorldRuntimeState};

use super::commands::{self, SystemCommand};
use super::tool_call::{EngineExecuted, ToolCallRecord, ToolRegistry};
use super::tools::{self, TurnContext};

/// Per-session collaborators that sit outside `GameState`'s append-only
/// delta log (§3.8 keeps that log to player-facing state only): the
/// event-def registry and behavior-tick counter, the scoped memory
/// graphs, the combat engine, per-NPC disposition tracks, the visited-area
/// set, and the session's own seeded dice stream.
pub struct SessionWorld {
    pub world: WorldRuntimeState,
    pub graphs: ScopedGraphs,
    pub combat: CombatEngine,
    pub dispositions: HashMap<CharacterId, Disposition>,
    pub visited: HashSet<AreaId>,
    pub rng: SeededDiceRng,
}

impl SessionWorld {
    pub fn new(seed: u64) -> Self {
        Self {
            world: WorldRuntimeState::new(),
            graphs: ScopedGraphs::new(),
            combat: CombatEngine::new(),
            dispositions: HashMap::new(),
            visited: HashSet::new(),
            rng: SeededDiceRng::from_seed(seed),
        }
    }
}

/// What one `process_turn` call produces (§4.4 step 6): the narrated
/// response plus the full tool-call log for that turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub narration: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Ties `SessionStore`, the per-session [`SessionWorld`], the
/// [`ToolRegistry`], and the external ports together into the per-turn
/// flow described in §4.4.
pub struct TurnOrchestrator {
    pub sessions: SessionStore,
    worlds: DashMap<SessionId, Arc<Mutex<SessionWorld>>>,
    map: Arc<WorldMap>,
    known_characters: Arc<[CharacterId]>,
    player_id: CharacterId,
    registry: ToolRegistry,
    planner: Arc<dyn PlannerPort>,
    narrator: Arc<dyn NarratorPort>,
    image_gen: Arc<dyn ImageGenPort>,
    clock: Arc<dyn ClockPort>,
    graph_store: Arc<PersistedGraphStore>,
    tool_timeout: Duration,
    image_timeout: Duration,
}

impl TurnOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        map: Arc<WorldMap>,
        known_characters: Arc<[CharacterId]>,
        player_id: CharacterId,
        planner: Arc<dyn PlannerPort>,
        narrator: Arc<dyn NarratorPort>,
        image_gen: Arc<dyn ImageGenPort>,
        clock: Arc<dyn ClockPort>,
        graph_kv: Arc<dyn GraphKvPort>,
        tool_timeout: Duration,
        image_timeout: Duration,
    ) -> Self {
        Self {
            sessions: SessionStore::new(),
            worlds: DashMap::new(),
            map,
            known_characters,
            player_id,
            registry: ToolRegistry::new(),
            planner,
            narrator,
            image_gen,
            clock,
            graph_store: Arc::new(PersistedGraphStore::new(graph_kv)),
            tool_timeout,
            image_timeout,
        }
    }

    /// `start_session` (§4.4 step 0): places the player at the chapter's
    /// first safe area, seeds this session's world-runtime collaborators
    /// with any previously persisted world-scope graph, and registers any
    /// event-defs available from the start.
    pub async fn start_session(&self, world_id: WorldId, chapter_id: ChapterId, rng_seed: u64, starting_events: Vec<EventDef>) -> Option<SessionId> {
        let starting_area = self.map.first_safe_area(chapter_id)?;
        let area_name = self.map.area(starting_area).map(|a| a.name.clone()).unwrap_or_default();
        let session_id = SessionId::new();
        let state = GameState::start(world_id, session_id, chapter_id, starting_area, area_name, None);
        self.sessions.start_session(state);

        let mut world = SessionWorld::new(rng_seed);
        for event in starting_events {
            world.world.register(event);
        }
        if let Ok(world_graph) = self.graph_store.load_graph_v2(world_id, &GraphScope::World).await {
            if world_graph.node_count() > 0 || world_graph.edge_count() > 0 {
                *world.graphs.scope_mut(GraphScope::World) = world_graph;
            }
        }
        self.worlds.insert(session_id, Arc::new(Mutex::new(world)));
        Some(session_id)
    }

    /// Process one player turn end to end (§4.4 steps 1-6).
    pub async fn process_turn(&self, session_id: SessionId, player_input: &str) -> Option<TurnOutcome> {
        let now = self.clock.now();

        if let Some(command) = commands::parse(player_input) {
            return Some(self.run_system_command(session_id, command, now).await);
        }

        let snapshot = self.sessions.snapshot(session_id).await?;
        let context = serde_json::to_value(&snapshot).unwrap_or_else(|_| json!({}));
        let plan = match self.planner.plan(player_input, &context).await {
            Ok(plan) => plan,
            Err(e) => {
                return Some(TurnOutcome {
                    narration: format!("(planner unavailable: {e})"),
                    tool_calls: Vec::new(),
                })
            }
        };

        let tool_calls = self.run_plan(session_id, &plan, now).await;
        self.tick_world(session_id).await;
        self.persist_graphs(session_id).await;

        let narration = self.narrate(session_id).await;
        Some(TurnOutcome { narration, tool_calls })
    }

    /// Writes every scope this session's in-memory graphs touched back
    /// through the persisted Graph Store (§4.2.2's `save_graph_v2`) at the
    /// end of each turn.
    async fn persist_graphs(&self, session_id: SessionId) {
        let Some(world_arc) = self.worlds.get(&session_id).map(|entry| entry.clone()) else {
            return;
        };
        let Some(state) = self.sessions.snapshot(session_id).await else {
            return;
        };
        let world = world_arc.lock().await;
        for scope in world.graphs.scopes() {
            if let Some(graph) = world.graphs.scope(scope) {
                if let Err(e) = self.graph_store.save_graph_v2(state.world_id, scope, graph, true).await {
                    tracing::warn!(error = %e, "failed to persist memory graph scope");
                }
            }
        }
    }

    async fn narrate(&self, session_id: SessionId) -> String {
        let Some(snapshot) = self.sessions.snapshot(session_id).await else {
            return String::new();
        };
        let view = serde_json::to_value(&snapshot).unwrap_or_else(|_| json!({}));
        self.narrator.narrate(&view).await.unwrap_or_else(|e| format!("(narrator unavailable: {e})"))
    }

    /// §4.4 step 1: a small fixed set of slash commands bypass the planner
    /// and map directly onto a single tool call (or, for the read-only ones,
    /// straight onto a narration with no tool call at all).
    async fn run_system_command(&self, session_id: SessionId, command: SystemCommand, now: DateTime<Utc>) -> TurnOutcome {
        let operation = match &command {
            SystemCommand::Go(destination) => Some(("navigate", json!({ "destination": destination }))),
            SystemCommand::Talk(name) => Some(("npc_dialogue", json!({ "npc_id": name }))),
            SystemCommand::Wait(minutes) => Some(("update_time", json!({ "minutes": minutes }))),
            SystemCommand::Think | SystemCommand::Say(_) | SystemCommand::Time | SystemCommand::Where | SystemCommand::End => None,
        };

        let Some((tool_name, args)) = operation else {
            return TurnOutcome {
                narration: self.describe_system_command(session_id, &command).await,
                tool_calls: Vec::new(),
            };
        };

        let record = self.run_one_tool(session_id, tool_name, args, now, None).await;
        let narration = record
            .error
            .clone()
            .unwrap_or_else(|| self.narration_for_result(&record.result));
        TurnOutcome {
            narration,
            tool_calls: vec![record],
        }
    }

    fn narration_for_result(&self, result: &Value) -> String {
        result.as_object().and_then(|m| m.get("area_id")).map(|_| "you arrive.".to_string()).unwrap_or_else(|| "done.".to_string())
    }

    async fn describe_system_command(&self, session_id: SessionId, command: &SystemCommand) -> String {
        match command {
            SystemCommand::Time => self
                .sessions
                .snapshot(session_id)
                .await
                .map(|s| format!("day {}, {:02}:{:02}", s.game_time.day, s.game_time.hour, s.game_time.minute))
                .unwrap_or_default(),
            SystemCommand::Where => self.sessions.snapshot(session_id).await.map(|s| s.player_location).unwrap_or_default(),
            SystemCommand::Say(text) => text.clone(),
            SystemCommand::End => "the session has ended.".to_string(),
            SystemCommand::Think => "you take stock of your surroundings.".to_string(),
            _ => String::new(),
        }
    }

    /// §4.4 step 3: dispatch every planned operation, gating each tool name
    /// against what the engine already executed this turn under the
    /// planner's own intent classification.
    async fn run_plan(&self, session_id: SessionId, plan: &AnalysisPlan, now: DateTime<Utc>) -> Vec<ToolCallRecord> {
        let shadow = EngineExecuted {
            intent_type: plan.intent.clone(),
        };
        let mut records = Vec::with_capacity(plan.operations.len());
        for op in &plan.operations {
            let record = self.run_one_tool(session_id, &op.tool_name, op.arguments.clone(), now, Some(&shadow)).await;
            records.push(record);
        }
        records
    }

    /// Run a single tool call. `generate_scene_image` is handled as a
    /// special case ahead of [`ToolRegistry::run`] since [`ImageGenPort::generate`]
    /// needs its own `&self` borrow of the image-gen port rather than a
    /// [`TurnContext`]; every other tool goes through the shared dispatch
    /// table, wrapped in an `async move` block so its timeout has a real
    /// yield point if the tool body ever does awaited I/O.
    async fn run_one_tool(
        &self,
        session_id: SessionId,
        tool_name: &str,
        args: Value,
        now: DateTime<Utc>,
        shadow: Option<&EngineExecuted>,
    ) -> ToolCallRecord {
        if tool_name == "generate_scene_image" {
            return self.run_generate_scene_image(args).await;
        }

        let Some(world_arc) = self.worlds.get(&session_id).map(|entry| entry.clone()) else {
            return Self::session_not_found(tool_name, args);
        };
        let Some(mut state) = self.sessions.snapshot(session_id).await else {
            return Self::session_not_found(tool_name, args);
        };

        let mut world_guard = world_arc.lock().await;
        let map = Arc::clone(&self.map);
        let known = Arc::clone(&self.known_characters);

        let record = {
            let world = &mut *world_guard;
            let mut ctx = TurnContext {
                state: &mut state,
                map: map.as_ref(),
                world: &mut world.world,
                graphs: &mut world.graphs,
                combat: &mut world.combat,
                rng: &mut world.rng,
                visited: &mut world.visited,
                dispositions: &mut world.dispositions,
                player_id: self.player_id,
                known_characters: known.as_ref(),
                now,
            };
            let owned_name = tool_name.to_string();
            let owned_args = args.clone();
            self.registry
                .run(
                    tool_name,
                    args.clone(),
                    self.tool_timeout,
                    shadow,
                    async move { tools::dispatch(&mut ctx, &owned_name, &owned_args) },
                )
                .await
        };
        drop(world_guard);

        self.sessions
            .apply_delta(session_id, tool_name, record.result.clone(), now, move |slot, _changes| {
                *slot = state;
            })
            .await;

        record
    }

    fn session_not_found(tool_name: &str, args: Value) -> ToolCallRecord {
        ToolCallRecord {
            name: tool_name.to_string(),
            args,
            duration_ms: 0,
            success: false,
            error: Some("unknown session".to_string()),
            result: json!({ "success": false, "error": "unknown session" }),
        }
    }

    async fn run_generate_scene_image(&self, args: Value) -> ToolCallRecord {
        let started = Instant::now();
        let description = args.get("scene_description").and_then(Value::as_str).unwrap_or("").to_string();
        let style = args.get("style").and_then(Value::as_str).unwrap_or("dark_fantasy").to_string();

        let outcome = tokio::time::timeout(self.image_timeout, self.image_gen.generate(&description, &style)).await;
        let result = match outcome {
            Ok(Ok(image)) => json!({ "success": true, "image_base64": image.image_base64 }),
            Ok(Err(e)) => json!({ "success": false, "error": e.to_string() }),
            Err(_) => json!({ "success": false, "error": "tool timeout: generate_scene_image" }),
        };
        let success = result.get("success").and_then(Value::as_bool).unwrap_or(false);
        let error = result.get("error").and_then(Value::as_str).map(str::to_string);
        ToolCallRecord {
            name: "generate_scene_image".to_string(),
            args,
            duration_ms: started.elapsed().as_millis() as u64,
            success,
            error,
            result,
        }
    }

    /// §4.4 step 5: advance the round counter and every event-def's
    /// cooldown/tick transition once per turn, after all tool calls land.
    async fn tick_world(&self, session_id: SessionId) {
        if let Some(world_arc) = self.worlds.get(&session_id).map(|entry| entry.clone()) {
            world_arc.lock().await.world.tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{NarratorError, PlannerError};
    use crate::world::{Area, Chapter, DangerLevel};
    use async_trait::async_trait;

    struct FixedClock(DateTime<Utc>);
    impl ClockPort for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    struct StubPlanner {
        plan: AnalysisPlan,
    }
    #[async_trait]
    impl PlannerPort for StubPlanner {
        async fn plan(&self, _player_input: &str, _context: &Value) -> Result<AnalysisPlan, PlannerError> {
            Ok(self.plan.clone())
        }
    }

    struct EchoNarrator;
    #[async_trait]
    impl NarratorPort for EchoNarrator {
        async fn narrate(&self, _state: &Value) -> Result<String, NarratorError> {
            Ok("you stand in the camp.".to_string())
        }
    }

    struct NullImageGen;
    #[async_trait]
    impl ImageGenPort for NullImageGen {
        async fn generate(&self, _scene_description: &str, _style: &str) -> Result<crate::ports::ImageResult, crate::ports::ImageGenError> {
            Ok(crate::ports::ImageResult {
                image_base64: String::new(),
            })
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T08:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn camp_map() -> (Arc<WorldMap>, ChapterId, AreaId) {
        let chapter_id = ChapterId::new();
        let area_id = AreaId::new();
        let mut map = WorldMap::new();
        map.areas.insert(
            area_id,
            Area {
                id: area_id,
                name: "Camp".to_string(),
                danger: DangerLevel::Low,
                connections: vec![],
                sub_locations: vec![],
            },
        );
        map.chapters.insert(
            chapter_id,
            Chapter {
                id: chapter_id,
                available_maps: [area_id].into_iter().collect(),
            },
        );
        (Arc::new(map), chapter_id, area_id)
    }

    fn orchestrator_with_plan(plan: AnalysisPlan) -> (TurnOrchestrator, ChapterId) {
        let (map, chapter_id, _area_id) = camp_map();
        let player_id = CharacterId::new();
        let orchestrator = TurnOrchestrator::new(
            map,
            Arc::from(vec![player_id]),
            player_id,
            Arc::new(StubPlanner { plan }),
            Arc::new(EchoNarrator),
            Arc::new(NullImageGen),
            Arc::new(FixedClock(now())),
            Arc::new(crate::ports::InMemoryGraphKv::new()),
            Duration::from_secs(5),
            Duration::from_secs(5),
        );
        (orchestrator, chapter_id)
    }

    #[tokio::test]
    async fn system_command_short_circuits_the_planner() {
        let (orchestrator, chapter_id) = orchestrator_with_plan(AnalysisPlan {
            intent: "unused".to_string(),
            operations: vec![],
            memory_seeds: vec![],
        });
        let session_id = orchestrator.start_session(WorldId::new(), chapter_id, 1, vec![]).await.unwrap();

        let outcome = orchestrator.process_turn(session_id, "/time").await.unwrap();
        assert!(outcome.narration.contains("day 1"));
        assert!(outcome.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn planned_operation_runs_and_gets_narrated() {
        let plan = AnalysisPlan {
            intent: "misc".to_string(),
            operations: vec![crate::ports::PlannedOperation {
                tool_name: "add_xp".to_string(),
                arguments: json!({ "amount": 10 }),
            }],
            memory_seeds: vec![],
        };
        let (orchestrator, chapter_id) = orchestrator_with_plan(plan);
        let session_id = orchestrator.start_session(WorldId::new(), chapter_id, 1, vec![]).await.unwrap();

        let outcome = orchestrator.process_turn(session_id, "I press on").await.unwrap();
        assert_eq!(outcome.tool_calls.len(), 1);
        assert!(outcome.tool_calls[0].success);
        assert_eq!(outcome.narration, "you stand in the camp.");

        let snapshot = orchestrator.sessions.snapshot(session_id).await.unwrap();
        assert_eq!(snapshot.metadata["xp"], 10);
    }

    #[tokio::test]
    async fn engine_shadow_blocks_the_matching_tool_call() {
        let plan = AnalysisPlan {
            intent: "rest".to_string(),
            operations: vec![crate::ports::PlannedOperation {
                tool_name: "update_time".to_string(),
                arguments: json!({ "minutes": 30 }),
            }],
            memory_seeds: vec![],
        };
        let (orchestrator, chapter_id) = orchestrator_with_plan(plan);
        let session_id = orchestrator.start_session(WorldId::new(), chapter_id, 1, vec![]).await.unwrap();

        let outcome = orchestrator.process_turn(session_id, "I rest").await.unwrap();
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.tool_calls[0].result["already_executed_by_engine"], true);
    }

    #[tokio::test]
    async fn world_tick_advances_round_counter_after_a_turn() {
        let (orchestrator, chapter_id) = orchestrator_with_plan(AnalysisPlan {
            intent: "misc".to_string(),
            operations: vec![],
            memory_seeds: vec![],
        });
        let session_id = orchestrator.start_session(WorldId::new(), chapter_id, 1, vec![]).await.unwrap();

        orchestrator.process_turn(session_id, "I look around").await.unwrap();

        let world_arc = orchestrator.worlds.get(&session_id).unwrap().clone();
        let world = world_arc.lock().await;
        assert_eq!(world.world.round, 1);
    }
}
