//! The scoped tool surface (§4.4 step 3, §6.3) the Admin Orchestrator
//! dispatches `AnalysisPlan.operations` against. Every tool takes a
//! [`TurnContext`] and a JSON argument bag, and returns a JSON payload
//! shaped `{success, error?, ...}` — the uniform contract `ToolRegistry`
//! records into a [`super::tool_call::ToolCallRecord`].

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use runtime_domain::{AreaId, CharacterId, DiceFormula, DiceRng, Disposition, DispositionDelta, DispositionDimension, EventId};
use serde_json::{json, Value};

use crate::combat::{CombatEngine, CombatantKind, CombatantSpec};
use crate::memory::{extract_subgraph, spread_activation, GraphScope, MemoryGraph, MemoryNode, ScopedGraphs, SpreadingActivationConfig};
use crate::session::GameState;
use crate::world::{self, WorldMap, WorldRuntimeState};

fn ok(payload: Value) -> Value {
    let mut map = match payload {
        Value::Object(m) => m,
        other => {
            let mut m = serde_json::Map::new();
            m.insert("value".to_string(), other);
            m
        }
    };
    map.insert("success".to_string(), json!(true));
    Value::Object(map)
}

fn err(message: impl Into<String>) -> Value {
    json!({ "success": false, "error": message.into() })
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// Everything one turn's tool calls need mutable or shared access to.
/// Built fresh per turn by the orchestrator from long-lived session state.
pub struct TurnContext<'a> {
    pub state: &'a mut GameState,
    pub map: &'a WorldMap,
    pub world: &'a mut WorldRuntimeState,
    pub graphs: &'a mut ScopedGraphs,
    pub combat: &'a mut CombatEngine,
    pub rng: &'a mut dyn DiceRng,
    pub visited: &'a mut HashSet<AreaId>,
    pub dispositions: &'a mut HashMap<CharacterId, Disposition>,
    pub player_id: CharacterId,
    pub known_characters: &'a [CharacterId],
    pub now: DateTime<Utc>,
}

impl TurnContext<'_> {
    /// The memory scope a `recall_memory`/`create_memory` call resolves to
    /// absent an explicit override: the current area under the current
    /// chapter, falling back to the player's own character scope so nothing
    /// leaks into a shared scope when area information is missing.
    fn default_scope(&self) -> GraphScope {
        GraphScope::Area(self.state.chapter_id, self.state.area_id)
    }

    fn resolve_scope(&self, name: Option<&str>) -> GraphScope {
        match name {
            Some("world") => GraphScope::World,
            Some("chapter") => GraphScope::Chapter(self.state.chapter_id),
            Some("camp") => GraphScope::Camp,
            Some("character") => GraphScope::Character(self.player_id),
            Some("area") | None => self.default_scope(),
            Some(_) => self.default_scope(),
        }
    }
}

/// `navigate(destination)` (§4.4, §6.3).
pub fn navigate(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(destination) = str_arg(args, "destination") else {
        return err("missing destination");
    };
    match world::navigate(ctx.map, ctx.state, ctx.visited, destination) {
        Ok(outcome) => ok(json!({
            "area_id": outcome.area_id.to_string(),
            "travel_minutes": outcome.travel_minutes,
        })),
        Err(e) => err(e.to_string()),
    }
}

/// `enter_sublocation(sub_location)` (§4.4, §6.3).
pub fn enter_sublocation(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(id_or_name) = str_arg(args, "sub_location") else {
        return err("missing sub_location");
    };
    match world::enter_sublocation(ctx.map, ctx.state, id_or_name) {
        Ok(()) => ok(json!({ "sub_location": ctx.state.sub_location })),
        Err(e) => err(e.to_string()),
    }
}

/// `leave_sublocation()` (§4.4, §6.3).
pub fn leave_sublocation(ctx: &mut TurnContext, _args: &Value) -> Value {
    ctx.state.sub_location = None;
    ok(json!({}))
}

/// `update_time(minutes)` (§4.4, §6.3).
pub fn update_time(ctx: &mut TurnContext, args: &Value) -> Value {
    let minutes = args.get("minutes").and_then(Value::as_u64).unwrap_or(0) as u32;
    match world::update_time(ctx.state, minutes) {
        Ok(snapped) => ok(json!({ "minutes_advanced": snapped })),
        Err(e) => err(e.to_string()),
    }
}

fn parse_event_id(args: &Value) -> Option<EventId> {
    let raw = str_arg(args, "event_id")?;
    uuid::Uuid::parse_str(raw).ok().map(EventId::from_uuid)
}

/// `activate_event(event_id)` (§4.4, §6.3). The orchestrator is expected to
/// have already re-evaluated `trigger_satisfied` against this turn's
/// already-applied tool effects before calling this (§4.4 step 3
/// "Activation gating": an opportunistic tick runs before rejecting as
/// locked).
pub fn activate_event(ctx: &mut TurnContext, args: &Value, trigger_satisfied: bool) -> Value {
    let Some(event_id) = parse_event_id(args) else {
        return err("missing or invalid event_id");
    };
    match ctx.world.activate_event(event_id, trigger_satisfied) {
        Ok(()) => ok(json!({ "event_id": event_id.to_string(), "status": "active" })),
        Err(e) => err(e.to_string()),
    }
}

/// `complete_event(event_id, outcome_key)` (§4.4, §6.3). Outcome/completion
/// conditions are treated as always satisfied once named — this codebase
/// carries no condition-language interpreter, and the caller is expected to
/// have already verified them via its own state inspection.
pub fn complete_event(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(event_id) = parse_event_id(args) else {
        return err("missing or invalid event_id");
    };
    let outcome_key = str_arg(args, "outcome_key");
    match ctx.world.complete_event(event_id, outcome_key, |_| true) {
        Ok(effects) => ok(json!({
            "event_id": event_id.to_string(),
            "rewards": effects.rewards,
            "reputation_changes": effects.reputation_changes,
            "world_flags": effects.world_flags,
            "unlock_events": effects.unlock_events.iter().map(ToString::to_string).collect::<Vec<_>>(),
        })),
        Err(e) => err(e.to_string()),
    }
}

/// `fail_event(event_id, reason)` (§4.4, §6.3).
pub fn fail_event(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(event_id) = parse_event_id(args) else {
        return err("missing or invalid event_id");
    };
    let reason = str_arg(args, "reason").map(str::to_string);
    match ctx.world.fail_event(event_id, reason) {
        Ok(()) => ok(json!({ "event_id": event_id.to_string(), "status": "failed" })),
        Err(e) => err(e.to_string()),
    }
}

/// `update_disposition(npc_id, deltas, reason)` (§4.4, §6.3). `deltas` is a
/// JSON object keyed by dimension name (`approval`/`trust`/`fear`/`romance`)
/// with integer values; unknown keys are ignored rather than rejected, so a
/// planner that over-specifies a payload doesn't fail the whole call.
pub fn update_disposition(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(npc_id_raw) = str_arg(args, "npc_id") else {
        return err("missing npc_id");
    };
    let Ok(uuid) = uuid::Uuid::parse_str(npc_id_raw) else {
        return err("invalid npc_id");
    };
    let npc_id = CharacterId::from_uuid(uuid);

    let Some(deltas_obj) = args.get("deltas").and_then(Value::as_object) else {
        return err("missing deltas");
    };
    let deltas: Vec<DispositionDelta> = deltas_obj
        .iter()
        .filter_map(|(key, value)| {
            let dimension = DispositionDimension::parse(key)?;
            let delta = value.as_i64()? as i32;
            Some(DispositionDelta { dimension, delta })
        })
        .collect();
    if deltas.is_empty() {
        return err("no recognized disposition dimensions in deltas");
    }

    let reason = str_arg(args, "reason").unwrap_or("").to_string();
    let day = ctx.state.game_time.day;
    let disposition = ctx.dispositions.entry(npc_id).or_default();
    disposition.apply(reason, day, &deltas);

    ok(json!({
        "npc_id": npc_id.to_string(),
        "approval": disposition.value(DispositionDimension::Approval),
        "trust": disposition.value(DispositionDimension::Trust),
        "fear": disposition.value(DispositionDimension::Fear),
        "romance": disposition.value(DispositionDimension::Romance),
    }))
}

/// `recall_memory(seeds[], character_id)` (§4.4, §6.3). Resolves seed names
/// to node ids within the default scope, runs spreading activation with the
/// recall preset, and returns the extracted subgraph's nodes.
pub fn recall_memory(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(seed_names) = args.get("seeds").and_then(Value::as_array) else {
        return err("missing seeds");
    };
    if seed_names.is_empty() {
        return err("seeds must be non-empty");
    }

    let scope = ctx.default_scope();
    let graph: &MemoryGraph = ctx.graphs.scope_mut(scope);

    let seeds: Vec<_> = seed_names
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|name| {
            graph
                .nodes()
                .find(|n| n.name.eq_ignore_ascii_case(name))
                .map(|n| n.id)
        })
        .collect();
    if seeds.is_empty() {
        return ok(json!({ "nodes": [] }));
    }

    let config = SpreadingActivationConfig::recall_memory_preset();
    let activated = spread_activation(graph, &seeds, &config);
    let subgraph = extract_subgraph(graph, &activated);

    let nodes: Vec<Value> = subgraph
        .nodes()
        .map(|n| {
            json!({
                "id": n.id.to_string(),
                "node_type": n.node_type,
                "name": n.name,
                "importance": n.importance,
                "activation": n.properties.get("activation").cloned().unwrap_or(json!(0.0)),
            })
        })
        .collect();
    ok(json!({ "nodes": nodes }))
}

/// `create_memory(content, importance, scope, related_entities[])` (§4.4,
/// §6.3). The node's display name truncates `content` to its first 80
/// characters, matching how this was generalized from the hand-authored
/// tool's naming convention.
pub fn create_memory(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(content) = str_arg(args, "content") else {
        return err("missing content");
    };
    let importance = args.get("importance").and_then(Value::as_f64).unwrap_or(0.5);
    let scope_name = str_arg(args, "scope");
    let scope = ctx.resolve_scope(scope_name);

    let name: String = content.chars().take(80).collect();
    let node = MemoryNode::new("recollection", name, ctx.now)
        .with_importance(importance);
    let node_id = node.id;

    let graph = ctx.graphs.scope_mut(scope.clone());
    graph.upsert_node(node);

    ok(json!({
        "node_id": node_id.to_string(),
        "scope": scope.path_segment(),
    }))
}

/// `ability_check(ability, skill, dc)` (§4.4, §6.3). Rolls `1d20` plus the
/// named ability's modifier (`floor((score - 10) / 2)`, the standard
/// ability-modifier formula) against `dc`.
pub fn ability_check(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(dc) = args.get("dc").and_then(Value::as_i64) else {
        return err("missing dc");
    };
    let ability_score = args.get("ability_score").and_then(Value::as_i64).unwrap_or(10);
    let modifier = ((ability_score - 10) as f64 / 2.0).floor() as i32;
    let formula = DiceFormula::new(1, 20, modifier).unwrap();
    let roll = formula.roll(ctx.rng);
    ok(json!({
        "roll": roll.breakdown(),
        "total": roll.total,
        "dc": dc,
        "succeeded": roll.total as i64 >= dc,
        "critical": roll.is_natural_20(),
        "fumble": roll.is_natural_1(),
    }))
}

fn combatant_spec_from(value: &Value) -> Option<CombatantSpec> {
    let display_name = value.get("name").and_then(Value::as_str)?.to_string();
    let max_hp = value.get("max_hp").and_then(Value::as_i64)? as i32;
    let armor_class = value.get("armor_class").and_then(Value::as_i64).unwrap_or(10) as i32;
    let attack_bonus = value.get("attack_bonus").and_then(Value::as_i64).unwrap_or(0) as i32;
    let damage_dice = value
        .get("damage_dice")
        .and_then(Value::as_str)
        .and_then(|s| DiceFormula::parse(s).ok())
        .unwrap_or(DiceFormula::new(1, 4, 0).ok()?);
    Some(CombatantSpec {
        display_name,
        kind: CombatantKind::Enemy,
        max_hp,
        armor_class,
        attack_bonus,
        damage_dice,
        damage_bonus: value.get("damage_bonus").and_then(Value::as_i64).unwrap_or(0) as i32,
        damage_type: value.get("damage_type").and_then(Value::as_str).unwrap_or("bludgeoning").to_string(),
        initiative_bonus: value.get("initiative_bonus").and_then(Value::as_i64).unwrap_or(0) as i32,
        movement_speed: value.get("movement_speed").and_then(Value::as_u64).unwrap_or(6) as u32,
        ability_scores: Default::default(),
        weapon_id: None,
        damage_modifiers: Default::default(),
        spell_book: Default::default(),
        ai_personality: value.get("ai_personality").and_then(Value::as_str).map(str::to_string),
        xp_reward: value.get("xp_reward").and_then(Value::as_i64).unwrap_or(0) as i32,
        gold_reward: value.get("gold_reward").and_then(Value::as_i64).unwrap_or(0) as i32,
    })
}

/// `start_combat(enemies[])` (§4.4, §6.3). The player's own combatant spec
/// is read out of session metadata (§3.8's opaque bag), since this
/// narrative runtime has no separate player-sheet module of its own.
pub fn start_combat(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(enemies_arg) = args.get("enemies").and_then(Value::as_array) else {
        return err("missing enemies");
    };
    let enemies: Vec<CombatantSpec> = enemies_arg.iter().filter_map(combatant_spec_from).collect();
    if enemies.is_empty() {
        return err("no valid enemy specs");
    }

    let player_value = ctx
        .state
        .metadata
        .get("player_combatant")
        .cloned()
        .unwrap_or(json!({ "name": "Player", "max_hp": 20, "armor_class": 12 }));
    let Some(mut player_spec) = combatant_spec_from(&player_value) else {
        return err("player combatant spec missing or invalid");
    };
    player_spec.kind = CombatantKind::Player;

    let combat_id = ctx.combat.start_combat(player_spec, enemies, Vec::new(), ctx.rng);
    ctx.state.combat_id = Some(combat_id);
    ok(json!({ "combat_id": combat_id.to_string() }))
}

/// `get_combat_options(actor_id)` (§4.4, §6.3).
pub fn get_combat_options(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(combat_id) = ctx.state.combat_id else {
        return err("no combat in progress");
    };
    let Some(actor_id_raw) = str_arg(args, "actor_id") else {
        return err("missing actor_id");
    };
    let Ok(actor_uuid) = uuid::Uuid::parse_str(actor_id_raw) else {
        return err("invalid actor_id");
    };
    let actor_id = runtime_domain::CombatantId::from_uuid(actor_uuid);
    match ctx.combat.available_actions(combat_id, actor_id) {
        Ok(options) => ok(json!({ "options": options })),
        Err(e) => err(e.to_string()),
    }
}

/// `choose_combat_action(action_id, actor_id)` (§4.4, §6.3). `actor_id` is
/// accepted for parity with the tool signature but the engine always
/// resolves the current turn's actor itself (§4.1).
pub fn choose_combat_action(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(combat_id) = ctx.state.combat_id else {
        return err("no combat in progress");
    };
    let Some(action_id) = str_arg(args, "action_id") else {
        return err("missing action_id");
    };
    match ctx.combat.execute_action(combat_id, action_id, ctx.rng) {
        Ok(result) => {
            if result.combat_ended {
                ctx.state.combat_id = None;
            }
            ok(serde_json::to_value(result).unwrap_or(json!({})))
        }
        Err(e) => err(e.to_string()),
    }
}

fn metadata_object<'a>(state: &'a mut GameState) -> &'a mut serde_json::Map<String, Value> {
    if !state.metadata.is_object() {
        state.metadata = Value::Object(Default::default());
    }
    state.metadata.as_object_mut().unwrap()
}

/// `heal_player(amount)` (§4.4, §6.3). Player HP lives in session metadata
/// (§3.8) since no dedicated player-sheet module exists here; clamped to
/// `[0, max_hp]` the same way combat HP is.
pub fn heal_player(ctx: &mut TurnContext, args: &Value) -> Value {
    adjust_player_hp(ctx, args, 1)
}

/// `damage_player(amount)` (§4.4, §6.3).
pub fn damage_player(ctx: &mut TurnContext, args: &Value) -> Value {
    adjust_player_hp(ctx, args, -1)
}

fn adjust_player_hp(ctx: &mut TurnContext, args: &Value, sign: i64) -> Value {
    let Some(amount) = args.get("amount").and_then(Value::as_i64) else {
        return err("missing amount");
    };
    let meta = metadata_object(ctx.state);
    let max_hp = meta.get("max_hp").and_then(Value::as_i64).unwrap_or(20);
    let current = meta.get("hp").and_then(Value::as_i64).unwrap_or(max_hp);
    let updated = (current + sign * amount).clamp(0, max_hp);
    meta.insert("hp".to_string(), json!(updated));
    ok(json!({ "hp": updated, "max_hp": max_hp }))
}

/// `add_xp(amount)` (§4.4, §6.3).
pub fn add_xp(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(amount) = args.get("amount").and_then(Value::as_i64) else {
        return err("missing amount");
    };
    let meta = metadata_object(ctx.state);
    let xp = meta.get("xp").and_then(Value::as_i64).unwrap_or(0) + amount;
    meta.insert("xp".to_string(), json!(xp));
    ok(json!({ "xp": xp }))
}

fn inventory(meta: &mut serde_json::Map<String, Value>) -> &mut Vec<Value> {
    meta.entry("inventory")
        .or_insert_with(|| json!([]));
    meta.get_mut("inventory").unwrap().as_array_mut().unwrap()
}

/// `add_item(item_id, item_name, quantity)` (§4.4, §6.3).
pub fn add_item(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(item_id) = str_arg(args, "item_id") else {
        return err("missing item_id");
    };
    let item_name = str_arg(args, "item_name").unwrap_or(item_id);
    let quantity = args.get("quantity").and_then(Value::as_i64).unwrap_or(1);

    let meta = metadata_object(ctx.state);
    let items = inventory(meta);
    if let Some(existing) = items.iter_mut().find(|i| i.get("item_id").and_then(Value::as_str) == Some(item_id)) {
        let current = existing.get("quantity").and_then(Value::as_i64).unwrap_or(0);
        existing["quantity"] = json!(current + quantity);
    } else {
        items.push(json!({ "item_id": item_id, "item_name": item_name, "quantity": quantity }));
    }
    ok(json!({ "item_id": item_id }))
}

/// `remove_item(item_id, quantity)` (§4.4, §6.3). Removing more than is
/// held clamps to zero and drops the stack entirely rather than erroring.
pub fn remove_item(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(item_id) = str_arg(args, "item_id") else {
        return err("missing item_id");
    };
    let quantity = args.get("quantity").and_then(Value::as_i64).unwrap_or(1);

    let meta = metadata_object(ctx.state);
    let items = inventory(meta);
    let mut removed = false;
    items.retain_mut(|item| {
        if item.get("item_id").and_then(Value::as_str) != Some(item_id) {
            return true;
        }
        removed = true;
        let current = item.get("quantity").and_then(Value::as_i64).unwrap_or(0);
        let remaining = (current - quantity).max(0);
        item["quantity"] = json!(remaining);
        remaining > 0
    });
    if !removed {
        return err("item not held");
    }
    ok(json!({ "item_id": item_id }))
}

fn party_members(meta: &mut serde_json::Map<String, Value>) -> &mut Vec<Value> {
    meta.entry("party").or_insert_with(|| json!([]));
    meta.get_mut("party").unwrap().as_array_mut().unwrap()
}

/// `add_teammate(character_id)` (§4.4, §6.3).
pub fn add_teammate(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(character_id) = str_arg(args, "character_id") else {
        return err("missing character_id");
    };
    let meta = metadata_object(ctx.state);
    let party = party_members(meta);
    if !party.iter().any(|m| m.as_str() == Some(character_id)) {
        party.push(json!(character_id));
    }
    ok(json!({ "character_id": character_id }))
}

/// `remove_teammate(character_id)` (§4.4, §6.3).
pub fn remove_teammate(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(character_id) = str_arg(args, "character_id") else {
        return err("missing character_id");
    };
    let meta = metadata_object(ctx.state);
    party_members(meta).retain(|m| m.as_str() != Some(character_id));
    ok(json!({ "character_id": character_id }))
}

/// `disband_party()` (§4.4, §6.3).
pub fn disband_party(ctx: &mut TurnContext, _args: &Value) -> Value {
    let meta = metadata_object(ctx.state);
    meta.insert("party".to_string(), json!([]));
    ok(json!({}))
}

/// `advance_chapter(target_id, transition_type)` (§4.4, §6.3).
pub fn advance_chapter(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(target_id) = str_arg(args, "target_id") else {
        return err("missing target_id");
    };
    let Ok(uuid) = uuid::Uuid::parse_str(target_id) else {
        return err("invalid target_id");
    };
    let chapter_id = runtime_domain::ChapterId::from_uuid(uuid);
    if ctx.map.chapter(chapter_id).is_none() {
        return err("unknown chapter");
    }
    ctx.state.chapter_id = chapter_id;
    let transition_type = str_arg(args, "transition_type").unwrap_or("advance").to_string();
    ok(json!({ "chapter_id": chapter_id.to_string(), "transition_type": transition_type }))
}

/// `complete_objective(objective_id)` (§4.4, §6.3). Objective completion is
/// tracked per-event via `objective_progress`; this tool marks one complete
/// against every active event that names it.
pub fn complete_objective(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(objective_id) = str_arg(args, "objective_id") else {
        return err("missing objective_id");
    };
    let mut touched = 0;
    for event in ctx.world.events.values_mut() {
        if event.objective_progress.contains_key(objective_id) {
            event.objective_progress.insert(objective_id.to_string(), true);
            touched += 1;
        }
    }
    ok(json!({ "objective_id": objective_id, "events_updated": touched }))
}

/// `advance_stage(event_id, stage_id)` (§4.4, §6.3).
pub fn advance_stage(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(event_id) = parse_event_id(args) else {
        return err("missing or invalid event_id");
    };
    let Some(stage_id) = str_arg(args, "stage_id") else {
        return err("missing stage_id");
    };
    let Some(event) = ctx.world.events.get_mut(&event_id) else {
        return err("unknown event_id");
    };
    if !event.stages.iter().any(|s| s == stage_id) {
        return err("unknown stage_id for this event");
    }
    event.current_stage = Some(stage_id.to_string());
    event.stage_progress.insert(stage_id.to_string(), true);
    ok(json!({ "event_id": event_id.to_string(), "stage_id": stage_id }))
}

/// `complete_event_objective(event_id, objective_id)` (§4.4, §6.3).
pub fn complete_event_objective(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(event_id) = parse_event_id(args) else {
        return err("missing or invalid event_id");
    };
    let Some(objective_id) = str_arg(args, "objective_id") else {
        return err("missing objective_id");
    };
    let Some(event) = ctx.world.events.get_mut(&event_id) else {
        return err("unknown event_id");
    };
    event.objective_progress.insert(objective_id.to_string(), true);
    ok(json!({ "event_id": event_id.to_string(), "objective_id": objective_id }))
}

/// `report_flash_evaluation(prompt, result, reason)` (§4.4, §6.3): a
/// narration-quality self-report from the planner/narrator pair, logged
/// into session metadata rather than acted on mechanically.
pub fn report_flash_evaluation(ctx: &mut TurnContext, args: &Value) -> Value {
    let prompt = str_arg(args, "prompt").unwrap_or("");
    let result = str_arg(args, "result").unwrap_or("");
    let reason = str_arg(args, "reason").unwrap_or("");
    let meta = metadata_object(ctx.state);
    let log = meta.entry("flash_evaluations").or_insert_with(|| json!([]));
    if let Some(arr) = log.as_array_mut() {
        arr.push(json!({ "prompt": prompt, "result": result, "reason": reason }));
    }
    ok(json!({}))
}

/// `npc_dialogue(npc_id, message)` (§4.4, §6.3): marks the target NPC as
/// the active dialogue partner and switches `chat_mode` to `dialogue`
/// (§3.8); narration of the reply itself is the narrator port's job, not
/// this tool's.
pub fn npc_dialogue(ctx: &mut TurnContext, args: &Value) -> Value {
    let Some(npc_id_raw) = str_arg(args, "npc_id") else {
        return err("missing npc_id");
    };
    let Ok(uuid) = uuid::Uuid::parse_str(npc_id_raw) else {
        return err("invalid npc_id");
    };
    let npc_id = CharacterId::from_uuid(uuid);
    if !ctx.known_characters.contains(&npc_id) {
        return err("unknown npc_id");
    }
    ctx.state.active_dialogue_npc = Some(npc_id);
    ctx.state.chat_mode = crate::session::ChatMode::Dialogue;
    ok(json!({ "npc_id": npc_id.to_string() }))
}

/// Typed dispatch table keyed by tool name (§6.3, §4.4 step 3): the only
/// place a tool name's JSON arguments turn into a call against one of the
/// functions above. Unknown names are rejected rather than silently
/// ignored. `activate_event`'s `trigger_satisfied` is read out of the
/// arguments bag itself, defaulting to `true` when the caller omits it.
pub fn dispatch(ctx: &mut TurnContext, tool_name: &str, args: &Value) -> Value {
    match tool_name {
        "navigate" => navigate(ctx, args),
        "enter_sublocation" => enter_sublocation(ctx, args),
        "leave_sublocation" => leave_sublocation(ctx, args),
        "update_time" => update_time(ctx, args),
        "activate_event" => {
            let trigger_satisfied = args.get("trigger_satisfied").and_then(Value::as_bool).unwrap_or(true);
            activate_event(ctx, args, trigger_satisfied)
        }
        "complete_event" => complete_event(ctx, args),
        "fail_event" => fail_event(ctx, args),
        "update_disposition" => update_disposition(ctx, args),
        "recall_memory" => recall_memory(ctx, args),
        "create_memory" => create_memory(ctx, args),
        "ability_check" => ability_check(ctx, args),
        "start_combat" => start_combat(ctx, args),
        "get_combat_options" => get_combat_options(ctx, args),
        "choose_combat_action" => choose_combat_action(ctx, args),
        "heal_player" => heal_player(ctx, args),
        "damage_player" => damage_player(ctx, args),
        "add_xp" => add_xp(ctx, args),
        "add_item" => add_item(ctx, args),
        "remove_item" => remove_item(ctx, args),
        "add_teammate" => add_teammate(ctx, args),
        "remove_teammate" => remove_teammate(ctx, args),
        "disband_party" => disband_party(ctx, args),
        "advance_chapter" => advance_chapter(ctx, args),
        "complete_objective" => complete_objective(ctx, args),
        "advance_stage" => advance_stage(ctx, args),
        "complete_event_objective" => complete_event_objective(ctx, args),
        "report_flash_evaluation" => report_flash_evaluation(ctx, args),
        "npc_dialogue" => npc_dialogue(ctx, args),
        other => err(format!("unknown tool: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Area, Chapter, DangerLevel};
    use runtime_domain::{ChapterId, FixedRollSequence, SessionId, WorldId};

    fn make_ctx_parts() -> (GameState, WorldMap, WorldRuntimeState, ScopedGraphs, CombatEngine, FixedRollSequence, HashSet<AreaId>, HashMap<CharacterId, Disposition>) {
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
        let state = GameState::start(WorldId::new(), SessionId::new(), chapter_id, area_id, "Camp", None);
        (
            state,
            map,
            WorldRuntimeState::new(),
            ScopedGraphs::new(),
            CombatEngine::new(),
            FixedRollSequence::new(vec![15]),
            HashSet::new(),
            HashMap::new(),
        )
    }

    #[test]
    fn update_disposition_applies_and_clamps() {
        let (mut state, map, mut world, mut graphs, mut combat, mut rng, mut visited, mut dispositions) = make_ctx_parts();
        let npc_id = CharacterId::new();
        let known = [npc_id];
        let mut ctx = TurnContext {
            state: &mut state,
            map: &map,
            world: &mut world,
            graphs: &mut graphs,
            combat: &mut combat,
            rng: &mut rng,
            visited: &mut visited,
            dispositions: &mut dispositions,
            player_id: CharacterId::new(),
            known_characters: &known,
            now: Utc::now(),
        };
        let args = json!({ "npc_id": npc_id.to_string(), "deltas": { "trust": 999 }, "reason": "saved their life" });
        let result = update_disposition(&mut ctx, &args);
        assert_eq!(result["success"], true);
        assert_eq!(result["trust"], 100);
    }

    #[test]
    fn create_memory_then_recall_memory_finds_it() {
        let (mut state, map, mut world, mut graphs, mut combat, mut rng, mut visited, mut dispositions) = make_ctx_parts();
        let mut ctx = TurnContext {
            state: &mut state,
            map: &map,
            world: &mut world,
            graphs: &mut graphs,
            combat: &mut combat,
            rng: &mut rng,
            visited: &mut visited,
            dispositions: &mut dispositions,
            player_id: CharacterId::new(),
            known_characters: &[],
            now: Utc::now(),
        };
        let create_args = json!({ "content": "Elder Rowan warned of wolves", "scope": "area" });
        let created = create_memory(&mut ctx, &create_args);
        assert_eq!(created["success"], true);

        let recall_args = json!({ "seeds": ["Elder Rowan warned of wolves"] });
        let recalled = recall_memory(&mut ctx, &recall_args);
        assert_eq!(recalled["nodes"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn heal_and_damage_player_clamp_to_max_hp() {
        let (mut state, map, mut world, mut graphs, mut combat, mut rng, mut visited, mut dispositions) = make_ctx_parts();
        let mut ctx = TurnContext {
            state: &mut state,
            map: &map,
            world: &mut world,
            graphs: &mut graphs,
            combat: &mut combat,
            rng: &mut rng,
            visited: &mut visited,
            dispositions: &mut dispositions,
            player_id: CharacterId::new(),
            known_characters: &[],
            now: Utc::now(),
        };
        heal_player(&mut ctx, &json!({ "amount": 999 }));
        let result = heal_player(&mut ctx, &json!({ "amount": 5 }));
        assert_eq!(result["hp"], 20);
        let result = damage_player(&mut ctx, &json!({ "amount": 1000 }));
        assert_eq!(result["hp"], 0);
    }

    #[test]
    fn add_item_then_remove_item_tracks_quantity() {
        let (mut state, map, mut world, mut graphs, mut combat, mut rng, mut visited, mut dispositions) = make_ctx_parts();
        let mut ctx = TurnContext {
            state: &mut state,
            map: &map,
            world: &mut world,
            graphs: &mut graphs,
            combat: &mut combat,
            rng: &mut rng,
            visited: &mut visited,
            dispositions: &mut dispositions,
            player_id: CharacterId::new(),
            known_characters: &[],
            now: Utc::now(),
        };
        add_item(&mut ctx, &json!({ "item_id": "torch", "item_name": "Torch", "quantity": 2 }));
        add_item(&mut ctx, &json!({ "item_id": "torch", "item_name": "Torch", "quantity": 1 }));
        let items = ctx.state.metadata["inventory"].as_array().unwrap();
        assert_eq!(items[0]["quantity"], 3);

        remove_item(&mut ctx, &json!({ "item_id": "torch", "quantity": 3 }));
        let items = ctx.state.metadata["inventory"].as_array().unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn dispatch_routes_by_tool_name_and_rejects_unknown_names() {
        let (mut state, map, mut world, mut graphs, mut combat, mut rng, mut visited, mut dispositions) = make_ctx_parts();
        let mut ctx = TurnContext {
            state: &mut state,
            map: &map,
            world: &mut world,
            graphs: &mut graphs,
            combat: &mut combat,
            rng: &mut rng,
            visited: &mut visited,
            dispositions: &mut dispositions,
            player_id: CharacterId::new(),
            known_characters: &[],
            now: Utc::now(),
        };
        let result = dispatch(&mut ctx, "add_xp", &json!({ "amount": 10 }));
        assert_eq!(result["xp"], 10);

        let result = dispatch(&mut ctx, "not_a_real_tool", &json!({}));
        assert_eq!(result["success"], false);
    }
}
