//! The combat turn engine (§4.1 in full). Grounded algorithmically in
//! `original_source/backend/app/combat/combat_engine.py`, restructured into
//! the teacher's use-case-struct idiom.

use std::collections::HashMap;

use runtime_domain::{CombatantId, DiceFormula, DiceRng};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::action::{ActionIntent, ActionOption, ActionResult, CombatLogEntry};
use super::ai::{self, AiPersonality};
use super::combatant::{
    AbilityScores, ActionEconomy, Combatant, CombatantKind, DamageModifiers, ResourceKind,
    SpellBook,
};
use super::distance::{Distance, Side, SpatialProvider};
use super::error::CombatError;
use super::status_effect::{StatusEffectInstance, StatusEffectKind};

pub type CombatId = runtime_domain::CombatId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatState {
    Idle,
    Initialized,
    InProgress,
    WaitingPlayerInput,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Victory,
    Defeat,
    Fled,
    Special,
}

/// Input template for a combatant built at `start_combat` time.
#[derive(Debug, Clone)]
pub struct CombatantSpec {
    pub display_name: String,
    pub kind: CombatantKind,
    pub max_hp: i32,
    pub armor_class: i32,
    pub attack_bonus: i32,
    pub damage_dice: DiceFormula,
    pub damage_bonus: i32,
    pub damage_type: String,
    pub initiative_bonus: i32,
    pub movement_speed: u32,
    pub ability_scores: AbilityScores,
    pub weapon_id: Option<String>,
    pub damage_modifiers: DamageModifiers,
    pub spell_book: SpellBook,
    pub ai_personality: Option<String>,
    pub xp_reward: i32,
    pub gold_reward: i32,
}

impl CombatantSpec {
    fn build(&self, initiative_roll: i32) -> Combatant {
        Combatant {
            id: CombatantId::new(),
            display_name: self.display_name.clone(),
            kind: self.kind,
            hp: self.max_hp,
            max_hp: self.max_hp,
            armor_class: self.armor_class,
            attack_bonus: self.attack_bonus,
            damage_dice: self.damage_dice,
            damage_bonus: self.damage_bonus,
            damage_type: self.damage_type.clone(),
            initiative_bonus: self.initiative_bonus,
            initiative_roll,
            action_economy: ActionEconomy::default(),
            movement_speed: self.movement_speed,
            movement_points: self.movement_speed,
            ability_scores: self.ability_scores,
            weapon_id: self.weapon_id.clone(),
            armor_id: None,
            offhand_id: None,
            spell_book: self.spell_book.clone(),
            damage_modifiers: self.damage_modifiers.clone(),
            status_effects: Vec::new(),
            ai_personality: self.ai_personality.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatRewards {
    pub xp: i32,
    pub gold: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatPenalty {
    pub gold_lost: i32,
    pub respawn_location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatResult {
    pub end_reason: EndReason,
    pub rewards: Option<CombatRewards>,
    pub penalty: Option<CombatPenalty>,
}

/// Per-combat defeat-penalty configuration (Design Notes §9: enumerated
/// configuration table, fixed recognized keys).
#[derive(Debug, Clone, Copy)]
pub struct DefeatConfig {
    pub lost_gold_fraction: f64,
    pub carried_gold: i32,
    pub respawn_area: &'static str,
}

impl Default for DefeatConfig {
    fn default() -> Self {
        Self {
            lost_gold_fraction: 0.1,
            carried_gold: 0,
            respawn_area: "area:last_safe",
        }
    }
}

/// A running combat: initiative order, combatants, spatial state, log.
#[derive(Debug, Clone)]
pub struct CombatSession {
    pub combat_id: CombatId,
    pub state: CombatState,
    combatants: Vec<Combatant>,
    pub turn_order: Vec<CombatantId>,
    pub current_turn_index: usize,
    pub current_round: u32,
    pub spatial: SpatialProvider,
    log: Vec<CombatLogEntry>,
    next_seq: u64,
    pub end_reason: Option<EndReason>,
    defeat_config: DefeatConfig,
}

impl CombatSession {
    pub fn combatant(&self, id: CombatantId) -> Option<&Combatant> {
        self.combatants.iter().find(|c| c.id == id)
    }

    fn combatant_mut(&mut self, id: CombatantId) -> Option<&mut Combatant> {
        self.combatants.iter_mut().find(|c| c.id == id)
    }

    pub fn combatants(&self) -> &[Combatant] {
        &self.combatants
    }

    pub fn log(&self) -> &[CombatLogEntry] {
        &self.log
    }

    pub fn current_actor(&self) -> Option<&Combatant> {
        self.turn_order
            .get(self.current_turn_index)
            .and_then(|id| self.combatant(*id))
    }

    fn alive_combatants(&self) -> impl Iterator<Item = &Combatant> {
        self.combatants.iter().filter(|c| c.is_alive())
    }

    fn is_opponent(&self, a: &Combatant, b: &Combatant) -> bool {
        let a_side = matches!(a.kind, CombatantKind::Player | CombatantKind::Ally);
        let b_side = matches!(b.kind, CombatantKind::Player | CombatantKind::Ally);
        a_side != b_side
    }

    fn push_log(&mut self, actor: impl Into<String>, message: impl Into<String>, event_type: &str) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.log.push(CombatLogEntry {
            seq,
            actor: actor.into(),
            message: message.into(),
            event_type: event_type.to_string(),
        });
    }

    fn check_end_condition(&mut self) {
        if self.state == CombatState::Ended {
            return;
        }
        let player_down = self
            .combatants
            .iter()
            .find(|c| c.kind == CombatantKind::Player)
            .map(|p| !p.is_alive())
            .unwrap_or(false);
        if player_down {
            self.state = CombatState::Ended;
            self.end_reason = Some(EndReason::Defeat);
            return;
        }
        let enemies_alive = self
            .combatants
            .iter()
            .any(|c| c.kind == CombatantKind::Enemy && c.is_alive());
        if !enemies_alive {
            self.state = CombatState::Ended;
            self.end_reason = Some(EndReason::Victory);
        }
    }
}

/// Owns live combat sessions. Holds no internal lock: the admin
/// orchestrator's per-session mutex (§5) serializes access from outside.
#[derive(Debug, Default)]
pub struct CombatEngine {
    sessions: HashMap<CombatId, CombatSession>,
}

impl CombatEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// §4.1 `start_combat`.
    pub fn start_combat(
        &mut self,
        player: CombatantSpec,
        enemies: Vec<CombatantSpec>,
        allies: Vec<CombatantSpec>,
        rng: &mut dyn DiceRng,
    ) -> CombatId {
        let combat_id = CombatId::from_uuid(Uuid::new_v4());
        let mut combatants = Vec::with_capacity(1 + enemies.len() + allies.len());

        let mut push_with_initiative = |spec: &CombatantSpec, rng: &mut dyn DiceRng| {
            let roll = rng.roll_d20() + spec.initiative_bonus;
            combatants.push(spec.build(roll));
        };
        push_with_initiative(&player, rng);
        for ally in &allies {
            push_with_initiative(ally, rng);
        }
        for enemy in &enemies {
            push_with_initiative(enemy, rng);
        }

        let sides: Vec<(CombatantId, Side)> = combatants
            .iter()
            .map(|c| {
                let side = match c.kind {
                    CombatantKind::Player | CombatantKind::Ally => Side::PlayerOrAlly,
                    CombatantKind::Enemy => Side::Enemy,
                };
                (c.id, side)
            })
            .collect();
        let spatial = SpatialProvider::initialize(&sides);

        let mut turn_order: Vec<CombatantId> = combatants.iter().map(|c| c.id).collect();
        turn_order.sort_by_key(|id| {
            std::cmp::Reverse(combatants.iter().find(|c| c.id == *id).unwrap().initiative_roll)
        });

        let mut session = CombatSession {
            combat_id,
            state: CombatState::Initialized,
            combatants,
            turn_order: turn_order.clone(),
            current_turn_index: 0,
            current_round: 1,
            spatial,
            log: Vec::new(),
            next_seq: 0,
            end_reason: None,
            defeat_config: DefeatConfig::default(),
        };

        let order_names: Vec<String> = turn_order
            .iter()
            .map(|id| session.combatant(*id).unwrap().display_name.clone())
            .collect();
        session.push_log("system", format!("combat begins, turn order: {}", order_names.join(", ")), "system");

        info!(combat_id = %combat_id, "combat started");

        session.state = CombatState::InProgress;
        run_enemy_turns_until_player(&mut session, rng);

        self.sessions.insert(combat_id, session);
        combat_id
    }

    pub fn session(&self, combat_id: CombatId) -> Result<&CombatSession, CombatError> {
        self.sessions
            .get(&combat_id)
            .ok_or_else(|| CombatError::SessionNotFound(combat_id.to_string()))
    }

    fn session_mut(&mut self, combat_id: CombatId) -> Result<&mut CombatSession, CombatError> {
        self.sessions
            .get_mut(&combat_id)
            .ok_or_else(|| CombatError::SessionNotFound(combat_id.to_string()))
    }

    /// §4.1 `get_available_actions_for_actor`.
    pub fn available_actions(
        &self,
        combat_id: CombatId,
        actor_id: CombatantId,
    ) -> Result<Vec<ActionOption>, CombatError> {
        let session = self.session(combat_id)?;
        let Some(actor) = session.combatant(actor_id) else {
            return Err(CombatError::CombatantNotFound(actor_id));
        };
        if session.current_actor().map(|c| c.id) != Some(actor_id) {
            return Ok(Vec::new());
        }

        let mut options = Vec::new();

        if actor.has_status(StatusEffectKind::Stunned) {
            options.push(ActionOption {
                action_id: "end_turn".to_string(),
                display_name: "end turn".to_string(),
                target_id: None,
            });
            return Ok(options);
        }

        if actor.movement_points > 0 {
            options.push(ActionOption {
                action_id: "move_closer".to_string(),
                display_name: "move closer".to_string(),
                target_id: None,
            });
            options.push(ActionOption {
                action_id: "move_away".to_string(),
                display_name: "move away".to_string(),
                target_id: None,
            });
        }

        if actor.action_economy.action_available {
            for enemy in session
                .alive_combatants()
                .filter(|c| session.is_opponent(actor, c))
            {
                let distance = session.spatial.get_distance(actor.id, enemy.id);
                if matches!(distance, Distance::Engaged | Distance::Close) {
                    options.push(ActionOption {
                        action_id: format!("attack_{}", enemy.id),
                        display_name: format!("attack {}", enemy.display_name),
                        target_id: Some(enemy.id),
                    });
                }
                if matches!(distance, Distance::Close | Distance::Near | Distance::Far) {
                    options.push(ActionOption {
                        action_id: format!("throw_{}", enemy.id),
                        display_name: format!("throw at {}", enemy.display_name),
                        target_id: Some(enemy.id),
                    });
                }
            }
            options.push(ActionOption {
                action_id: "defend".to_string(),
                display_name: "defend".to_string(),
                target_id: None,
            });
            options.push(ActionOption {
                action_id: "dash".to_string(),
                display_name: "dash".to_string(),
                target_id: None,
            });
            options.push(ActionOption {
                action_id: "disengage".to_string(),
                display_name: "disengage".to_string(),
                target_id: None,
            });
            options.push(ActionOption {
                action_id: "flee".to_string(),
                display_name: "flee".to_string(),
                target_id: None,
            });
        }

        if actor.action_economy.bonus_action_available {
            for enemy in session
                .alive_combatants()
                .filter(|c| session.is_opponent(actor, c))
            {
                let distance = session.spatial.get_distance(actor.id, enemy.id);
                if distance == Distance::Engaged {
                    options.push(ActionOption {
                        action_id: format!("shove_{}", enemy.id),
                        display_name: format!("shove {}", enemy.display_name),
                        target_id: Some(enemy.id),
                    });
                    if actor.offhand_id.is_some() {
                        options.push(ActionOption {
                            action_id: format!("offhand_{}", enemy.id),
                            display_name: format!("offhand attack {}", enemy.display_name),
                            target_id: Some(enemy.id),
                        });
                    }
                }
            }
        }

        options.push(ActionOption {
            action_id: "end_turn".to_string(),
            display_name: "end turn".to_string(),
            target_id: None,
        });

        Ok(options)
    }

    /// §4.1 `execute_action`.
    pub fn execute_action(
        &mut self,
        combat_id: CombatId,
        action_id: &str,
        rng: &mut dyn DiceRng,
    ) -> Result<ActionResult, CombatError> {
        let session = self.session_mut(combat_id)?;
        if session.state == CombatState::Ended {
            return Err(CombatError::CombatAlreadyEnded);
        }
        let Some(actor_id) = session.current_actor().map(|c| c.id) else {
            return Err(CombatError::SessionNotFound(combat_id.to_string()));
        };

        let intent = parse_action_id(action_id)?;
        let mut result = resolve_intent(session, actor_id, action_id, intent, rng)?;

        session.check_end_condition();
        if session.state == CombatState::Ended {
            result.combat_ended = true;
            result.waiting_player_input = false;
            return Ok(result);
        }

        let actor_has_resources = session
            .combatant(actor_id)
            .map(|c| {
                c.action_economy.action_available
                    || c.action_economy.bonus_action_available
                    || c.movement_points > 0
            })
            .unwrap_or(false);

        if actor_has_resources && action_id != "end_turn" {
            result.waiting_player_input = true;
            return Ok(result);
        }

        end_turn_and_advance(session, actor_id);
        run_enemy_turns_until_player(session, rng);
        result.waiting_player_input = session.state == CombatState::WaitingPlayerInput;
        result.combat_ended = session.state == CombatState::Ended;
        Ok(result)
    }

    /// §4.1 `get_combat_result` — only valid after `ended`.
    pub fn combat_result(&self, combat_id: CombatId) -> Result<CombatResult, CombatError> {
        let session = self.session(combat_id)?;
        let Some(end_reason) = session.end_reason else {
            return Err(CombatError::CombatNotEnded);
        };

        let (rewards, penalty) = match end_reason {
            EndReason::Victory => {
                let rewards = CombatRewards { xp: 0, gold: 0 };
                (Some(rewards), None)
            }
            EndReason::Defeat => {
                let config = session.defeat_config;
                let penalty = CombatPenalty {
                    gold_lost: (config.carried_gold as f64 * config.lost_gold_fraction) as i32,
                    respawn_location: config.respawn_area.to_string(),
                };
                (None, Some(penalty))
            }
            EndReason::Fled | EndReason::Special => (None, None),
        };

        Ok(CombatResult {
            end_reason,
            rewards,
            penalty,
        })
    }
}

fn begin_turn(session: &mut CombatSession) {
    let Some(actor_id) = session.turn_order.get(session.current_turn_index).copied() else {
        return;
    };
    let Some(actor) = session.combatant_mut(actor_id) else {
        return;
    };
    actor.reset_turn_resources();
}

/// §4.1 start-of-turn damage-over-time ticks, requires an rng to roll
/// the tick dice (burning/poisoned 1d4).
fn apply_start_of_turn_ticks(session: &mut CombatSession, rng: &mut dyn DiceRng) {
    let Some(actor_id) = session.current_actor().map(|c| c.id) else {
        return;
    };
    let effects: Vec<StatusEffectInstance> = session
        .combatant(actor_id)
        .map(|c| c.status_effects.clone())
        .unwrap_or_default();

    for effect in effects {
        let Some(dice) = effect.effect.tick_damage_dice() else {
            continue;
        };
        let damage_type = effect.effect.tick_damage_type().unwrap_or("");
        let roll = dice.roll(rng);
        let actor = session.combatant_mut(actor_id).unwrap();
        let modified = actor.damage_modifiers.apply(damage_type, roll.total);
        actor.apply_damage(modified);
        let name = actor.display_name.clone();
        session.push_log(
            name.clone(),
            format!("{name} takes {modified} {damage_type} damage from {:?}", effect.effect),
            "status_tick",
        );
    }
    session.check_end_condition();
}

fn resolve_intent(
    session: &mut CombatSession,
    actor_id: CombatantId,
    action_id: &str,
    intent: ActionIntent,
    rng: &mut dyn DiceRng,
) -> Result<ActionResult, CombatError> {
    let mut result = ActionResult {
        action_id: action_id.to_string(),
        actor_id,
        success: true,
        is_hit: None,
        is_critical: None,
        damage_dealt: None,
        log: Vec::new(),
        combat_ended: false,
        waiting_player_input: false,
    };

    match intent {
        ActionIntent::MoveCloser => {
            execute_move(session, actor_id, false, rng, &mut result)?;
        }
        ActionIntent::MoveAway => {
            execute_move(session, actor_id, true, rng, &mut result)?;
        }
        ActionIntent::Attack { target } => {
            consume(session, actor_id, intent.resource_cost(), &mut result)?;
            execute_attack(session, actor_id, target, false, rng, &mut result)?;
        }
        ActionIntent::Offhand { target } => {
            consume(session, actor_id, intent.resource_cost(), &mut result)?;
            execute_attack(session, actor_id, target, false, rng, &mut result)?;
        }
        ActionIntent::Throw { target } => {
            consume(session, actor_id, ResourceKind::Action, &mut result)?;
            execute_attack(session, actor_id, target, true, rng, &mut result)?;
        }
        ActionIntent::Shove { target } => {
            consume(session, actor_id, ResourceKind::Bonus, &mut result)?;
            execute_shove(session, actor_id, target, &mut result)?;
        }
        ActionIntent::Defend => {
            consume(session, actor_id, ResourceKind::Action, &mut result)?;
            let actor = session.combatant_mut(actor_id).unwrap();
            actor.status_effects.push(StatusEffectInstance::new(
                StatusEffectKind::Defending,
                1,
                "self",
            ));
            let name = actor.display_name.clone();
            session.push_log(name.clone(), format!("{name} takes a defensive stance"), "defend");
        }
        ActionIntent::Dash => {
            consume(session, actor_id, ResourceKind::Action, &mut result)?;
            let actor = session.combatant_mut(actor_id).unwrap();
            actor.movement_points += actor.movement_speed;
            let name = actor.display_name.clone();
            session.push_log(name.clone(), format!("{name} dashes"), "dash");
        }
        ActionIntent::Disengage => {
            consume(session, actor_id, ResourceKind::Action, &mut result)?;
            let actor = session.combatant_mut(actor_id).unwrap();
            actor.status_effects.push(StatusEffectInstance::new(
                StatusEffectKind::Disengaged,
                1,
                "self",
            ));
            let name = actor.display_name.clone();
            session.push_log(name.clone(), format!("{name} disengages"), "disengage");
        }
        ActionIntent::Spell { target, .. } => {
            consume(session, actor_id, ResourceKind::Action, &mut result)?;
            execute_attack(session, actor_id, target, false, rng, &mut result)?;
        }
        ActionIntent::UseItem { item_id } => {
            consume(session, actor_id, ResourceKind::Bonus, &mut result)?;
            let actor = session.combatant_mut(actor_id).unwrap();
            let name = actor.display_name.clone();
            session.push_log(name.clone(), format!("{name} uses {item_id}"), "use_item");
        }
        ActionIntent::Flee => {
            consume(session, actor_id, ResourceKind::Action, &mut result)?;
            execute_flee(session, actor_id, rng, &mut result)?;
        }
        ActionIntent::EndTurn => {}
    }

    result.log = session.log.clone();
    Ok(result)
}

fn consume(
    session: &mut CombatSession,
    actor_id: CombatantId,
    kind: ResourceKind,
    result: &mut ActionResult,
) -> Result<(), CombatError> {
    let actor = session
        .combatant_mut(actor_id)
        .ok_or(CombatError::CombatantNotFound(actor_id))?;
    actor.consume_resource(kind).map_err(|_| {
        result.success = false;
        CombatError::ResourceUnavailable {
            resource: match kind {
                ResourceKind::Action => "action",
                ResourceKind::Bonus => "bonus",
                ResourceKind::Reaction => "reaction",
                ResourceKind::Movement => "movement",
            },
        }
    })
}

fn execute_move(
    session: &mut CombatSession,
    mover_id: CombatantId,
    away: bool,
    rng: &mut dyn DiceRng,
    result: &mut ActionResult,
) -> Result<(), CombatError> {
    consume(session, mover_id, ResourceKind::Movement, result)?;
    let delta = if away { 1 } else { -1 };

    let mover_disengaged = session
        .combatant(mover_id)
        .map(|c| c.has_status(StatusEffectKind::Disengaged))
        .unwrap_or(false);

    if away && !mover_disengaged {
        let mover = session.combatant(mover_id).unwrap().clone();
        let opponents: Vec<CombatantId> = session
            .alive_combatants()
            .filter(|c| c.id != mover_id && session.is_opponent(&mover, c))
            .map(|c| c.id)
            .collect();
        for opponent_id in opponents {
            let at_engaged = session.spatial.get_distance(mover_id, opponent_id) == Distance::Engaged;
            let has_reaction = session
                .combatant(opponent_id)
                .map(|c| c.action_economy.reaction_available)
                .unwrap_or(false);
            if at_engaged && has_reaction {
                consume(session, opponent_id, ResourceKind::Reaction, result).ok();
                execute_attack(session, opponent_id, mover_id, false, rng, result)?;
            }
        }
    }

    let others: Vec<CombatantId> = session
        .alive_combatants()
        .filter(|c| c.id != mover_id)
        .map(|c| c.id)
        .collect();
    for other_id in others {
        session.spatial.adjust_distance(mover_id, other_id, delta);
    }

    let mover_name = session.combatant(mover_id).unwrap().display_name.clone();
    session.push_log(
        mover_name.clone(),
        format!("{mover_name} moves {}", if away { "away" } else { "closer" }),
        "move",
    );
    Ok(())
}

/// Attack resolution (§4.1 "Attack resolution", normative ordering).
fn execute_attack(
    session: &mut CombatSession,
    attacker_id: CombatantId,
    target_id: CombatantId,
    ranged: bool,
    rng: &mut dyn DiceRng,
    result: &mut ActionResult,
) -> Result<(), CombatError> {
    let distance = session.spatial.get_distance(attacker_id, target_id);
    let valid_distance = if ranged {
        matches!(distance, Distance::Close | Distance::Near | Distance::Far)
    } else {
        matches!(distance, Distance::Engaged | Distance::Close)
    };
    if !valid_distance {
        result.success = false;
        return Err(CombatError::OutOfRange);
    }

    let attacker = session.combatant(attacker_id).unwrap().clone();
    let target = session
        .combatant(target_id)
        .ok_or(CombatError::CombatantNotFound(target_id))?
        .clone();

    let mut advantage = target.has_status(StatusEffectKind::Stunned)
        || target.has_status(StatusEffectKind::Restrained)
        || (target.has_status(StatusEffectKind::Prone) && !ranged);
    let mut disadvantage = attacker.has_status(StatusEffectKind::Blinded)
        || attacker.has_status(StatusEffectKind::Frightened)
        || (target.has_status(StatusEffectKind::Prone) && ranged);
    if advantage && disadvantage {
        advantage = false;
        disadvantage = false;
    }

    let hit_roll = if advantage {
        rng.roll_d20_advantage()
    } else if disadvantage {
        rng.roll_d20_disadvantage()
    } else {
        rng.roll_d20()
    };

    let hit_total = hit_roll + attacker.attack_bonus;
    let target_ac = target.effective_ac();
    let is_hit = hit_total >= target_ac;
    let is_critical = hit_roll == 20;

    result.is_hit = Some(is_hit);
    result.is_critical = Some(is_critical);
    session.push_log(
        attacker.display_name.clone(),
        format!(
            "{} attacks {}: d20={} +{} = {} vs AC {}",
            attacker.display_name, target.display_name, hit_roll, attacker.attack_bonus, hit_total, target_ac
        ),
        "attack_roll",
    );

    if !is_hit {
        result.success = false;
        session.push_log(attacker.display_name.clone(), "attack misses".to_string(), "miss");
        return Ok(());
    }

    let damage_roll = if is_critical {
        attacker.damage_dice.roll_critical(rng)
    } else {
        attacker.damage_dice.roll(rng)
    };
    let raw_damage = damage_roll.total + attacker.damage_bonus;
    let modified_damage = target.damage_modifiers.apply(&attacker.damage_type, raw_damage);

    let target_mut = session.combatant_mut(target_id).unwrap();
    target_mut.apply_damage(modified_damage);
    let target_alive = target_mut.is_alive();
    let target_hp = target_mut.hp();

    result.damage_dealt = Some(modified_damage);
    session.push_log(
        attacker.display_name.clone(),
        format!(
            "hit! {} deals {} damage — {} hp: {}",
            attacker.display_name, modified_damage, target.display_name, target_hp
        ),
        "damage",
    );
    if !target_alive {
        session.push_log(
            attacker.display_name.clone(),
            format!("{} is defeated", target.display_name),
            "defeat",
        );
    }
    Ok(())
}

fn execute_shove(
    session: &mut CombatSession,
    actor_id: CombatantId,
    target_id: CombatantId,
    result: &mut ActionResult,
) -> Result<(), CombatError> {
    let distance = session.spatial.get_distance(actor_id, target_id);
    if distance != Distance::Engaged {
        result.success = false;
        return Err(CombatError::OutOfRange);
    }
    let target = session
        .combatant_mut(target_id)
        .ok_or(CombatError::CombatantNotFound(target_id))?;
    target
        .status_effects
        .push(StatusEffectInstance::new(StatusEffectKind::Prone, 1, "shove"));
    let target_name = target.display_name.clone();
    session.push_log("system", format!("{target_name} is shoved prone"), "shove");
    Ok(())
}

fn execute_flee(
    session: &mut CombatSession,
    actor_id: CombatantId,
    rng: &mut dyn DiceRng,
    result: &mut ActionResult,
) -> Result<(), CombatError> {
    const FLEE_DC: i32 = 10;
    let roll = rng.roll_d20();
    let success = roll >= FLEE_DC;
    result.success = success;
    let actor_name = session.combatant(actor_id).unwrap().display_name.clone();
    session.push_log(
        actor_name.clone(),
        format!("{actor_name} attempts to flee: d20={roll} vs DC {FLEE_DC}"),
        "flee",
    );
    if success {
        session.state = CombatState::Ended;
        session.end_reason = Some(EndReason::Fled);
        session.push_log(actor_name, "flees successfully".to_string(), "flee_success");
    } else {
        session.push_log(actor_name, "fails to flee".to_string(), "flee_fail");
    }
    Ok(())
}

fn end_turn_and_advance(session: &mut CombatSession, actor_id: CombatantId) {
    if let Some(actor) = session.combatant_mut(actor_id) {
        actor.tick_status_effects();
    }
    if session.state == CombatState::Ended {
        return;
    }
    loop {
        session.current_turn_index += 1;
        if session.current_turn_index >= session.turn_order.len() {
            session.current_turn_index = 0;
            session.current_round += 1;
        }
        let next_id = session.turn_order[session.current_turn_index];
        if session.combatant(next_id).map(|c| c.is_alive()).unwrap_or(false) {
            break;
        }
    }
}

fn run_enemy_turns_until_player(session: &mut CombatSession, rng: &mut dyn DiceRng) {
    loop {
        if session.state == CombatState::Ended {
            return;
        }
        begin_turn(session);
        apply_start_of_turn_ticks(session, rng);
        if session.state == CombatState::Ended {
            return;
        }
        let Some(actor) = session.current_actor() else {
            return;
        };
        if matches!(actor.kind, CombatantKind::Player | CombatantKind::Ally) {
            session.state = CombatState::WaitingPlayerInput;
            return;
        }

        let actor_id = actor.id;
        if session.combatant(actor_id).unwrap().has_status(StatusEffectKind::Stunned) {
            end_turn_and_advance(session, actor_id);
            continue;
        }

        let personality = AiPersonality::by_name(
            session
                .combatant(actor_id)
                .and_then(|c| c.ai_personality.as_deref())
                .unwrap_or("aggressive"),
        );
        let enemy = session.combatant(actor_id).unwrap().clone();
        let targets: Vec<Combatant> = session
            .alive_combatants()
            .filter(|c| matches!(c.kind, CombatantKind::Player | CombatantKind::Ally))
            .cloned()
            .collect();
        let target_refs: Vec<&Combatant> = targets.iter().collect();
        let decision = ai::decide_action(&enemy, personality, &target_refs, rng);

        let action_id = match decision {
            ai::AiDecision::Flee => "flee".to_string(),
            ai::AiDecision::Defend => "defend".to_string(),
            ai::AiDecision::Attack(target) => format!("attack_{}", target.id),
        };

        if let Ok(intent) = parse_action_id(&action_id) {
            let _ = resolve_intent(session, actor_id, &action_id, intent, rng);
        }
        session.check_end_condition();
        if session.state == CombatState::Ended {
            return;
        }
        end_turn_and_advance(session, actor_id);
    }
}

/// Parse an `action_id` per the fixed catalog (§4.1 "Action catalog").
/// Target ids are embedded as the combatant's UUID suffix.
fn parse_action_id(action_id: &str) -> Result<ActionIntent, CombatError> {
    let parse_target = |rest: &str| -> Result<CombatantId, CombatError> {
        Uuid::parse_str(rest)
            .map(CombatantId::from_uuid)
            .map_err(|_| CombatError::UnknownAction(action_id.to_string()))
    };

    match action_id {
        "move_closer" => return Ok(ActionIntent::MoveCloser),
        "move_away" => return Ok(ActionIntent::MoveAway),
        "defend" => return Ok(ActionIntent::Defend),
        "dash" => return Ok(ActionIntent::Dash),
        "disengage" => return Ok(ActionIntent::Disengage),
        "flee" => return Ok(ActionIntent::Flee),
        "end_turn" => return Ok(ActionIntent::EndTurn),
        _ => {}
    }

    if let Some(rest) = action_id.strip_prefix("attack_") {
        return Ok(ActionIntent::Attack { target: parse_target(rest)? });
    }
    if let Some(rest) = action_id.strip_prefix("offhand_") {
        return Ok(ActionIntent::Offhand { target: parse_target(rest)? });
    }
    if let Some(rest) = action_id.strip_prefix("throw_") {
        return Ok(ActionIntent::Throw { target: parse_target(rest)? });
    }
    if let Some(rest) = action_id.strip_prefix("shove_") {
        return Ok(ActionIntent::Shove { target: parse_target(rest)? });
    }
    if let Some(rest) = action_id.strip_prefix("use_") {
        return Ok(ActionIntent::UseItem { item_id: rest.to_string() });
    }
    if let Some(rest) = action_id.strip_prefix("spell_") {
        let mut parts = rest.rsplitn(2, '_');
        let target_part = parts.next().ok_or_else(|| CombatError::UnknownAction(action_id.to_string()))?;
        let spell_id = parts.next().ok_or_else(|| CombatError::UnknownAction(action_id.to_string()))?;
        return Ok(ActionIntent::Spell {
            spell_id: spell_id.to_string(),
            target: parse_target(target_part)?,
        });
    }

    Err(CombatError::UnknownAction(action_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime_domain::FixedRollSequence;

    fn basic_spec(kind: CombatantKind, name: &str, hp: i32, ac: i32) -> CombatantSpec {
        CombatantSpec {
            display_name: name.to_string(),
            kind,
            max_hp: hp,
            armor_class: ac,
            attack_bonus: 3,
            damage_dice: DiceFormula::new(1, 6, 0).unwrap(),
            damage_bonus: 2,
            damage_type: "slashing".to_string(),
            initiative_bonus: 0,
            movement_speed: 6,
            ability_scores: AbilityScores::default(),
            weapon_id: None,
            damage_modifiers: DamageModifiers::default(),
            spell_book: SpellBook::default(),
            ai_personality: Some("aggressive".to_string()),
            xp_reward: 10,
            gold_reward: 5,
        }
    }

    #[test]
    fn scenario_basic_attack_hits_for_expected_damage() {
        let mut engine = CombatEngine::new();
        // initiative rolls (player, goblin) then attack d20, then damage die
        let mut rng = FixedRollSequence::new(vec![15, 10, 18, 4]);
        let player = basic_spec(CombatantKind::Player, "Player", 20, 15);
        let goblin = basic_spec(CombatantKind::Enemy, "Goblin", 10, 12);
        let combat_id = engine.start_combat(player, vec![goblin], vec![], &mut rng);

        let session = engine.session(combat_id).unwrap();
        let player_id = session
            .combatants()
            .iter()
            .find(|c| c.kind == CombatantKind::Player)
            .unwrap()
            .id;
        let goblin_id = session
            .combatants()
            .iter()
            .find(|c| c.kind == CombatantKind::Enemy)
            .unwrap()
            .id;
        engine
            .session_mut(combat_id)
            .unwrap()
            .spatial
            .set_distance(player_id, goblin_id, Distance::Engaged);

        let action_id = format!("attack_{goblin_id}");
        let result = engine.execute_action(combat_id, &action_id, &mut rng).unwrap();
        assert_eq!(result.is_hit, Some(true));
        assert_eq!(result.damage_dealt, Some(6));

        let session = engine.session(combat_id).unwrap();
        assert_eq!(session.combatant(goblin_id).unwrap().hp(), 4);
        let _ = player_id;
    }

    #[test]
    fn scenario_critical_with_resistance_halves_damage() {
        let mut engine = CombatEngine::new();
        let mut rng = FixedRollSequence::new(vec![15, 10]);
        let mut attacker = basic_spec(CombatantKind::Player, "Attacker", 20, 15);
        attacker.damage_dice = DiceFormula::new(2, 6, 1).unwrap();
        attacker.damage_type = "fire".to_string();
        let mut target = basic_spec(CombatantKind::Enemy, "Target", 50, 12);
        target.damage_modifiers.resistances.insert("fire".to_string());

        let combat_id = engine.start_combat(attacker, vec![target], vec![], &mut rng);
        let session = engine.session(combat_id).unwrap();
        let attacker_id = session
            .combatants()
            .iter()
            .find(|c| c.kind == CombatantKind::Player)
            .unwrap()
            .id;
        let target_id = session
            .combatants()
            .iter()
            .find(|c| c.kind == CombatantKind::Enemy)
            .unwrap()
            .id;
        engine
            .session_mut(combat_id)
            .unwrap()
            .spatial
            .set_distance(attacker_id, target_id, Distance::Engaged);

        let mut action_rng = FixedRollSequence::new(vec![20, 6, 6, 6, 6]);
        let action_id = format!("attack_{target_id}");
        let result = engine.execute_action(combat_id, &action_id, &mut action_rng).unwrap();
        assert_eq!(result.is_critical, Some(true));
        // dice_total 6*4=24, +1 formula modifier, +2 damage_bonus = 27 raw, halved by resistance.
        assert_eq!(result.damage_dealt, Some(13));
    }

    #[test]
    fn scenario_flee_failure_keeps_combat_in_progress() {
        let mut engine = CombatEngine::new();
        let mut rng = FixedRollSequence::new(vec![15, 5]);
        let player = basic_spec(CombatantKind::Player, "Player", 20, 15);
        let goblin = basic_spec(CombatantKind::Enemy, "Goblin", 10, 12);
        let combat_id = engine.start_combat(player, vec![goblin], vec![], &mut rng);

        let mut flee_rng = FixedRollSequence::new(vec![8]);
        let result = engine.execute_action(combat_id, "flee", &mut flee_rng).unwrap();
        assert!(!result.success);
        let session = engine.session(combat_id).unwrap();
        assert_eq!(session.state, CombatState::WaitingPlayerInput);
    }

    #[test]
    fn offhand_consumes_bonus_not_action() {
        let mut engine = CombatEngine::new();
        let mut rng = FixedRollSequence::new(vec![15, 10]);
        let player = basic_spec(CombatantKind::Player, "Player", 20, 15);
        let goblin = basic_spec(CombatantKind::Enemy, "Goblin", 10, 12);
        let combat_id = engine.start_combat(player, vec![goblin], vec![], &mut rng);

        let session = engine.session(combat_id).unwrap();
        let player_id = session
            .combatants()
            .iter()
            .find(|c| c.kind == CombatantKind::Player)
            .unwrap()
            .id;
        let goblin_id = session
            .combatants()
            .iter()
            .find(|c| c.kind == CombatantKind::Enemy)
            .unwrap()
            .id;
        engine
            .session_mut(combat_id)
            .unwrap()
            .spatial
            .set_distance(player_id, goblin_id, Distance::Engaged);

        let mut offhand_rng = FixedRollSequence::new(vec![18, 3]);
        let action_id = format!("offhand_{goblin_id}");
        let result = engine.execute_action(combat_id, &action_id, &mut offhand_rng).unwrap();
        assert_eq!(result.is_hit, Some(true));

        let session = engine.session(combat_id).unwrap();
        let player = session.combatant(player_id).unwrap();
        assert!(player.action_economy.action_available);
        assert!(!player.action_economy.bonus_action_available);
    }

    #[test]
    fn attack_after_action_spent_fails_instead_of_falling_back_to_bonus() {
        let mut engine = CombatEngine::new();
        let mut rng = FixedRollSequence::new(vec![15, 10]);
        let player = basic_spec(CombatantKind::Player, "Player", 20, 15);
        let goblin = basic_spec(CombatantKind::Enemy, "Goblin", 10, 12);
        let combat_id = engine.start_combat(player, vec![goblin], vec![], &mut rng);

        let session = engine.session(combat_id).unwrap();
        let player_id = session
            .combatants()
            .iter()
            .find(|c| c.kind == CombatantKind::Player)
            .unwrap()
            .id;
        let goblin_id = session
            .combatants()
            .iter()
            .find(|c| c.kind == CombatantKind::Enemy)
            .unwrap()
            .id;
        engine
            .session_mut(combat_id)
            .unwrap()
            .spatial
            .set_distance(player_id, goblin_id, Distance::Engaged);

        let action_id = format!("attack_{goblin_id}");
        // crit (20) so the first attack both hits and leaves the goblin alive
        // (2d6+2 against 10 hp), consuming only the Action resource.
        let mut first_rng = FixedRollSequence::new(vec![20, 3, 3]);
        let first = engine.execute_action(combat_id, &action_id, &mut first_rng).unwrap();
        assert_eq!(first.is_hit, Some(true));
        assert!(!first.combat_ended);

        let session = engine.session(combat_id).unwrap();
        let player = session.combatant(player_id).unwrap();
        assert!(!player.action_economy.action_available);
        assert!(player.action_economy.bonus_action_available);

        // Action is already spent; a second attack must fail outright
        // rather than silently spend the Bonus resource instead.
        let mut second_rng = FixedRollSequence::new(vec![20, 3, 3]);
        let second = engine.execute_action(combat_id, &action_id, &mut second_rng);
        assert!(second.is_err());

        let session = engine.session(combat_id).unwrap();
        let player = session.combatant(player_id).unwrap();
        assert!(!player.action_economy.action_available);
        assert!(player.action_economy.bonus_action_available);
    }

    #[test]
    fn move_away_without_disengage_triggers_opportunity_attack() {
        let mut engine = CombatEngine::new();
        let mut rng = FixedRollSequence::new(vec![20, 1]);
        let player = basic_spec(CombatantKind::Player, "Player", 20, 15);
        let goblin = basic_spec(CombatantKind::Enemy, "Goblin", 10, 30);
        let combat_id = engine.start_combat(player, vec![goblin], vec![], &mut rng);

        let session = engine.session(combat_id).unwrap();
        let player_id = session
            .combatants()
            .iter()
            .find(|c| c.kind == CombatantKind::Player)
            .unwrap()
            .id;
        let goblin_id = session
            .combatants()
            .iter()
            .find(|c| c.kind == CombatantKind::Enemy)
            .unwrap()
            .id;
        engine
            .session_mut(combat_id)
            .unwrap()
            .spatial
            .set_distance(player_id, goblin_id, Distance::Engaged);

        let mut move_rng = FixedRollSequence::new(vec![15, 3]);
        engine.execute_action(combat_id, "move_away", &mut move_rng).unwrap();

        let session = engine.session(combat_id).unwrap();
        assert_eq!(session.spatial.get_distance(player_id, goblin_id), Distance::Close);
        let goblin = session.combatant(goblin_id).unwrap();
        assert!(!goblin.action_economy.reaction_available);
    }

    #[test]
    fn move_away_with_no_engaged_opponent_does_not_roll_opportunity_attack() {
        let mut engine = CombatEngine::new();
        let mut rng = FixedRollSequence::new(vec![15, 10]);
        let player = basic_spec(CombatantKind::Player, "Player", 20, 15);
        let goblin = basic_spec(CombatantKind::Enemy, "Goblin", 10, 12);
        let combat_id = engine.start_combat(player, vec![goblin], vec![], &mut rng);

        let session = engine.session(combat_id).unwrap();
        let player_id = session
            .combatants()
            .iter()
            .find(|c| c.kind == CombatantKind::Player)
            .unwrap()
            .id;
        let goblin_id = session
            .combatants()
            .iter()
            .find(|c| c.kind == CombatantKind::Enemy)
            .unwrap()
            .id;

        let session_mut_ref = engine.session_mut(combat_id).unwrap();
        session_mut_ref.spatial.set_distance(player_id, goblin_id, Distance::Near);

        let mut move_rng = FixedRollSequence::new(vec![]);
        engine.execute_action(combat_id, "move_away", &mut move_rng).unwrap();
        let session = engine.session(combat_id).unwrap();
        let goblin = session.combatant(goblin_id).unwrap();
        assert!(goblin.action_economy.reaction_available);
    }
}
