//! Event-def state machine (§3.9, §4.4 `activate_event`/`complete_event`/
//! `fail_event`): a plot-scripted world-graph node that moves through
//! `locked → available → active → completed|failed[ → cooldown → available]`.

use std::collections::{HashMap, HashSet};

use runtime_domain::EventId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventDefStatus {
    Locked,
    Available,
    Active,
    Completed,
    Failed,
    Cooldown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventOutcome {
    pub conditions: Value,
    pub rewards: Value,
    pub reputation_changes: Value,
    pub world_flags: Value,
    pub unlock_events: Vec<EventId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDef {
    pub id: EventId,
    pub status: EventDefStatus,
    pub current_stage: Option<String>,
    pub stage_progress: HashMap<String, bool>,
    pub objective_progress: HashMap<String, bool>,
    pub activated_at_round: Option<u64>,
    pub outcome: Option<String>,
    pub failure_reason: Option<String>,

    pub stages: Vec<String>,
    pub trigger_conditions: Value,
    pub completion_conditions: Value,
    pub on_complete: Value,
    pub outcomes: HashMap<String, EventOutcome>,
    pub is_repeatable: bool,
    pub cooldown_rounds: u32,
    pub narrative_directive: Option<String>,

    #[serde(skip)]
    cooldown_started_round: Option<u64>,
    #[serde(default)]
    applied_side_effects: HashSet<String>,
}

impl EventDef {
    pub fn new(id: EventId) -> Self {
        Self {
            id,
            status: EventDefStatus::Locked,
            current_stage: None,
            stage_progress: HashMap::new(),
            objective_progress: HashMap::new(),
            activated_at_round: None,
            outcome: None,
            failure_reason: None,
            stages: Vec::new(),
            trigger_conditions: Value::Null,
            completion_conditions: Value::Null,
            on_complete: Value::Null,
            outcomes: HashMap::new(),
            is_repeatable: false,
            cooldown_rounds: 0,
            narrative_directive: None,
            cooldown_started_round: None,
            applied_side_effects: HashSet::new(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum WorldEventError {
    #[error("event not available to activate: status '{0:?}'")]
    NotAvailable(EventDefStatus),
    #[error("trigger conditions not yet satisfied")]
    TriggerNotSatisfied,
    #[error("event not active: status '{0:?}'")]
    NotActive(EventDefStatus),
    #[error("unknown outcome key: {0}")]
    UnknownOutcome(String),
    #[error("outcome conditions not satisfied: {0}")]
    OutcomeConditionsNotMet(String),
}

/// `activate_event(event_id)` (§4.4). The caller evaluates
/// `trigger_satisfied` freshly against this turn's already-applied tool
/// effects before calling, which is what "run one opportunistic tick to
/// let this-turn tool calls satisfy trigger_conditions" amounts to here.
pub fn activate(event: &mut EventDef, current_round: u64, trigger_satisfied: bool) -> Result<(), WorldEventError> {
    if event.status != EventDefStatus::Available {
        return Err(WorldEventError::NotAvailable(event.status));
    }
    if !trigger_satisfied {
        return Err(WorldEventError::TriggerNotSatisfied);
    }
    event.status = EventDefStatus::Active;
    event.activated_at_round = Some(current_round);
    Ok(())
}

/// Net effect of a successful `complete_event` call, filtered to
/// side-effect tags not yet applied (§5 engine-shadow / §8 idempotency).
#[derive(Debug, Clone, Default)]
pub struct CompletionEffects {
    pub rewards: Value,
    pub reputation_changes: Value,
    pub world_flags: Value,
    pub unlock_events: Vec<EventId>,
    pub newly_applied_tags: Vec<String>,
}

/// `complete_event(event_id, outcome_key?)` (§4.4). Per Design Notes §9,
/// when `outcome_key` is given, its effects are computed before the
/// generic `on_complete` payload; both are returned for the caller to
/// apply (only `on_complete`'s own side-effect tags are deduplicated
/// against already-applied ones, same as the outcome's).
pub fn complete(
    event: &mut EventDef,
    outcome_key: Option<&str>,
    outcome_conditions_met: impl Fn(&Value) -> bool,
) -> Result<CompletionEffects, WorldEventError> {
    match event.status {
        EventDefStatus::Completed => return Err(WorldEventError::NotActive(EventDefStatus::Completed)),
        EventDefStatus::Active => {}
        other => return Err(WorldEventError::NotActive(other)),
    }

    let mut effects = CompletionEffects::default();

    if let Some(key) = outcome_key {
        let outcome = event
            .outcomes
            .get(key)
            .ok_or_else(|| WorldEventError::UnknownOutcome(key.to_string()))?
            .clone();
        if !outcome_conditions_met(&outcome.conditions) {
            return Err(WorldEventError::OutcomeConditionsNotMet(key.to_string()));
        }
        apply_tagged(event, &mut effects, &format!("outcome:{key}:{}", event.id), |e| {
            e.rewards = outcome.rewards.clone();
            e.reputation_changes = outcome.reputation_changes.clone();
            e.world_flags = outcome.world_flags.clone();
            e.unlock_events = outcome.unlock_events.clone();
        });
        event.outcome = Some(key.to_string());
    } else {
        apply_tagged(event, &mut effects, &format!("on_complete:{}", event.id), |e| {
            e.rewards = event.on_complete.clone();
        });
    }

    event.status = EventDefStatus::Completed;
    Ok(effects)
}

fn apply_tagged(
    event: &mut EventDef,
    effects: &mut CompletionEffects,
    tag: &str,
    fill: impl FnOnce(&mut CompletionEffects),
) {
    if event.applied_side_effects.contains(tag) {
        return;
    }
    fill(effects);
    event.applied_side_effects.insert(tag.to_string());
    effects.newly_applied_tags.push(tag.to_string());
}

/// `fail_event(event_id, reason?)` (§4.4).
pub fn fail(event: &mut EventDef, reason: Option<String>, current_round: u64) -> Result<(), WorldEventError> {
    if event.status != EventDefStatus::Active {
        return Err(WorldEventError::NotActive(event.status));
    }
    event.status = EventDefStatus::Failed;
    event.failure_reason = reason;
    if event.is_repeatable {
        event.status = EventDefStatus::Cooldown;
        event.cooldown_started_round = Some(current_round);
    }
    Ok(())
}

/// Behavior-engine tick (§4.4 step 5): transitions `cooldown → available`
/// once `cooldown_rounds` have elapsed.
pub fn tick(event: &mut EventDef, current_round: u64) {
    if event.status == EventDefStatus::Cooldown {
        if let Some(started) = event.cooldown_started_round {
            if current_round.saturating_sub(started) >= event.cooldown_rounds as u64 {
                event.status = EventDefStatus::Available;
                event.cooldown_started_round = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn available_event() -> EventDef {
        let mut e = EventDef::new(EventId::new());
        e.status = EventDefStatus::Available;
        e
    }

    #[test]
    fn activation_requires_available_status() {
        let mut e = EventDef::new(EventId::new());
        assert!(matches!(activate(&mut e, 1, true), Err(WorldEventError::NotAvailable(_))));
    }

    #[test]
    fn activation_rejects_unsatisfied_trigger() {
        let mut e = available_event();
        assert!(matches!(activate(&mut e, 1, false), Err(WorldEventError::TriggerNotSatisfied)));
        assert_eq!(e.status, EventDefStatus::Available);
    }

    #[test]
    fn repeated_complete_is_a_no_op_error_after_first_success() {
        let mut e = available_event();
        activate(&mut e, 1, true).unwrap();
        complete(&mut e, None, |_| true).unwrap();
        assert_eq!(e.status, EventDefStatus::Completed);

        let second = complete(&mut e, None, |_| true);
        assert!(matches!(second, Err(WorldEventError::NotActive(EventDefStatus::Completed))));
    }

    #[test]
    fn completion_side_effects_apply_exactly_once() {
        let mut e = available_event();
        e.outcomes.insert(
            "good".to_string(),
            EventOutcome {
                conditions: Value::Null,
                rewards: serde_json::json!({ "xp": 50 }),
                reputation_changes: Value::Null,
                world_flags: Value::Null,
                unlock_events: vec![],
            },
        );
        activate(&mut e, 1, true).unwrap();
        let effects = complete(&mut e, Some("good"), |_| true).unwrap();
        assert_eq!(effects.newly_applied_tags.len(), 1);
        assert_eq!(effects.rewards, serde_json::json!({ "xp": 50 }));
    }

    #[test]
    fn failure_of_repeatable_event_enters_cooldown_then_available() {
        let mut e = available_event();
        e.is_repeatable = true;
        e.cooldown_rounds = 3;
        activate(&mut e, 1, true).unwrap();
        fail(&mut e, Some("ran out of time".into()), 5).unwrap();
        assert_eq!(e.status, EventDefStatus::Cooldown);

        tick(&mut e, 6);
        assert_eq!(e.status, EventDefStatus::Cooldown);
        tick(&mut e, 8);
        assert_eq!(e.status, EventDefStatus::Available);
    }

    #[test]
    fn failure_of_non_repeatable_event_stays_failed() {
        let mut e = available_event();
        activate(&mut e, 1, true).unwrap();
        fail(&mut e, None, 1).unwrap();
        assert_eq!(e.status, EventDefStatus::Failed);
        tick(&mut e, 1000);
        assert_eq!(e.status, EventDefStatus::Failed);
    }
}
