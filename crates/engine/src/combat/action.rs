//! Action catalog, parsing, and action economy costs (§4.1 "Action catalog").

use runtime_domain::CombatantId;
use serde::{Deserialize, Serialize};

use super::combatant::ResourceKind;

/// One parsed `action_id` intent. `action_id`s are opaque strings on the
/// wire (`attack_{target}`, `move_closer`, …); this is the typed form the
/// engine actually operates on. `MoveCloser`/`MoveAway` carry no target:
/// per the grounding source they apply uniformly against every other
/// combatant still in the fight, not a single chosen one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionIntent {
    MoveCloser,
    MoveAway,
    Attack { target: CombatantId },
    Offhand { target: CombatantId },
    Throw { target: CombatantId },
    Shove { target: CombatantId },
    Defend,
    Dash,
    Disengage,
    Spell { spell_id: String, target: CombatantId },
    UseItem { item_id: String },
    Flee,
    EndTurn,
}

impl ActionIntent {
    /// Which resource this action consumes (§4.1: fixed cost mapping).
    /// `MoveCloser`/`MoveAway` consume one movement point each, handled
    /// separately by the caller since they're not a single-resource action.
    pub fn resource_cost(&self) -> ResourceKind {
        match self {
            ActionIntent::MoveCloser | ActionIntent::MoveAway => ResourceKind::Movement,
            ActionIntent::Attack { .. }
            | ActionIntent::Throw { .. }
            | ActionIntent::Defend
            | ActionIntent::Dash
            | ActionIntent::Disengage
            | ActionIntent::Spell { .. }
            | ActionIntent::Flee => ResourceKind::Action,
            ActionIntent::UseItem { .. }
            | ActionIntent::Shove { .. }
            | ActionIntent::Offhand { .. } => ResourceKind::Bonus,
            ActionIntent::EndTurn => ResourceKind::Action,
        }
    }

    pub fn is_melee_attack(&self) -> bool {
        matches!(
            self,
            ActionIntent::Attack { .. } | ActionIntent::Offhand { .. } | ActionIntent::Shove { .. }
        )
    }
}

/// A legal move offered to the current actor (§4.1
/// `get_available_actions_for_actor`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOption {
    pub action_id: String,
    pub display_name: String,
    pub target_id: Option<CombatantId>,
}

/// One logged entry of structured combat narration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatLogEntry {
    pub seq: u64,
    pub actor: String,
    pub message: String,
    pub event_type: String,
}

/// Outcome of resolving one action (§4.1 `execute_action`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action_id: String,
    pub actor_id: CombatantId,
    pub success: bool,
    pub is_hit: Option<bool>,
    pub is_critical: Option<bool>,
    pub damage_dealt: Option<i32>,
    pub log: Vec<CombatLogEntry>,
    pub combat_ended: bool,
    pub waiting_player_input: bool,
}
