//! Combat Core (§4): turn-based encounter resolution.

pub mod action;
pub mod ai;
pub mod combatant;
pub mod distance;
pub mod engine;
pub mod error;
pub mod status_effect;

pub use action::{ActionIntent, ActionOption, ActionResult, CombatLogEntry};
pub use combatant::{
    AbilityScores, ActionEconomy, Combatant, CombatantKind, DamageModifiers, ResourceKind,
    SpellBook,
};
pub use distance::{Distance, Side, SpatialProvider};
pub use engine::{
    CombatEngine, CombatId, CombatPenalty, CombatResult, CombatRewards, CombatSession,
    CombatState, CombatantSpec, DefeatConfig, EndReason,
};
pub use error::CombatError;
pub use status_effect::{StatusEffectInstance, StatusEffectKind};
