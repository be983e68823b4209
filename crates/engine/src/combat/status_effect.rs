//! Status effects applied to combatants (§3.2).

use runtime_domain::DiceFormula;
use serde::{Deserialize, Serialize};

/// The ten recognized status-effect kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEffectKind {
    Defending,
    Burning,
    Poisoned,
    Stunned,
    Prone,
    Frightened,
    Blinded,
    Restrained,
    Disengaged,
    Hidden,
}

impl StatusEffectKind {
    /// Per-turn damage tick dice, for the kinds that deal one (§4.1: "status
    /// effect timing").
    pub fn tick_damage_dice(&self) -> Option<DiceFormula> {
        match self {
            StatusEffectKind::Burning => DiceFormula::new(1, 4, 0).ok(),
            StatusEffectKind::Poisoned => DiceFormula::new(1, 4, 0).ok(),
            _ => None,
        }
    }

    pub fn tick_damage_type(&self) -> Option<&'static str> {
        match self {
            StatusEffectKind::Burning => Some("fire"),
            StatusEffectKind::Poisoned => Some("poison"),
            _ => None,
        }
    }
}

/// A live instance of a status effect on a combatant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEffectInstance {
    pub effect: StatusEffectKind,
    pub remaining_duration: i32,
    pub source: String,
}

impl StatusEffectInstance {
    pub fn new(effect: StatusEffectKind, duration: i32, source: impl Into<String>) -> Self {
        Self {
            effect,
            remaining_duration: duration,
            source: source.into(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_duration <= 0
    }

    /// Decrement duration by one turn. Callers remove expired effects
    /// afterward.
    pub fn tick(&mut self) {
        self.remaining_duration -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_expires_at_zero() {
        let mut effect = StatusEffectInstance::new(StatusEffectKind::Burning, 1, "dragon breath");
        assert!(!effect.is_expired());
        effect.tick();
        assert!(effect.is_expired());
    }

    #[test]
    fn only_burning_and_poisoned_tick_damage() {
        assert!(StatusEffectKind::Burning.tick_damage_dice().is_some());
        assert!(StatusEffectKind::Poisoned.tick_damage_dice().is_some());
        assert!(StatusEffectKind::Stunned.tick_damage_dice().is_none());
    }
}
