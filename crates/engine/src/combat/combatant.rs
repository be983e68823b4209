//! Combatant attributes and action economy (§3.1).

use std::collections::{HashMap, HashSet};

use runtime_domain::{CombatantId, DiceFormula};
use serde::{Deserialize, Serialize};

use super::status_effect::{StatusEffectInstance, StatusEffectKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatantKind {
    Player,
    Ally,
    Enemy,
}

/// Which resource an action consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Action,
    Bonus,
    Reaction,
    Movement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityScores {
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self {
            strength: 10,
            dexterity: 10,
            constitution: 10,
            intelligence: 10,
            wisdom: 10,
            charisma: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpellBook {
    pub known_spell_ids: Vec<String>,
    pub slots_by_level: HashMap<u8, u32>,
    pub spell_attack_bonus: i32,
    pub spell_save_dc: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageModifiers {
    pub resistances: HashSet<String>,
    pub vulnerabilities: HashSet<String>,
    pub immunities: HashSet<String>,
}

impl DamageModifiers {
    /// Apply immunity/vulnerability/resistance to a raw damage amount
    /// (§4.1 step 6): immunities → 0; vulnerabilities → ×2; resistances →
    /// `max(1, floor(damage/2))`; else unchanged.
    pub fn apply(&self, damage_type: &str, raw_damage: i32) -> i32 {
        if self.immunities.contains(damage_type) {
            0
        } else if self.vulnerabilities.contains(damage_type) {
            raw_damage * 2
        } else if self.resistances.contains(damage_type) {
            (raw_damage / 2).max(1)
        } else {
            raw_damage
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEconomy {
    pub action_available: bool,
    pub bonus_action_available: bool,
    pub reaction_available: bool,
}

impl Default for ActionEconomy {
    fn default() -> Self {
        Self {
            action_available: true,
            bonus_action_available: true,
            reaction_available: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Combatant {
    pub id: CombatantId,
    pub display_name: String,
    pub kind: CombatantKind,
    pub(crate) hp: i32,
    pub max_hp: i32,
    pub armor_class: i32,
    pub attack_bonus: i32,
    pub damage_dice: DiceFormula,
    pub damage_bonus: i32,
    pub damage_type: String,
    pub initiative_bonus: i32,
    pub initiative_roll: i32,
    pub action_economy: ActionEconomy,
    pub movement_speed: u32,
    pub movement_points: u32,
    pub ability_scores: AbilityScores,
    pub weapon_id: Option<String>,
    pub armor_id: Option<String>,
    pub offhand_id: Option<String>,
    pub spell_book: SpellBook,
    pub damage_modifiers: DamageModifiers,
    pub status_effects: Vec<StatusEffectInstance>,
    pub ai_personality: Option<String>,
}

impl Combatant {
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn hp(&self) -> i32 {
        self.hp
    }

    /// Set HP, clamped to `[0, max_hp]` (§3.1 invariant).
    pub fn set_hp(&mut self, new_hp: i32) {
        self.hp = new_hp.clamp(0, self.max_hp);
    }

    pub fn apply_damage(&mut self, amount: i32) {
        self.set_hp(self.hp - amount.max(0));
    }

    pub fn heal(&mut self, amount: i32) {
        self.set_hp(self.hp + amount.max(0));
    }

    pub fn has_status(&self, kind: StatusEffectKind) -> bool {
        self.status_effects.iter().any(|e| e.effect == kind)
    }

    /// Effective AC (§4.1 step 4): base AC + 2 while `defending` is active.
    pub fn effective_ac(&self) -> i32 {
        if self.has_status(StatusEffectKind::Defending) {
            self.armor_class + 2
        } else {
            self.armor_class
        }
    }

    pub fn hp_ratio(&self) -> f64 {
        if self.max_hp <= 0 {
            0.0
        } else {
            self.hp as f64 / self.max_hp as f64
        }
    }

    /// Consume one resource for the current turn. Exactly one of
    /// `{action, bonus, reaction}` is consumed per call; movement is
    /// tracked separately in points.
    pub fn consume_resource(&mut self, kind: ResourceKind) -> Result<(), ResourceUnavailable> {
        match kind {
            ResourceKind::Action => {
                if !self.action_economy.action_available {
                    return Err(ResourceUnavailable(kind));
                }
                self.action_economy.action_available = false;
            }
            ResourceKind::Bonus => {
                if !self.action_economy.bonus_action_available {
                    return Err(ResourceUnavailable(kind));
                }
                self.action_economy.bonus_action_available = false;
            }
            ResourceKind::Reaction => {
                if !self.action_economy.reaction_available {
                    return Err(ResourceUnavailable(kind));
                }
                self.action_economy.reaction_available = false;
            }
            ResourceKind::Movement => {
                if self.movement_points == 0 {
                    return Err(ResourceUnavailable(kind));
                }
                self.movement_points -= 1;
            }
        }
        Ok(())
    }

    /// Reset action economy to all-available and movement points to speed,
    /// run when a new turn begins for this combatant (§3.1).
    pub fn reset_turn_resources(&mut self) {
        self.action_economy = ActionEconomy::default();
        self.movement_points = self.movement_speed;
    }

    /// Decrement every status effect's duration by one and drop expired
    /// ones (§4.1 end-of-turn cleanup).
    pub fn tick_status_effects(&mut self) {
        for effect in &mut self.status_effects {
            effect.tick();
        }
        self.status_effects.retain(|effect| !effect.is_expired());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("resource unavailable: {0:?}")]
pub struct ResourceUnavailable(pub ResourceKind);

#[cfg(test)]
mod tests {
    use super::*;

    fn make_combatant(hp: i32, max_hp: i32) -> Combatant {
        Combatant {
            id: CombatantId::new(),
            display_name: "Test".into(),
            kind: CombatantKind::Player,
            hp,
            max_hp,
            armor_class: 15,
            attack_bonus: 3,
            damage_dice: DiceFormula::new(1, 6, 2).unwrap(),
            damage_bonus: 2,
            damage_type: "slashing".into(),
            initiative_bonus: 0,
            initiative_roll: 0,
            action_economy: ActionEconomy::default(),
            movement_speed: 6,
            movement_points: 6,
            ability_scores: AbilityScores::default(),
            weapon_id: None,
            armor_id: None,
            offhand_id: None,
            spell_book: SpellBook::default(),
            damage_modifiers: DamageModifiers::default(),
            status_effects: Vec::new(),
            ai_personality: None,
        }
    }

    #[test]
    fn hp_clamps_to_max() {
        let mut c = make_combatant(10, 10);
        c.heal(50);
        assert_eq!(c.hp(), 10);
    }

    #[test]
    fn hp_clamps_to_zero_and_marks_dead() {
        let mut c = make_combatant(10, 10);
        c.apply_damage(999);
        assert_eq!(c.hp(), 0);
        assert!(!c.is_alive());
    }

    #[test]
    fn consuming_same_resource_twice_fails() {
        let mut c = make_combatant(10, 10);
        c.consume_resource(ResourceKind::Action).unwrap();
        assert!(c.consume_resource(ResourceKind::Action).is_err());
    }

    #[test]
    fn reset_turn_restores_economy_and_movement() {
        let mut c = make_combatant(10, 10);
        c.consume_resource(ResourceKind::Action).unwrap();
        c.consume_resource(ResourceKind::Movement).unwrap();
        c.reset_turn_resources();
        assert!(c.action_economy.action_available);
        assert_eq!(c.movement_points, c.movement_speed);
    }

    #[test]
    fn effective_ac_adds_two_while_defending() {
        let mut c = make_combatant(10, 10);
        assert_eq!(c.effective_ac(), 15);
        c.status_effects
            .push(StatusEffectInstance::new(StatusEffectKind::Defending, 1, "self"));
        assert_eq!(c.effective_ac(), 17);
    }

    #[test]
    fn damage_modifiers_apply_in_order() {
        let mut modifiers = DamageModifiers::default();
        modifiers.resistances.insert("fire".to_string());
        assert_eq!(modifiers.apply("fire", 25), 12);

        modifiers.immunities.insert("poison".to_string());
        assert_eq!(modifiers.apply("poison", 25), 0);

        modifiers.vulnerabilities.insert("cold".to_string());
        assert_eq!(modifiers.apply("cold", 5), 10);
    }
}
